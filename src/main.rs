use std::{process, sync::Arc};

use tokio::try_join;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use yatube::{
    application::{
        accounts::{AccountError, AccountService, SignupInput},
        error::{AppError, FieldErrors},
        follows::FollowService,
        groups::GroupService,
        listing::ListingService,
        posts::PostService,
        repos::{
            CommentsRepo, FollowsRepo, GroupsRepo, GroupsWriteRepo, HealthRepo, PostsRepo,
            PostsWriteRepo, SessionsRepo, UsersRepo,
        },
    },
    cache::{CacheConfig, CacheState},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AdminState, HttpState},
        telemetry,
        uploads::UploadStorage,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::CreateUser(args) => run_create_user(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings)?;

    if let Err(err) = app.http_state.accounts.purge_expired_sessions().await {
        warn!(
            target = "yatube::serve",
            error = %err,
            "failed to purge expired sessions at startup"
        );
    }

    serve_http(&settings, app.http_state, app.admin_state).await
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    init_repositories(&settings).await?;
    info!(target = "yatube::migrate", "database migrations applied");
    Ok(())
}

async fn run_create_user(
    settings: config::Settings,
    args: config::CreateUserArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings)?;

    let input = SignupInput {
        username: args.username,
        password: args.password.clone(),
        password_confirmation: args.password,
    };

    match app.http_state.accounts.signup(input).await {
        Ok(user) => {
            info!(
                target = "yatube::createuser",
                user_id = user.id,
                username = %user.username,
                "user created"
            );
            Ok(())
        }
        Err(AccountError::Invalid(errors)) => Err(AppError::validation(format!(
            "{errors}{}",
            describe_field_errors(&errors)
        ))),
        Err(err) => Err(AppError::unexpected(err.to_string())),
    }
}

fn describe_field_errors(errors: &FieldErrors) -> String {
    ["username", "password", "password_confirmation"]
        .into_iter()
        .flat_map(|field| {
            errors
                .get(field)
                .iter()
                .map(move |message| format!("; {field}: {message}"))
        })
        .collect()
}

struct ApplicationContext {
    http_state: HttpState,
    admin_state: AdminState,
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let sessions_repo: Arc<dyn SessionsRepo> = repositories.clone();
    let groups_repo: Arc<dyn GroupsRepo> = repositories.clone();
    let groups_write_repo: Arc<dyn GroupsWriteRepo> = repositories.clone();
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repositories.clone();
    let follows_repo: Arc<dyn FollowsRepo> = repositories.clone();
    let health_repo: Arc<dyn HealthRepo> = repositories.clone();

    let upload_storage = Arc::new(
        UploadStorage::new(settings.uploads.directory.clone())
            .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );

    let cache_config = CacheConfig::from(&settings.cache);
    let cache_state = cache_config
        .enabled
        .then(|| CacheState::new(cache_config.clone()));

    let session_ttl =
        time::Duration::hours(i64::from(settings.auth.session_ttl_hours.get()));
    let accounts = Arc::new(AccountService::new(
        users_repo.clone(),
        sessions_repo,
        session_ttl,
    ));

    let listing = Arc::new(ListingService::new(
        posts_repo.clone(),
        groups_repo.clone(),
        users_repo.clone(),
        comments_repo.clone(),
        follows_repo.clone(),
        settings.listing.page_size.get(),
    ));
    let posts = Arc::new(PostService::new(
        posts_repo,
        posts_write_repo,
        groups_repo.clone(),
        comments_repo,
        upload_storage.clone(),
    ));
    let follows = Arc::new(FollowService::new(follows_repo, users_repo));
    let groups = Arc::new(GroupService::new(groups_repo, groups_write_repo));

    let upload_limit_bytes = usize::try_from(settings.uploads.max_request_bytes.get())
        .map_err(|_| AppError::validation("uploads.max_request_bytes exceeds addressable memory"))?;

    let http_state = HttpState {
        listing,
        posts,
        follows,
        accounts,
        health: health_repo.clone(),
        upload_storage,
        cache: cache_state.clone(),
        cookie_secure: settings.auth.cookie_secure,
        upload_limit_bytes,
    };

    let admin_state = AdminState {
        health: health_repo,
        groups,
        cache: cache_state,
    };

    Ok(ApplicationContext {
        http_state,
        admin_state,
    })
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_router(http_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_addr = settings.server.public_addr;
    let admin_addr = settings.server.admin_addr;
    let public_listener = tokio::net::TcpListener::bind(public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(public_addr, err)))?;
    let admin_listener = tokio::net::TcpListener::bind(admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(admin_addr, err)))?;

    info!(
        target = "yatube::serve",
        public = %public_addr,
        admin = %admin_addr,
        "listening"
    );

    let public_server = axum::serve(public_listener, public_router.into_make_service());
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service());

    try_join!(public_server, admin_server)
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}
