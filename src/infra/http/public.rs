use std::sync::Arc;

use axum::{
    Form, Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, State},
    http::{
        HeaderValue, StatusCode, Uri,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::Multipart;
use bytes::Bytes;
use tracing::error;

use crate::{
    application::{
        accounts::{AccountService, Viewer},
        error::{ErrorReport, HttpError},
        follows::{FollowError, FollowService},
        listing::{ListingError, ListingService},
        pagination::Page,
        posts::{PostError, PostInput, PostService},
        repos::{HealthRepo, RepoError},
    },
    cache::{CacheState, response_cache_layer},
    domain::entities::{PostRecord, UserRef},
    infra::uploads::UploadStorage,
    presentation::views::{
        FollowTemplate, GroupContext, GroupTemplate, IndexTemplate, LayoutChrome, LayoutContext,
        ListingContext, ListingPage, PostDetailContext, PostFormContext, PostFormTemplate,
        PostTemplate, ProfileContext, ProfileTemplate, post_href, profile_href,
        render_not_found_response, render_server_error_response, render_template_response,
    },
};

use super::{
    auth, db_health_response,
    forms::{CommentForm, FormPayloadError, PageQuery, read_post_form},
    middleware::{log_responses, require_login, resolve_viewer, set_request_context},
    redirect_found, repo_failure_status,
};

#[derive(Clone)]
pub struct HttpState {
    pub listing: Arc<ListingService>,
    pub posts: Arc<PostService>,
    pub follows: Arc<FollowService>,
    pub accounts: Arc<AccountService>,
    pub health: Arc<dyn HealthRepo>,
    pub upload_storage: Arc<UploadStorage>,
    pub cache: Option<CacheState>,
    pub cookie_secure: bool,
    pub upload_limit_bytes: usize,
}

pub fn build_router(state: HttpState) -> Router {
    // Only the main listing is cached; every other page reflects writes at once.
    let cached_routes = Router::new().route("/", get(index));
    let cached_routes = if let Some(cache_state) = state.cache.clone() {
        cached_routes.route_layer(middleware::from_fn_with_state(
            cache_state,
            response_cache_layer,
        ))
    } else {
        cached_routes
    };

    let protected_routes = Router::new()
        .route("/new/", get(post_create_form).post(post_create))
        .route("/follow/", get(follow_index))
        .route(
            "/{username}/{post_id}/edit/",
            get(post_edit_form).post(post_edit),
        )
        .route("/{username}/{post_id}/comment/", post(add_comment))
        .route(
            "/{username}/follow/",
            get(profile_follow).post(profile_follow),
        )
        .route(
            "/{username}/unfollow/",
            get(profile_unfollow).post(profile_unfollow),
        )
        .route_layer(middleware::from_fn(require_login));

    let open_routes = Router::new()
        .route("/group/{slug}/", get(group_posts))
        .route(
            "/auth/login/",
            get(auth::login_form).post(auth::login_submit),
        )
        .route(
            "/auth/signup/",
            get(auth::signup_form).post(auth::signup_submit),
        )
        .route("/auth/logout/", get(auth::logout).post(auth::logout))
        .route("/media/{*path}", get(serve_media))
        .route("/_health/db", get(public_health))
        .route("/{username}/", get(profile))
        .route("/{username}/{post_id}/", get(post_view));

    let upload_limit = state.upload_limit_bytes;
    let accounts = state.accounts.clone();

    cached_routes
        .merge(protected_routes)
        .merge(open_routes)
        .fallback(not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn_with_state(accounts, resolve_viewer))
        .layer(middleware::from_fn(set_request_context))
}

/// The signed-in user behind a guarded route. Handlers only reach this
/// after `require_login`; the redirect covers direct misuse.
pub(super) struct CurrentUser(pub UserRef);

impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Viewer>().and_then(Viewer::user) {
            Some(user) => Ok(CurrentUser(user.clone())),
            None => {
                let target = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/");
                Err(redirect_found(&super::login_redirect_target(target)))
            }
        }
    }
}

async fn index(
    State(state): State<HttpState>,
    viewer: Viewer,
    query: PageQuery,
) -> Response {
    let chrome = LayoutChrome::for_viewer(&viewer);
    match state.listing.index_page(query.page.as_deref()).await {
        Ok(page) => render_listing(chrome, &viewer, "Latest updates", &page, ListingKind::Index),
        Err(err) => listing_error_response(err, chrome, "/"),
    }
}

async fn follow_index(
    State(state): State<HttpState>,
    viewer: Viewer,
    CurrentUser(user): CurrentUser,
    query: PageQuery,
) -> Response {
    let chrome = LayoutChrome::for_viewer(&viewer);
    match state.listing.follow_feed(user.id, query.page.as_deref()).await {
        Ok(page) => render_listing(
            chrome.with_title("Following"),
            &viewer,
            "Posts by authors you follow",
            &page,
            ListingKind::Follow,
        ),
        Err(err) => listing_error_response(err, chrome, "/follow/"),
    }
}

enum ListingKind {
    Index,
    Follow,
}

fn render_listing(
    chrome: LayoutChrome,
    viewer: &Viewer,
    heading: &str,
    page: &Page<PostRecord>,
    kind: ListingKind,
) -> Response {
    let content = ListingPage::new(heading, ListingContext::from_page(page, viewer));
    let view = LayoutContext::new(chrome, content);
    match kind {
        ListingKind::Index => render_template_response(IndexTemplate { view }, StatusCode::OK),
        ListingKind::Follow => render_template_response(FollowTemplate { view }, StatusCode::OK),
    }
}

async fn group_posts(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(slug): Path<String>,
    query: PageQuery,
    uri: Uri,
) -> Response {
    let chrome = LayoutChrome::for_viewer(&viewer);
    match state.listing.group_page(&slug, query.page.as_deref()).await {
        Ok(listing) => {
            let content = GroupContext::new(
                &listing.group,
                ListingContext::from_page(&listing.page, &viewer),
            );
            let view = LayoutContext::new(chrome.with_title(listing.group.title.clone()), content);
            render_template_response(GroupTemplate { view }, StatusCode::OK)
        }
        Err(err) => listing_error_response(err, chrome, uri.path()),
    }
}

async fn profile(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(username): Path<String>,
    query: PageQuery,
    uri: Uri,
) -> Response {
    let chrome = LayoutChrome::for_viewer(&viewer);
    match state
        .listing
        .profile(&username, &viewer, query.page.as_deref())
        .await
    {
        Ok(profile) => {
            let content = ProfileContext::new(&profile, &viewer);
            let view = LayoutContext::new(
                chrome.with_title(format!("Profile of {username}")),
                content,
            );
            render_template_response(ProfileTemplate { view }, StatusCode::OK)
        }
        Err(err) => listing_error_response(err, chrome, uri.path()),
    }
}

async fn post_view(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path((username, post_id)): Path<(String, String)>,
    uri: Uri,
) -> Response {
    let chrome = LayoutChrome::for_viewer(&viewer);
    let Some(post_id) = parse_post_id(&post_id) else {
        return render_not_found_response(chrome, uri.path());
    };

    match state.listing.post_detail(&username, post_id).await {
        Ok(detail) => {
            let content = PostDetailContext::new(&detail, &viewer);
            let view = LayoutContext::new(chrome.with_title(content.post.summary.clone()), content);
            render_template_response(PostTemplate { view }, StatusCode::OK)
        }
        Err(err) => listing_error_response(err, chrome, uri.path()),
    }
}

async fn post_create_form(State(state): State<HttpState>, viewer: Viewer) -> Response {
    let chrome = LayoutChrome::for_viewer(&viewer).with_title("New post");
    match state.posts.group_choices().await {
        Ok(groups) => {
            let view = LayoutContext::new(chrome, PostFormContext::create(&groups));
            render_template_response(PostFormTemplate { view }, StatusCode::OK)
        }
        Err(err) => post_error_response(err, chrome, "/new/"),
    }
}

async fn post_create(
    State(state): State<HttpState>,
    viewer: Viewer,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> Response {
    let chrome = LayoutChrome::for_viewer(&viewer).with_title("New post");
    let input = match read_post_form(&mut multipart).await {
        Ok(input) => input,
        Err(err) => return form_payload_error(err),
    };
    let submitted = Submitted::from(&input);

    match state.posts.create(&user, input).await {
        Ok(_) => redirect_found("/"),
        Err(PostError::Invalid(errors)) => match state.posts.group_choices().await {
            Ok(groups) => {
                let form = PostFormContext::create(&groups).with_submission(
                    &submitted.text,
                    submitted.group.as_deref(),
                    &groups,
                    &errors,
                );
                let view = LayoutContext::new(chrome, form);
                render_template_response(PostFormTemplate { view }, StatusCode::OK)
            }
            Err(err) => post_error_response(err, chrome, "/new/"),
        },
        Err(err) => post_error_response(err, chrome, "/new/"),
    }
}

async fn post_edit_form(
    State(state): State<HttpState>,
    viewer: Viewer,
    CurrentUser(user): CurrentUser,
    Path((username, post_id)): Path<(String, String)>,
    uri: Uri,
) -> Response {
    let chrome = LayoutChrome::for_viewer(&viewer).with_title("Edit post");
    let Some(post_id) = parse_post_id(&post_id) else {
        return render_not_found_response(chrome, uri.path());
    };

    let post = match state.posts.load_for_edit(&user, &username, post_id).await {
        Ok(post) => post,
        Err(err) => return post_error_response(err, chrome, uri.path()),
    };

    match state.posts.group_choices().await {
        Ok(groups) => {
            let view = LayoutContext::new(chrome, PostFormContext::edit(&post, &groups));
            render_template_response(PostFormTemplate { view }, StatusCode::OK)
        }
        Err(err) => post_error_response(err, chrome, uri.path()),
    }
}

async fn post_edit(
    State(state): State<HttpState>,
    viewer: Viewer,
    CurrentUser(user): CurrentUser,
    Path((username, post_id)): Path<(String, String)>,
    uri: Uri,
    mut multipart: Multipart,
) -> Response {
    let chrome = LayoutChrome::for_viewer(&viewer).with_title("Edit post");
    let Some(post_id) = parse_post_id(&post_id) else {
        return render_not_found_response(chrome, uri.path());
    };

    let input = match read_post_form(&mut multipart).await {
        Ok(input) => input,
        Err(err) => return form_payload_error(err),
    };
    let submitted = Submitted::from(&input);

    match state.posts.edit(&user, &username, post_id, input).await {
        Ok(post) => redirect_found(&post_href(&post.author.username, post.id)),
        Err(PostError::Invalid(errors)) => {
            let form = async {
                let post = state.posts.load_for_edit(&user, &username, post_id).await?;
                let groups = state.posts.group_choices().await?;
                Ok::<_, PostError>(PostFormContext::edit(&post, &groups).with_submission(
                    &submitted.text,
                    submitted.group.as_deref(),
                    &groups,
                    &errors,
                ))
            };
            match form.await {
                Ok(form) => {
                    let view = LayoutContext::new(chrome, form);
                    render_template_response(PostFormTemplate { view }, StatusCode::OK)
                }
                Err(err) => post_error_response(err, chrome, uri.path()),
            }
        }
        Err(err) => post_error_response(err, chrome, uri.path()),
    }
}

async fn add_comment(
    State(state): State<HttpState>,
    viewer: Viewer,
    CurrentUser(user): CurrentUser,
    Path((username, post_id)): Path<(String, String)>,
    uri: Uri,
    Form(form): Form<CommentForm>,
) -> Response {
    let chrome = LayoutChrome::for_viewer(&viewer);
    let Some(post_id) = parse_post_id(&post_id) else {
        return render_not_found_response(chrome, uri.path());
    };

    // A blank comment is dropped; either way the reader lands on the post.
    match state
        .posts
        .add_comment(&user, &username, post_id, &form.text)
        .await
    {
        Ok(_) => redirect_found(&post_href(&username, post_id)),
        Err(err) => post_error_response(err, chrome, uri.path()),
    }
}

async fn profile_follow(
    State(state): State<HttpState>,
    viewer: Viewer,
    CurrentUser(user): CurrentUser,
    Path(username): Path<String>,
    uri: Uri,
) -> Response {
    let result = state.follows.follow(&user, &username).await;
    follow_transition_response(result.map(|_| ()), &viewer, &username, uri.path())
}

async fn profile_unfollow(
    State(state): State<HttpState>,
    viewer: Viewer,
    CurrentUser(user): CurrentUser,
    Path(username): Path<String>,
    uri: Uri,
) -> Response {
    let result = state.follows.unfollow(&user, &username).await;
    follow_transition_response(result.map(|_| ()), &viewer, &username, uri.path())
}

fn follow_transition_response(
    result: Result<(), FollowError>,
    viewer: &Viewer,
    username: &str,
    path: &str,
) -> Response {
    let chrome = LayoutChrome::for_viewer(viewer);
    match result {
        Ok(()) => redirect_found(&profile_href(username)),
        Err(FollowError::UnknownAuthor(_)) => render_not_found_response(chrome, path),
        Err(FollowError::Repo(err)) => repo_error_page(
            "infra::http::public::follow",
            err,
            chrome,
        ),
    }
}

async fn serve_media(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.upload_storage.read(&path).await {
        Ok(bytes) => build_upload_response(&path, bytes),
        Err(err) if err.is_not_found() => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "File not found",
            format!("no stored file at `{path}`"),
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored upload"
            );
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read uploaded file",
                &err,
            )
            .into_response()
        }
    }
}

fn build_upload_response(path: &str, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    // Stored names embed a fresh uuid, so a path never changes content.
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.ping().await)
}

async fn not_found(viewer: Viewer, uri: Uri) -> Response {
    render_not_found_response(LayoutChrome::for_viewer(&viewer), uri.path())
}

/// Form values kept aside so an invalid submission can be shown again.
struct Submitted {
    text: String,
    group: Option<String>,
}

impl From<&PostInput> for Submitted {
    fn from(input: &PostInput) -> Self {
        Self {
            text: input.text.clone(),
            group: input.group.clone(),
        }
    }
}

fn parse_post_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}

fn form_payload_error(err: FormPayloadError) -> Response {
    HttpError::from_error(
        "infra::http::public::read_post_form",
        err.status(),
        "Invalid form submission",
        &err,
    )
    .into_response()
}

fn listing_error_response(err: ListingError, chrome: LayoutChrome, path: &str) -> Response {
    match err {
        ListingError::UnknownGroup(_)
        | ListingError::UnknownAuthor(_)
        | ListingError::UnknownPost { .. } => render_not_found_response(chrome, path),
        ListingError::Repo(err) => repo_error_page("infra::http::public::listing", err, chrome),
    }
}

fn post_error_response(err: PostError, chrome: LayoutChrome, path: &str) -> Response {
    const SOURCE: &str = "infra::http::public::posts";

    match err {
        PostError::NotFound { .. } => render_not_found_response(chrome, path),
        // Soft denial: someone else's post opens in the read view.
        PostError::NotAuthor { .. } => redirect_found(path.strip_suffix("edit/").unwrap_or("/")),
        PostError::Repo(err) => repo_error_page(SOURCE, err, chrome),
        err @ (PostError::Storage(_) | PostError::Invalid(_)) => render_server_error_response(
            chrome,
            ErrorReport::from_error(SOURCE, StatusCode::INTERNAL_SERVER_ERROR, &err),
        ),
    }
}

fn repo_error_page(source: &'static str, err: RepoError, chrome: LayoutChrome) -> Response {
    let status = repo_failure_status(&err);
    render_server_error_response(chrome, ErrorReport::from_error(source, status, &err))
}
