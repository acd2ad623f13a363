//! Login, signup and logout pages.

use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use tracing::{info, warn};

use crate::{
    application::{
        accounts::{AccountError, IssuedSession, SESSION_COOKIE, SignupInput, Viewer},
        error::ErrorReport,
    },
    domain::accounts::is_local_redirect,
    presentation::views::{
        LayoutChrome, LayoutContext, LoginContext, LoginTemplate, SignupContext, SignupTemplate,
        render_server_error_response, render_template_response,
    },
};

use super::{
    HttpState, LOGIN_PATH,
    forms::{LoginForm, NextQuery, SignupForm},
    redirect_found, repo_failure_status,
};

const SOURCE: &str = "infra::http::auth";

pub(super) async fn login_form(viewer: Viewer, query: NextQuery) -> Response {
    let content = LoginContext {
        next: query.next.filter(|next| is_local_redirect(next)),
        ..LoginContext::default()
    };
    render_login(&viewer, content)
}

pub(super) async fn login_submit(
    State(state): State<HttpState>,
    viewer: Viewer,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let next = form.next.filter(|next| is_local_redirect(next));

    match state.accounts.login(&form.username, &form.password).await {
        Ok((user, session)) => {
            info!(target = SOURCE, user_id = user.id, "user logged in");
            let jar = jar.add(session_cookie(&session, state.cookie_secure));
            let target = next.as_deref().unwrap_or("/");
            (jar, redirect_found(target)).into_response()
        }
        Err(AccountError::Invalid(errors)) => {
            let content = LoginContext {
                username: form.username.trim().to_string(),
                next,
                form_errors: errors.non_field().to_vec(),
            };
            render_login(&viewer, content)
        }
        Err(err) => account_error_page(&viewer, err),
    }
}

pub(super) async fn signup_form(viewer: Viewer) -> Response {
    render_signup(&viewer, SignupContext::default())
}

pub(super) async fn signup_submit(
    State(state): State<HttpState>,
    viewer: Viewer,
    Form(form): Form<SignupForm>,
) -> Response {
    let username = form.username.clone();
    let input = SignupInput {
        username: form.username,
        password: form.password,
        password_confirmation: form.password_confirmation,
    };

    match state.accounts.signup(input).await {
        Ok(_) => redirect_found(LOGIN_PATH),
        Err(AccountError::Invalid(errors)) => {
            render_signup(&viewer, SignupContext::with_errors(username.trim(), &errors))
        }
        Err(err) => account_error_page(&viewer, err),
    }
}

pub(super) async fn logout(State(state): State<HttpState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE)
        && let Err(err) = state.accounts.logout(cookie.value()).await
    {
        warn!(target = SOURCE, error = %err, "failed to delete session row");
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, redirect_found("/")).into_response()
}

fn session_cookie(session: &IssuedSession, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .expires(session.expires_at)
        .build()
}

fn render_login(viewer: &Viewer, content: LoginContext) -> Response {
    let chrome = LayoutChrome::for_viewer(viewer).with_title("Log in");
    let view = LayoutContext::new(chrome, content);
    render_template_response(LoginTemplate { view }, StatusCode::OK)
}

fn render_signup(viewer: &Viewer, content: SignupContext) -> Response {
    let chrome = LayoutChrome::for_viewer(viewer).with_title("Sign up");
    let view = LayoutContext::new(chrome, content);
    render_template_response(SignupTemplate { view }, StatusCode::OK)
}

fn account_error_page(viewer: &Viewer, err: AccountError) -> Response {
    let status = match &err {
        AccountError::Repo(repo) => repo_failure_status(repo),
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    render_server_error_response(
        LayoutChrome::for_viewer(viewer),
        ErrorReport::from_error(SOURCE, status, &err),
    )
}
