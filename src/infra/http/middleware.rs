use std::{sync::Arc, time::Instant};

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use tracing::{error, warn};
use url::form_urlencoded;
use uuid::Uuid;

use super::redirect_found;
use crate::application::{
    accounts::{AccountService, SESSION_COOKIE, Viewer},
    error::ErrorReport,
};

/// Where anonymous visitors are sent when a page needs an account.
pub const LOGIN_PATH: &str = "/auth/login/";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Resolve the session cookie to a [`Viewer`] stored in the request
/// extensions. Store failures degrade to an anonymous viewer.
pub async fn resolve_viewer(
    State(accounts): State<Arc<AccountService>>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let viewer = match jar.get(SESSION_COOKIE) {
        Some(cookie) => match accounts.resolve(cookie.value()).await {
            Ok(Some(user)) => Viewer::User(user),
            Ok(None) => Viewer::Anonymous,
            Err(err) => {
                warn!(
                    target = "yatube::http::session",
                    error = %err,
                    "failed to resolve session; treating request as anonymous"
                );
                Viewer::Anonymous
            }
        },
        None => Viewer::Anonymous,
    };

    request.extensions_mut().insert(viewer);
    next.run(request).await
}

/// Redirect anonymous viewers to the login page, carrying the original path
/// and query in `next`.
pub async fn require_login(request: Request<Body>, next: Next) -> Response {
    let authenticated = request
        .extensions()
        .get::<Viewer>()
        .is_some_and(Viewer::is_authenticated);
    if authenticated {
        return next.run(request).await;
    }

    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    redirect_found(&login_redirect_target(target))
}

/// `/auth/login/?next=<percent-encoded target>`.
pub fn login_redirect_target(next: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("next", next)
        .finish();
    format!("{LOGIN_PATH}?{query}")
}

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Viewer>().cloned().unwrap_or_default())
    }
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let user_id = request.extensions().get::<Viewer>().and_then(Viewer::id);

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "yatube::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                user_id = user_id,
                "request failed",
            );
        } else {
            warn!(
                target = "yatube::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                user_id = user_id,
                "client request error",
            );
        }
    }

    response
}
