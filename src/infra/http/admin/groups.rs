use axum::{
    Form, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::application::{
    error::HttpError,
    groups::{GroupError, GroupInput},
};

use super::super::{forms::GroupForm, repo_error_to_http};
use super::AdminState;

const SOURCE: &str = "infra::http::admin::groups";

pub(super) async fn admin_groups(State(state): State<AdminState>) -> Response {
    match state.groups.list().await {
        Ok(groups) => Json(groups).into_response(),
        Err(err) => group_error_response(err),
    }
}

pub(super) async fn admin_group_create(
    State(state): State<AdminState>,
    Form(form): Form<GroupForm>,
) -> Response {
    let input = GroupInput {
        title: form.title,
        slug: form.slug,
        description: form.description,
    };

    match state.groups.create(input).await {
        Ok(group) => (StatusCode::CREATED, Json(group)).into_response(),
        Err(err) => group_error_response(err),
    }
}

pub(super) async fn admin_group_delete(
    State(state): State<AdminState>,
    Path(slug): Path<String>,
) -> Response {
    match state.groups.delete(&slug).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => group_error_response(err),
    }
}

fn group_error_response(err: GroupError) -> Response {
    match err {
        GroupError::Invalid(errors) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
        }
        GroupError::NotFound(slug) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Group not found",
            format!("no group with slug `{slug}`"),
        )
        .into_response(),
        GroupError::Repo(err) => repo_error_to_http(SOURCE, err).into_response(),
    }
}
