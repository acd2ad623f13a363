//! Request bodies of the public forms.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::{StatusCode, Uri, request::Parts};
use axum_extra::extract::{Multipart, multipart::MultipartError};
use serde::Deserialize;
use thiserror::Error;
use url::form_urlencoded;

use crate::application::posts::{ImageUpload, PostInput};

#[derive(Debug, Error)]
pub enum FormPayloadError {
    #[error("request body exceeds the upload limit")]
    TooLarge,
    #[error("malformed multipart form data")]
    Malformed(#[source] MultipartError),
}

impl FormPayloadError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Malformed(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<MultipartError> for FormPayloadError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::TooLarge
        } else {
            Self::Malformed(err)
        }
    }
}

/// Read the post form (`text`, `group`, `image`, `clear_image`). A file
/// input left empty arrives as a part with no name and no bytes and counts
/// as no image.
pub async fn read_post_form(multipart: &mut Multipart) -> Result<PostInput, FormPayloadError> {
    let mut input = PostInput::default();

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("text") => input.text = field.text().await?,
            Some("group") => input.group = Some(field.text().await?),
            Some("clear_image") => {
                let value = field.text().await?.trim().to_ascii_lowercase();
                input.clear_image = matches!(value.as_str(), "on" | "true" | "1" | "yes");
            }
            Some("image") => {
                let file_name = field
                    .file_name()
                    .map(str::trim)
                    .unwrap_or_default()
                    .to_string();
                let data = field.bytes().await?;
                if !file_name.is_empty() && !data.is_empty() {
                    input.image = Some(ImageUpload { file_name, data });
                }
            }
            _ => continue,
        }
    }

    Ok(input)
}

/// The `page` query parameter. Repeated keys keep the last value and
/// malformed query strings read as absent, so listings never reject a request.
#[derive(Debug, Default)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl<S> FromRequestParts<S> for PageQuery
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            page: last_query_value(&parts.uri, "page"),
        })
    }
}

/// The `next` query parameter of the login page, read like [`PageQuery`].
#[derive(Debug, Default)]
pub struct NextQuery {
    pub next: Option<String>,
}

impl<S> FromRequestParts<S> for NextQuery
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            next: last_query_value(&parts.uri, "next"),
        })
    }
}

fn last_query_value(uri: &Uri, key: &str) -> Option<String> {
    form_urlencoded::parse(uri.query()?.as_bytes())
        .filter(|(name, _)| name == key)
        .last()
        .map(|(_, value)| value.into_owned())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommentForm {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub username: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GroupForm {
    pub title: String,
    pub slug: Option<String>,
    pub description: String,
}
