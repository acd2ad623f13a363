//! Administrative group management.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::error::FieldErrors;
use crate::application::repos::{CreateGroupParams, GroupsRepo, GroupsWriteRepo, RepoError};
use crate::domain::entities::GroupRecord;
use crate::domain::slug::{SlugAsyncError, SlugError, generate_unique_slug_async, validate_slug};

pub const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("form rejected: {0}")]
    Invalid(FieldErrors),
    #[error("no group with slug `{0}`")]
    NotFound(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Default)]
pub struct GroupInput {
    pub title: String,
    /// Leave empty to derive the slug from the title.
    pub slug: Option<String>,
    pub description: String,
}

#[derive(Clone)]
pub struct GroupService {
    reader: Arc<dyn GroupsRepo>,
    writer: Arc<dyn GroupsWriteRepo>,
}

impl GroupService {
    pub fn new(reader: Arc<dyn GroupsRepo>, writer: Arc<dyn GroupsWriteRepo>) -> Self {
        Self { reader, writer }
    }

    pub async fn list(&self) -> Result<Vec<GroupRecord>, GroupError> {
        Ok(self.reader.list_groups().await?)
    }

    pub async fn create(&self, input: GroupInput) -> Result<GroupRecord, GroupError> {
        let mut errors = FieldErrors::new();

        let title = input.title.trim().to_string();
        if title.is_empty() {
            errors.add("title", "This field is required.");
        } else if title.chars().count() > MAX_TITLE_LEN {
            errors.add(
                "title",
                format!("Ensure this value has at most {MAX_TITLE_LEN} characters."),
            );
        }

        let requested = input
            .slug
            .as_deref()
            .map(str::trim)
            .filter(|slug| !slug.is_empty());

        let slug = match requested {
            Some(slug) => match validate_slug(slug) {
                Ok(()) if self.reader.find_group_by_slug(slug).await?.is_some() => {
                    errors.add("slug", "Group with this Slug already exists.");
                    None
                }
                Ok(()) => Some(slug.to_string()),
                Err(err) => {
                    errors.add("slug", err.to_string());
                    None
                }
            },
            None if title.is_empty() => None,
            None => match self.derive_slug(&title).await {
                Ok(slug) => Some(slug),
                Err(SlugAsyncError::Slug(err)) => {
                    errors.add("slug", slug_hint(&err));
                    None
                }
                Err(SlugAsyncError::Predicate(err)) => return Err(err.into()),
            },
        };

        errors.into_result().map_err(GroupError::Invalid)?;
        let Some(slug) = slug else {
            return Err(GroupError::Invalid(FieldErrors::single(
                "slug",
                "This field is required.",
            )));
        };

        let group = self
            .writer
            .create_group(CreateGroupParams {
                title,
                slug,
                description: input.description.trim().to_string(),
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => GroupError::Invalid(FieldErrors::single(
                    "slug",
                    "Group with this Slug already exists.",
                )),
                other => GroupError::Repo(other),
            })?;

        info!(
            target = "yatube::application::groups",
            group_id = group.id,
            slug = %group.slug,
            "group created"
        );
        Ok(group)
    }

    /// Delete a group. Its posts remain, without a group.
    pub async fn delete(&self, slug: &str) -> Result<(), GroupError> {
        let group = self
            .reader
            .find_group_by_slug(slug)
            .await?
            .ok_or_else(|| GroupError::NotFound(slug.to_string()))?;
        self.writer.delete_group(group.id).await?;

        info!(
            target = "yatube::application::groups",
            group_id = group.id,
            slug,
            "group deleted"
        );
        Ok(())
    }

    async fn derive_slug(&self, title: &str) -> Result<String, SlugAsyncError<RepoError>> {
        let reader = self.reader.clone();
        generate_unique_slug_async(title, move |candidate| {
            let reader = reader.clone();
            async move {
                reader
                    .find_group_by_slug(&candidate)
                    .await
                    .map(|found| found.is_none())
            }
        })
        .await
    }
}

fn slug_hint(err: &SlugError) -> String {
    match err {
        SlugError::Unrepresentable { .. } | SlugError::EmptyInput => {
            "Could not derive a slug from the title; enter one explicitly.".to_string()
        }
        other => other.to_string(),
    }
}
