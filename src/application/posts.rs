//! Write side for posts and comments.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::error::FieldErrors;
use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, GroupsRepo, PostsRepo, PostsWriteRepo,
    RepoError, UpdatePostParams,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRef};
use crate::domain::posts::{normalize_comment_text, normalize_post_text};
use crate::infra::uploads::{UploadStorage, UploadStorageError};

/// Directory under the uploads root that holds post images.
pub const POST_IMAGE_PREFIX: &str = "posts";

const INVALID_GROUP: &str = "Select a valid choice. That choice is not one of the available choices.";
const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
const IMAGE_CONTRADICTION: &str =
    "Please either submit a file or check the clear checkbox, not both.";

#[derive(Debug, Error)]
pub enum PostError {
    #[error("form rejected: {0}")]
    Invalid(FieldErrors),
    #[error("post {post_id} not found for `{username}`")]
    NotFound { username: String, post_id: i64 },
    #[error("user {user_id} is not the author of post {post_id}")]
    NotAuthor { user_id: i64, post_id: i64 },
    #[error("failed to store image")]
    Storage(#[from] UploadStorageError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// An uploaded image file as received from the form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub data: Bytes,
}

/// Raw post form submission.
#[derive(Debug, Clone, Default)]
pub struct PostInput {
    pub text: String,
    /// Selected group id as submitted; empty means no group.
    pub group: Option<String>,
    pub image: Option<ImageUpload>,
    pub clear_image: bool,
}

struct ValidPost {
    text: String,
    group_id: Option<i64>,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
    storage: Arc<UploadStorage>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
        storage: Arc<UploadStorage>,
    ) -> Self {
        Self {
            posts,
            writer,
            groups,
            comments,
            storage,
        }
    }

    /// Groups offered by the post form, ordered by title.
    pub async fn group_choices(&self) -> Result<Vec<GroupRecord>, PostError> {
        Ok(self.groups.list_groups().await?)
    }

    pub async fn create(&self, author: &UserRef, input: PostInput) -> Result<PostRecord, PostError> {
        let valid = self.validate(&input, false).await?;
        let image = match input.image {
            Some(image) => Some(self.store_image(image).await?),
            None => None,
        };

        let created = self
            .writer
            .create_post(CreatePostParams {
                author_id: author.id,
                text: valid.text,
                group_id: valid.group_id,
                image: image.clone(),
            })
            .await;

        let post = match created {
            Ok(post) => post,
            Err(err) => {
                if let Some(path) = image {
                    self.discard_image(&path).await;
                }
                return Err(err.into());
            }
        };

        info!(
            target = "yatube::application::posts",
            post_id = post.id,
            author_id = author.id,
            "post created"
        );
        Ok(post)
    }

    /// Load a post for editing. Fails with [`PostError::NotAuthor`] unless
    /// `editor` wrote it.
    pub async fn load_for_edit(
        &self,
        editor: &UserRef,
        username: &str,
        post_id: i64,
    ) -> Result<PostRecord, PostError> {
        let post = self.find_owned(username, post_id).await?;
        if post.author.id != editor.id {
            return Err(PostError::NotAuthor {
                user_id: editor.id,
                post_id,
            });
        }
        Ok(post)
    }

    pub async fn edit(
        &self,
        editor: &UserRef,
        username: &str,
        post_id: i64,
        input: PostInput,
    ) -> Result<PostRecord, PostError> {
        let current = self.load_for_edit(editor, username, post_id).await?;
        let valid = self.validate(&input, current.image.is_some()).await?;

        let replaced = input.image.is_some() || input.clear_image;
        let uploaded = match input.image {
            Some(upload) => Some(self.store_image(upload).await?),
            None => None,
        };
        let image = match &uploaded {
            Some(path) => Some(path.clone()),
            None if input.clear_image => None,
            None => current.image.clone(),
        };

        let updated = self
            .writer
            .update_post(UpdatePostParams {
                id: current.id,
                text: valid.text,
                group_id: valid.group_id,
                image,
            })
            .await;

        let post = match updated {
            Ok(post) => post,
            Err(err) => {
                if let Some(path) = uploaded {
                    self.discard_image(&path).await;
                }
                return Err(err.into());
            }
        };

        if replaced && let Some(old) = current.image.as_deref() {
            self.discard_image(old).await;
        }

        info!(
            target = "yatube::application::posts",
            post_id = post.id,
            "post updated"
        );
        Ok(post)
    }

    /// Add a comment to a post. Blank comments are dropped and yield `None`.
    pub async fn add_comment(
        &self,
        author: &UserRef,
        username: &str,
        post_id: i64,
        text: &str,
    ) -> Result<Option<CommentRecord>, PostError> {
        let post = self.find_owned(username, post_id).await?;
        let Ok(text) = normalize_comment_text(text) else {
            return Ok(None);
        };

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id: post.id,
                author_id: author.id,
                text,
            })
            .await?;
        Ok(Some(comment))
    }

    async fn find_owned(&self, username: &str, post_id: i64) -> Result<PostRecord, PostError> {
        match self.posts.find_post(post_id).await? {
            Some(post) if post.author.username == username => Ok(post),
            _ => Err(PostError::NotFound {
                username: username.to_string(),
                post_id,
            }),
        }
    }

    async fn validate(&self, input: &PostInput, has_image: bool) -> Result<ValidPost, PostError> {
        let mut errors = FieldErrors::new();

        let text = match normalize_post_text(&input.text) {
            Ok(text) => Some(text),
            Err(err) => {
                errors.add_domain(err);
                None
            }
        };

        let group_id = match input.group.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match raw.parse::<i64>() {
                Ok(id) if self.groups.find_group_by_id(id).await?.is_some() => Some(id),
                _ => {
                    errors.add("group", INVALID_GROUP);
                    None
                }
            },
        };

        if let Some(image) = &input.image {
            if input.clear_image && has_image {
                errors.add("image", IMAGE_CONTRADICTION);
            } else if !is_image(&image.data) {
                errors.add("image", INVALID_IMAGE);
            }
        }

        errors.into_result().map_err(PostError::Invalid)?;
        Ok(ValidPost {
            text: text.unwrap_or_default(),
            group_id,
        })
    }

    async fn store_image(&self, image: ImageUpload) -> Result<String, PostError> {
        let stored = self
            .storage
            .store(POST_IMAGE_PREFIX, &image.file_name, image.data)
            .await?;
        Ok(stored.stored_path)
    }

    async fn discard_image(&self, path: &str) {
        if let Err(err) = self.storage.delete(path).await {
            warn!(
                target = "yatube::application::posts",
                path,
                error = %err,
                "failed to remove replaced image"
            );
        }
    }
}

/// Whether the payload starts with a header of a known raster image format.
fn is_image(data: &[u8]) -> bool {
    matches!(imagesize::blob_size(data), Ok(size) if size.width > 0 && size.height > 0)
}
