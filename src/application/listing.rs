//! Read side: paginated post listings, profiles and single posts.

use std::sync::Arc;

use thiserror::Error;

use crate::application::accounts::Viewer;
use crate::application::pagination::{Page, Paginator};
use crate::application::repos::{
    CommentsRepo, FollowsRepo, GroupsRepo, PostScope, PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{CommentRecord, FollowCounts, GroupRecord, PostRecord, UserRecord};
use crate::domain::follows::FollowState;

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("no group with slug `{0}`")]
    UnknownGroup(String),
    #[error("no user named `{0}`")]
    UnknownAuthor(String),
    #[error("post {post_id} not found for `{username}`")]
    UnknownPost { username: String, post_id: i64 },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub struct GroupListing {
    pub group: GroupRecord,
    pub page: Page<PostRecord>,
}

pub struct ProfileListing {
    pub author: UserRecord,
    pub page: Page<PostRecord>,
    pub counts: FollowCounts,
    pub follow_state: FollowState,
    /// Whether the viewer may follow or unfollow this author.
    pub can_follow: bool,
}

pub struct PostDetail {
    pub post: PostRecord,
    pub author_post_count: u64,
    pub author_counts: FollowCounts,
    pub comments: Vec<CommentRecord>,
}

#[derive(Clone)]
pub struct ListingService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    comments: Arc<dyn CommentsRepo>,
    follows: Arc<dyn FollowsRepo>,
    page_size: u32,
}

impl ListingService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        comments: Arc<dyn CommentsRepo>,
        follows: Arc<dyn FollowsRepo>,
        page_size: u32,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            comments,
            follows,
            page_size,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub async fn index_page(&self, page: Option<&str>) -> Result<Page<PostRecord>, ListingError> {
        self.read_page(PostScope::All, page).await
    }

    pub async fn group_page(
        &self,
        slug: &str,
        page: Option<&str>,
    ) -> Result<GroupListing, ListingError> {
        let group = self.find_group(slug).await?;
        let page = self.read_page(PostScope::Group(group.id), page).await?;
        Ok(GroupListing { group, page })
    }

    /// Posts by the authors `user_id` follows.
    pub async fn follow_feed(
        &self,
        user_id: i64,
        page: Option<&str>,
    ) -> Result<Page<PostRecord>, ListingError> {
        self.read_page(PostScope::FollowedBy(user_id), page).await
    }

    pub async fn profile(
        &self,
        username: &str,
        viewer: &Viewer,
        page: Option<&str>,
    ) -> Result<ProfileListing, ListingError> {
        let author = self.find_author(username).await?;
        let page = self.read_page(PostScope::Author(author.id), page).await?;
        let counts = self.follows.follow_counts(author.id).await?;

        let (can_follow, following) = match viewer.id() {
            Some(viewer_id) if viewer_id != author.id => (
                true,
                self.follows.is_following(viewer_id, author.id).await?,
            ),
            _ => (false, false),
        };

        Ok(ProfileListing {
            author,
            page,
            counts,
            follow_state: FollowState::from_flag(following),
            can_follow,
        })
    }

    /// A single post, provided it belongs to `username`.
    pub async fn post_detail(
        &self,
        username: &str,
        post_id: i64,
    ) -> Result<PostDetail, ListingError> {
        let post = self.find_owned_post(username, post_id).await?;
        let author_post_count = self
            .posts
            .count_posts(PostScope::Author(post.author.id))
            .await?;
        let author_counts = self.follows.follow_counts(post.author.id).await?;
        let comments = self.comments.list_comments(post.id).await?;

        Ok(PostDetail {
            post,
            author_post_count,
            author_counts,
            comments,
        })
    }

    pub async fn find_owned_post(
        &self,
        username: &str,
        post_id: i64,
    ) -> Result<PostRecord, ListingError> {
        match self.posts.find_post(post_id).await? {
            Some(post) if post.author.username == username => Ok(post),
            _ => Err(ListingError::UnknownPost {
                username: username.to_string(),
                post_id,
            }),
        }
    }

    async fn find_group(&self, slug: &str) -> Result<GroupRecord, ListingError> {
        self.groups
            .find_group_by_slug(slug)
            .await?
            .ok_or_else(|| ListingError::UnknownGroup(slug.to_string()))
    }

    async fn find_author(&self, username: &str) -> Result<UserRecord, ListingError> {
        self.users
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| ListingError::UnknownAuthor(username.to_string()))
    }

    async fn read_page(
        &self,
        scope: PostScope,
        page: Option<&str>,
    ) -> Result<Page<PostRecord>, ListingError> {
        let total = self.posts.count_posts(scope).await?;
        let paginator = Paginator::new(total, self.page_size);
        let number = paginator.resolve(page);
        let items = self
            .posts
            .list_posts(scope, paginator.window(number))
            .await?;
        Ok(paginator.page(number, items))
    }
}
