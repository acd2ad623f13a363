use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRef;
use crate::domain::follows::{FollowEdge, FollowState};

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("no user named `{0}`")]
    UnknownAuthor(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Follow and unfollow transitions. Both are idempotent: following twice or
/// following oneself leaves the store unchanged.
#[derive(Clone)]
pub struct FollowService {
    follows: Arc<dyn FollowsRepo>,
    users: Arc<dyn UsersRepo>,
}

impl FollowService {
    pub fn new(follows: Arc<dyn FollowsRepo>, users: Arc<dyn UsersRepo>) -> Self {
        Self { follows, users }
    }

    pub async fn follow(
        &self,
        follower: &UserRef,
        author_username: &str,
    ) -> Result<FollowState, FollowError> {
        let author_id = self.author_id(author_username).await?;
        let Ok(edge) = FollowEdge::new(follower.id, author_id) else {
            return Ok(FollowState::NotFollowing);
        };

        let created = self.follows.follow(edge).await?;
        debug!(
            target = "yatube::application::follows",
            user_id = follower.id,
            author_id,
            created,
            "follow requested"
        );
        Ok(FollowState::Following)
    }

    pub async fn unfollow(
        &self,
        follower: &UserRef,
        author_username: &str,
    ) -> Result<FollowState, FollowError> {
        let author_id = self.author_id(author_username).await?;
        let Ok(edge) = FollowEdge::new(follower.id, author_id) else {
            return Ok(FollowState::NotFollowing);
        };

        let removed = self.follows.unfollow(edge).await?;
        debug!(
            target = "yatube::application::follows",
            user_id = follower.id,
            author_id,
            removed,
            "unfollow requested"
        );
        Ok(FollowState::NotFollowing)
    }

    async fn author_id(&self, username: &str) -> Result<i64, FollowError> {
        self.users
            .find_user_by_username(username)
            .await?
            .map(|user| user.id)
            .ok_or_else(|| FollowError::UnknownAuthor(username.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use super::*;
    use crate::application::repos::CreateUserParams;
    use crate::domain::entities::{FollowCounts, UserRecord};

    #[derive(Default)]
    struct StubFollows {
        edges: Mutex<BTreeSet<(i64, i64)>>,
    }

    #[async_trait]
    impl FollowsRepo for StubFollows {
        async fn follow(&self, edge: FollowEdge) -> Result<bool, RepoError> {
            Ok(self
                .edges
                .lock()
                .unwrap()
                .insert((edge.user_id(), edge.author_id())))
        }

        async fn unfollow(&self, edge: FollowEdge) -> Result<bool, RepoError> {
            Ok(self
                .edges
                .lock()
                .unwrap()
                .remove(&(edge.user_id(), edge.author_id())))
        }

        async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
            Ok(self.edges.lock().unwrap().contains(&(user_id, author_id)))
        }

        async fn follow_counts(&self, _user_id: i64) -> Result<FollowCounts, RepoError> {
            Ok(FollowCounts::default())
        }
    }

    struct StubUsers;

    #[async_trait]
    impl UsersRepo for StubUsers {
        async fn find_user_by_username(
            &self,
            username: &str,
        ) -> Result<Option<UserRecord>, RepoError> {
            let id = match username {
                "leo" => 1,
                "tolstoy" => 2,
                _ => return Ok(None),
            };
            Ok(Some(UserRecord {
                id,
                username: username.to_string(),
                password_hash: String::new(),
                date_joined: OffsetDateTime::UNIX_EPOCH,
            }))
        }

        async fn find_user_by_id(&self, _id: i64) -> Result<Option<UserRecord>, RepoError> {
            Ok(None)
        }

        async fn create_user(&self, _params: CreateUserParams) -> Result<UserRecord, RepoError> {
            Err(RepoError::InvalidInput {
                message: "read-only stub".into(),
            })
        }
    }

    fn service() -> (FollowService, Arc<StubFollows>) {
        let follows = Arc::new(StubFollows::default());
        (
            FollowService::new(follows.clone(), Arc::new(StubUsers)),
            follows,
        )
    }

    fn leo() -> UserRef {
        UserRef {
            id: 1,
            username: "leo".into(),
        }
    }

    #[tokio::test]
    async fn following_twice_keeps_one_edge() {
        let (service, follows) = service();
        service.follow(&leo(), "tolstoy").await.expect("follow");
        service.follow(&leo(), "tolstoy").await.expect("follow");
        assert_eq!(follows.edges.lock().unwrap().len(), 1);

        service.unfollow(&leo(), "tolstoy").await.expect("unfollow");
        assert!(follows.edges.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn self_follow_is_a_no_op() {
        let (service, follows) = service();
        let state = service.follow(&leo(), "leo").await.expect("follow");
        assert_eq!(state, FollowState::NotFollowing);
        assert!(follows.edges.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_author_is_reported() {
        let (service, _) = service();
        let err = service.follow(&leo(), "ghost").await.unwrap_err();
        assert!(matches!(err, FollowError::UnknownAuthor(name) if name == "ghost"));
    }
}
