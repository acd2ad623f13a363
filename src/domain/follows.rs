//! Follow edges between users.

use super::error::DomainError;

/// Whether a viewer currently follows an author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowState {
    NotFollowing,
    Following,
}

impl FollowState {
    pub fn from_flag(following: bool) -> Self {
        if following {
            Self::Following
        } else {
            Self::NotFollowing
        }
    }

    pub fn is_following(self) -> bool {
        matches!(self, Self::Following)
    }
}

/// A directed `user -> author` edge. Construction rejects self-follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowEdge {
    user_id: i64,
    author_id: i64,
}

impl FollowEdge {
    pub fn new(user_id: i64, author_id: i64) -> Result<Self, DomainError> {
        if user_id == author_id {
            return Err(DomainError::invariant("users cannot follow themselves"));
        }
        Ok(Self { user_id, author_id })
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn author_id(&self) -> i64 {
        self.author_id
    }
}
