//! Cache key definitions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Identifies one cached response.
///
/// Pages show the signed-in user in the navigation bar, so the viewer is part
/// of the key and two users never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseKey {
    pub path: String,
    pub query_hash: u64,
    pub viewer: Option<i64>,
}

impl ResponseKey {
    pub fn new(path: impl Into<String>, query: &str, viewer: Option<i64>) -> Self {
        Self {
            path: path.into(),
            query_hash: hash_query(query),
            viewer,
        }
    }
}

/// Hash a raw query string.
pub fn hash_query(query: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    query.hash(&mut hasher);
    hasher.finish()
}
