use async_trait::async_trait;

use crate::application::repos::{FollowsRepo, RepoError};
use crate::domain::entities::FollowCounts;
use crate::domain::follows::FollowEdge;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct FollowCountsRow {
    followers: i64,
    following: i64,
}

#[async_trait]
impl FollowsRepo for PostgresRepositories {
    async fn follow(&self, edge: FollowEdge) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO follows (user_id, author_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, author_id) DO NOTHING
            "#,
        )
        .bind(edge.user_id())
        .bind(edge.author_id())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn unfollow(&self, edge: FollowEdge) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
            .bind(edge.user_id())
            .bind(edge.author_id())
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2)",
        )
        .bind(user_id)
        .bind(author_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn follow_counts(&self, user_id: i64) -> Result<FollowCounts, RepoError> {
        let row = sqlx::query_as::<_, FollowCountsRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM follows WHERE author_id = $1) AS followers,
                (SELECT COUNT(*) FROM follows WHERE user_id = $1) AS following
            "#,
        )
        .bind(user_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(FollowCounts {
            followers: Self::convert_count(row.followers)?,
            following: Self::convert_count(row.following)?,
        })
    }
}
