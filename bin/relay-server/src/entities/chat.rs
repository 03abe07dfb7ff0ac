use crate::entities::{
    dao::{ChatTurn, HistoryEntry},
    AnyStore,
};
use chrono::Utc;
use relay_agent::Role;
use std::future::Future;

pub trait ChatStore: Send + Sync + 'static {
    /// Append one turn stamped with the server clock; returns the row id.
    fn insert_turn(
        &self,
        user_uuid: &str,
        role: Role,
        content: &str,
        channel_timestamp: Option<&str>,
    ) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;

    /// Every row for `user_uuid`, in insertion order.
    fn read_turns(
        &self,
        user_uuid: &str,
    ) -> impl Future<Output = Result<Vec<ChatTurn>, sqlx::Error>> + Send;

    /// `user` and `assistant` turns only, in insertion order.
    fn get_history(
        &self,
        user_uuid: &str,
    ) -> impl Future<Output = Result<Vec<HistoryEntry>, sqlx::Error>> + Send;

    /// Returns `true` if a row was removed.
    fn delete_turn(&self, id: i64) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
}

impl ChatStore for AnyStore {
    async fn insert_turn(
        &self,
        user_uuid: &str,
        role: Role,
        content: &str,
        channel_timestamp: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        let created_at = Utc::now().to_rfc3339();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO chat_history (user_uuid, role, content, created_at, channel_timestamp) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(user_uuid.to_owned())
        .bind(role.as_str().to_owned())
        .bind(content.to_owned())
        .bind(created_at)
        .bind(channel_timestamp.map(str::to_owned))
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn read_turns(&self, user_uuid: &str) -> Result<Vec<ChatTurn>, sqlx::Error> {
        let rows: Vec<(i64, String, String, String, String, Option<String>)> = sqlx::query_as(
            "SELECT id, user_uuid, role, content, created_at, channel_timestamp \
             FROM chat_history WHERE user_uuid = $1 ORDER BY id ASC",
        )
        .bind(user_uuid.to_owned())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, user_uuid, role, content, created_at, channel_timestamp)| ChatTurn {
                id,
                user_uuid,
                role,
                content,
                created_at: created_at.parse().unwrap_or_else(|e: chrono::ParseError| {
                    tracing::warn!(raw = %created_at, error = %e, "failed to parse turn created_at; using now");
                    Utc::now()
                }),
                channel_timestamp,
            })
            .collect())
    }

    async fn get_history(&self, user_uuid: &str) -> Result<Vec<HistoryEntry>, sqlx::Error> {
        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
            "SELECT role, content, channel_timestamp FROM chat_history \
             WHERE user_uuid = $1 AND role IN ('user', 'assistant') ORDER BY id ASC",
        )
        .bind(user_uuid.to_owned())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(role, content, channel_timestamp)| {
                Some(HistoryEntry {
                    role: Role::parse(&role)?,
                    content,
                    channel_timestamp,
                })
            })
            .collect())
    }

    async fn delete_turn(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM chat_history WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
