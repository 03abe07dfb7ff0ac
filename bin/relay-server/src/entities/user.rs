use crate::entities::{dao::UserRecord, AnyStore};
use std::future::Future;
use tracing::warn;

pub trait UserStore: Send + Sync + 'static {
    /// Insert the user or refresh its name and metadata.
    ///
    /// A unique-key violation means another delivery created the row first;
    /// it is logged and treated as success.
    fn upsert_user(&self, user: &UserRecord)
        -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_user(
        &self,
        user_uuid: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>, sqlx::Error>> + Send;
}

impl UserStore for AnyStore {
    async fn upsert_user(&self, user: &UserRecord) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO \"user\" (user_uuid, user_name, user_metadata) VALUES ($1, $2, $3) \
             ON CONFLICT (user_uuid) DO UPDATE SET \
             user_name = excluded.user_name, user_metadata = excluded.user_metadata",
        )
        .bind(user.user_uuid.clone())
        .bind(user.user_name.clone())
        .bind(user.user_metadata.clone())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                warn!(user_uuid = %user.user_uuid, error = %e, "user already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn get_user(&self, user_uuid: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT user_uuid, user_name, user_metadata FROM \"user\" WHERE user_uuid = $1",
        )
        .bind(user_uuid.to_owned())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(user_uuid, user_name, user_metadata)| UserRecord {
            user_uuid,
            user_name,
            user_metadata,
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::memory_store;

    #[tokio::test]
    async fn upsert_inserts_then_updates_name() {
        let store = memory_store().await;
        store.upsert_user(&UserRecord::new("U1", "Ann")).await.unwrap();
        store.upsert_user(&UserRecord::new("U1", "Annie")).await.unwrap();

        let user = store.get_user("U1").await.unwrap().unwrap();
        assert_eq!(user.user_name, "Annie");
        assert_eq!(user.user_metadata, "{}");
        assert!(store.get_user("U2").await.unwrap().is_none());
    }
}
