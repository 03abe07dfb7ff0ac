//! Persistence layer.
//!
//! [`ChatStore`] and [`UserStore`] define the interface for the conversation
//! history and the user table.  Both are implemented on [`AnyStore`], a thin
//! wrapper around a `sqlx::Any` pool, so the database is chosen by URL alone
//! (`sqlite://relay.db`, `postgres://...`).  Queries use `$N` placeholders,
//! which both drivers accept; each backend has its own migration directory.
//!
//! All trait methods use `impl Future` in their signatures so no extra
//! `async-trait` crate is required.

pub mod chat;
pub mod dao;
pub mod user;

pub use chat::ChatStore;
pub use dao::{ChatTurn, HistoryEntry, UserRecord};
pub use user::UserStore;

use std::str::FromStr;

use sqlx::any::{AnyConnectOptions, AnyPoolOptions};
use sqlx::migrate::Migrator;

// Paths are resolved relative to CARGO_MANIFEST_DIR at compile time.
static SQLITE_MIGRATOR: Migrator = sqlx::migrate!("./migrations/sqlite");
static POSTGRES_MIGRATOR: Migrator = sqlx::migrate!("./migrations/postgres");

/// Database family selected by the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

impl Backend {
    pub fn from_url(url: &str) -> Result<Self, sqlx::Error> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme {
            "sqlite" => Ok(Backend::Sqlite),
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            other => Err(sqlx::Error::Configuration(
                format!("unsupported database scheme '{other}'").into(),
            )),
        }
    }

    fn migrator(self) -> &'static Migrator {
        match self {
            Backend::Sqlite => &SQLITE_MIGRATOR,
            Backend::Postgres => &POSTGRES_MIGRATOR,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AnyStore {
    pool: sqlx::Pool<sqlx::Any>,
}

impl AnyStore {
    /// Open (or create) the database at `url` and run pending migrations.
    ///
    /// `url` is any sqlx-compatible URL, e.g. `"sqlite://relay.db?mode=rwc"`
    /// or `"sqlite::memory:"` for tests (use one connection so every query
    /// sees the same in-memory database).
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let backend = Backend::from_url(url)?;
        sqlx::any::install_default_drivers();
        let options = AnyConnectOptions::from_str(url)?;
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        backend.migrator().run(&pool).await?;
        Ok(Self { pool })
    }

    /// Round-trip a trivial query to check the pool can reach the database.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
pub(crate) async fn memory_store() -> AnyStore {
    AnyStore::connect("sqlite::memory:", 1)
        .await
        .expect("in-memory sqlite")
}
