//! Backend adapters.
//!
//! Each backend variant maps generic host options to its native connect call and
//! returns an adapter satisfying the traits below:
//! - `sqlite`: embedded SQLite through sqlx
//! - `postgres`: networked PostgreSQL through sqlx
//! - `memory`: in-process document store with native record keys
//!
//! The public `Connection`, `Statement` and `ResultSet` types in `crate::db` wrap
//! these traits; callers never see the concrete adapters.

pub mod memory;
pub mod postgres;
pub(crate) mod sql;
pub mod sqlite;

use crate::config::PoolOptions;
use crate::error::{DbError, DbResult};
use crate::models::{BoundValue, HostOptions, Record, Row};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Supported backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Sqlite,
    Postgres,
    Memory,
}

impl BackendKind {
    /// Get the display name for this backend.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Sqlite => "SQLite",
            Self::Postgres => "PostgreSQL",
            Self::Memory => "Memory",
        }
    }

    /// Create a connection for `host`. This is the only backend-specific entry point.
    pub async fn create_connection(
        self,
        host: &HostOptions,
        options: &PoolOptions,
    ) -> DbResult<Box<dyn Adapter>> {
        match (self, host) {
            (Self::Sqlite, HostOptions::Sqlite(h)) => sqlite::connect(h, options).await,
            (Self::Postgres, HostOptions::Postgres(h)) => postgres::connect(h, options).await,
            (Self::Memory, HostOptions::Memory(store)) => Ok(memory::connect(store)),
            (kind, host) => Err(DbError::configuration(format!(
                "{} host '{}' cannot be opened by the {} backend",
                host.kind(),
                host.describe(),
                kind
            ))),
        }
    }

    /// Query selecting every record of `collection` with its identity as `_id`.
    pub fn scan_query(&self, collection: &str) -> String {
        match self {
            Self::Sqlite => sqlite::scan_query(collection),
            Self::Postgres => postgres::scan_query(collection),
            Self::Memory => memory::scan_query(collection),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A live backend handle.
#[async_trait]
pub trait Adapter: Send {
    fn kind(&self) -> BackendKind;

    /// Liveness probe. Networked backends bound the round-trip by `timeout`.
    async fn is_alive(&mut self, timeout: Duration) -> bool;

    /// Names of visible collections, sorted ascending.
    async fn collections(&mut self) -> DbResult<Vec<String>>;

    /// Fetch one record by its native identity. `None` when absent.
    async fn fetch_record(&mut self, collection: &str, id: &str) -> DbResult<Option<Row>>;

    /// Execute an unparameterized query.
    async fn query<'a>(&'a mut self, query: &'a str) -> DbResult<Box<dyn Cursor + 'a>>;

    /// Compile a parameterized query.
    async fn prepare<'a>(&'a mut self, query: &str) -> DbResult<Box<dyn PreparedQuery + 'a>>;

    /// Close the backend handle gracefully.
    async fn close(self: Box<Self>) -> DbResult<()>;
}

/// A compiled query bound to the adapter that compiled it.
#[async_trait]
pub trait PreparedQuery: Send {
    /// Number of placeholders declared by the compiled query.
    fn param_count(&self) -> usize;

    /// Run with `params`, which already match `param_count` and their types.
    async fn execute<'s>(&'s mut self, params: &'s [BoundValue])
    -> DbResult<Box<dyn Cursor + 's>>;
}

/// Backend-side cursor.
#[async_trait]
pub trait Cursor: Send {
    /// Fetch the next record, `None` once exhausted.
    async fn fetch(&mut self) -> DbResult<Option<Record>>;

    /// Restart from the first record, or fail with `UnsupportedOperation`.
    async fn reset(&mut self) -> DbResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SqliteHost;

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::Postgres.to_string(), "PostgreSQL");
    }

    #[tokio::test]
    async fn test_mismatched_host_is_configuration_error() {
        let host = HostOptions::Sqlite(SqliteHost::new(":memory:"));
        let result = BackendKind::Memory
            .create_connection(&host, &PoolOptions::default())
            .await;
        assert!(matches!(result, Err(DbError::Configuration { .. })));
    }

    #[test]
    fn test_scan_query_quotes_names() {
        assert_eq!(
            BackendKind::Sqlite.scan_query("my \"t\""),
            "SELECT rowid AS _id, * FROM \"my \"\"t\"\"\""
        );
    }
}
