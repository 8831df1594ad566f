//! Embedded SQLite adapter.
//!
//! Records are identified by `rowid`, which every scan selects as `_id`.

use crate::backend::sql::{SqlCursor, connect_failed, declared_params, quote_ident};
use crate::backend::{Adapter, BackendKind, Cursor, PreparedQuery};
use crate::config::PoolOptions;
use crate::db::params::bind_sqlite_param;
use crate::db::types::RowToRecord;
use crate::error::{DbError, DbResult};
use crate::models::{BoundValue, OpenFlags, Row, SqliteHost};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteStatement};
use sqlx::{ConnectOptions, Connection, Executor, Statement};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const LIST_TABLES: &str = "SELECT name FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

/// Query selecting every row of `table` with its rowid as `_id`.
pub(crate) fn scan_query(table: &str) -> String {
    format!("SELECT rowid AS _id, * FROM {}", quote_ident(table))
}

fn connect_options(host: &SqliteHost) -> DbResult<SqliteConnectOptions> {
    let options = if host.file == ":memory:" {
        SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            DbError::connection(
                format!("Invalid SQLite connection string: {}", e),
                "Check the connection URL format: sqlite:path/to/db.sqlite",
            )
        })?
    } else {
        SqliteConnectOptions::new().filename(&host.file)
    };

    let read_only = host.flags.is_read_only();
    let mut options = options
        .read_only(read_only)
        .create_if_missing(!read_only && host.flags.contains(OpenFlags::CREATE));

    if let Some(key) = &host.key {
        options = options.pragma("key", format!("'{}'", key.replace('\'', "''")));
    }

    Ok(options)
}

/// Open a single SQLite connection for `host`.
pub(crate) async fn connect(host: &SqliteHost, pool: &PoolOptions) -> DbResult<Box<dyn Adapter>> {
    let options = connect_options(host)?;
    let connect_timeout = pool.connect_timeout_or_default();

    debug!(
        file = %host.file,
        read_only = host.flags.is_read_only(),
        encrypted = host.key.is_some(),
        "Opening SQLite database"
    );

    let conn = tokio::time::timeout(connect_timeout, options.connect())
        .await
        .map_err(|_| DbError::timeout("SQLite connect", connect_timeout.as_secs()))?
        .map_err(|e| connect_failed(BackendKind::Sqlite, &e))?;

    info!(file = %host.file, "SQLite database opened");
    Ok(Box::new(SqliteAdapter { conn }))
}

struct SqliteAdapter {
    conn: SqliteConnection,
}

#[async_trait]
impl Adapter for SqliteAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn is_alive(&mut self, _timeout: Duration) -> bool {
        // An open file handle stays usable
        true
    }

    async fn collections(&mut self) -> DbResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(LIST_TABLES)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| DbError::unavailable(format!("Failed to list tables: {}", e)))
    }

    async fn fetch_record(&mut self, collection: &str, id: &str) -> DbResult<Option<Row>> {
        let Ok(rowid) = id.parse::<i64>() else {
            return Ok(None);
        };
        let sql = format!("{} WHERE rowid = ?", scan_query(collection));
        let row = sqlx::query(&sql)
            .bind(rowid)
            .fetch_optional(&mut self.conn)
            .await
            .map_err(|e| DbError::execution(e, &sql))?;
        Ok(row.map(|r| r.to_row()))
    }

    async fn query<'a>(&'a mut self, query: &'a str) -> DbResult<Box<dyn Cursor + 'a>> {
        let stream = (&mut self.conn).fetch(query);
        let cursor = SqlCursor::open(stream, query).await?;
        Ok(Box::new(cursor))
    }

    async fn prepare<'a>(&'a mut self, query: &str) -> DbResult<Box<dyn PreparedQuery + 'a>> {
        let stmt = (&mut self.conn)
            .prepare(query)
            .await
            .map_err(|e| DbError::compile(e, query))?;
        let stmt = Statement::to_owned(&stmt);
        let param_count = declared_params(&stmt);

        debug!(param_count, "Prepared SQLite statement");
        Ok(Box::new(SqlitePrepared {
            conn: &mut self.conn,
            stmt,
            param_count,
        }))
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        self.conn.close().await.map_err(DbError::from)
    }
}

struct SqlitePrepared<'a> {
    conn: &'a mut SqliteConnection,
    stmt: SqliteStatement<'static>,
    param_count: usize,
}

#[async_trait]
impl<'a> PreparedQuery for SqlitePrepared<'a> {
    fn param_count(&self) -> usize {
        self.param_count
    }

    async fn execute<'s>(
        &'s mut self,
        params: &'s [BoundValue],
    ) -> DbResult<Box<dyn Cursor + 's>> {
        let Self { conn, stmt, .. } = self;
        let query = params
            .iter()
            .fold(stmt.query(), |query, param| bind_sqlite_param(query, param));
        let stream = query.fetch(&mut **conn);
        let cursor = SqlCursor::open(stream, stmt.sql()).await?;
        Ok(Box::new(cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParamType;

    async fn open_memory() -> Box<dyn Adapter> {
        connect(&SqliteHost::new(":memory:"), &PoolOptions::default())
            .await
            .unwrap()
    }

    async fn seed(adapter: &mut Box<dyn Adapter>) {
        for sql in [
            "CREATE TABLE users (name TEXT, age INTEGER, active BOOLEAN)",
            "INSERT INTO users VALUES ('ann', 31, 1), ('bob', 42, 0)",
        ] {
            let mut cursor = adapter.query(sql).await.unwrap();
            while cursor.fetch().await.unwrap().is_some() {}
        }
    }

    #[test]
    fn test_scan_query() {
        assert_eq!(scan_query("users"), "SELECT rowid AS _id, * FROM \"users\"");
    }

    #[tokio::test]
    async fn test_collections_hide_internal_tables() {
        let mut adapter = open_memory().await;
        seed(&mut adapter).await;
        let mut cursor = adapter
            .query("CREATE TABLE alpha (id INTEGER PRIMARY KEY AUTOINCREMENT)")
            .await
            .unwrap();
        while cursor.fetch().await.unwrap().is_some() {}
        drop(cursor);

        // AUTOINCREMENT creates sqlite_sequence
        assert_eq!(adapter.collections().await.unwrap(), vec!["alpha", "users"]);
    }

    #[tokio::test]
    async fn test_fetch_record_by_rowid() {
        let mut adapter = open_memory().await;
        seed(&mut adapter).await;

        let row = adapter.fetch_record("users", "2").await.unwrap().unwrap();
        assert_eq!(row["name"], "bob");
        assert_eq!(row["_id"], 2);
        assert_eq!(row["active"], false);

        assert!(adapter.fetch_record("users", "99").await.unwrap().is_none());
        assert!(adapter.fetch_record("users", "abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prepare_reports_param_count() {
        let mut adapter = open_memory().await;
        seed(&mut adapter).await;

        let mut stmt = adapter
            .prepare("SELECT name FROM users WHERE age > ? AND name <> ?")
            .await
            .unwrap();
        assert_eq!(stmt.param_count(), 2);

        let params = [BoundValue::Integer(35), BoundValue::Null(ParamType::Text)];
        let mut cursor = stmt.execute(&params).await.unwrap();
        // NULL comparison filters everything out
        assert!(cursor.fetch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prepare_syntax_error_is_compile_error() {
        let mut adapter = open_memory().await;
        let result = adapter.prepare("SELEC nothing").await;
        assert!(matches!(result, Err(DbError::Compile { .. })));
    }

    #[tokio::test]
    async fn test_query_error_is_execution_error() {
        let mut adapter = open_memory().await;
        let result = adapter.query("SELECT * FROM missing_table").await;
        assert!(matches!(result, Err(DbError::Execution { .. })));
    }

    #[tokio::test]
    async fn test_cursor_rewind_only_before_fetch() {
        let mut adapter = open_memory().await;
        seed(&mut adapter).await;

        let mut cursor = adapter.query("SELECT name FROM users").await.unwrap();
        cursor.reset().await.unwrap();
        assert!(cursor.fetch().await.unwrap().is_some());
        assert!(matches!(
            cursor.reset().await,
            Err(DbError::UnsupportedOperation { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_only_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = SqliteHost::new(dir.path().join("absent.db").to_string_lossy());
        host.flags = OpenFlags::READ_ONLY;
        let result = connect(&host, &PoolOptions::default()).await;
        assert!(matches!(result, Err(DbError::Connection { .. })));
    }
}
