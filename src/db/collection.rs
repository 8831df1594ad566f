//! Named collections of records.

use crate::db::connection::Connection;
use crate::db::result::ResultSet;
use crate::error::DbResult;
use crate::models::{DataObject, DbRef, Row};

/// A table or document collection reached through a connection.
///
/// The handle is not checked against the backend; a missing collection only
/// surfaces when its records are read.
pub struct Collection<'c> {
    conn: &'c mut Connection,
    name: String,
    scan: String,
}

impl std::fmt::Debug for Collection<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("connection", &self.conn.id())
            .finish_non_exhaustive()
    }
}

impl<'c> Collection<'c> {
    pub(crate) fn new(conn: &'c mut Connection, name: String) -> Self {
        let scan = conn.kind().scan_query(&name);
        Self { conn, name, scan }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every record of the collection, as `DataObject`s carrying their `_id`.
    pub async fn results(&mut self) -> DbResult<ResultSet<'_>> {
        let device = self.conn.device().id().clone();
        let cursor = self.conn.adapter()?.query(&self.scan).await?;
        Ok(ResultSet::new(cursor, device, Some(self.name.clone())))
    }

    /// Record with the backend-native identity `id`.
    pub async fn get(&mut self, id: &str) -> DbResult<Option<DataObject>> {
        let dbref = self.dbref(id);
        self.conn.resolve(&dbref).await
    }

    /// Reference to the record `id` of this collection.
    pub fn dbref(&self, id: impl Into<String>) -> DbRef {
        DbRef::new(self.conn.device().id().clone(), self.name.clone(), id)
    }

    /// Wrap a raw row of this collection.
    pub fn object(&self, row: Row) -> DataObject {
        DataObject::new(self.conn.device().id().clone(), self.name.clone(), row)
    }
}
