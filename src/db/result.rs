//! Lazy result cursors.
//!
//! A `ResultSet` is driven with the protocol
//!
//! ```text
//! rewind() -> repeat { valid(), current(), next() }
//! ```
//!
//! `valid()` fetches at most one backend row per position into a single
//! buffer; `next()` only moves the position and re-arms the fetch.

use crate::backend::Cursor;
use crate::error::DbResult;
use crate::models::{DataObject, DeviceId, Record, Row};
use serde::Serialize;

/// Projection of the current row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Current {
    /// Raw row of a result not bound to a collection
    Row(Row),
    /// Record of a collection
    Object(DataObject),
}

impl Current {
    pub fn row(&self) -> &Row {
        match self {
            Self::Row(row) => row,
            Self::Object(obj) => obj.row(),
        }
    }

    pub fn into_row(self) -> Row {
        match self {
            Self::Row(row) => row,
            Self::Object(obj) => obj.into_row(),
        }
    }

    pub fn into_object(self) -> Option<DataObject> {
        match self {
            Self::Row(_) => None,
            Self::Object(obj) => Some(obj),
        }
    }
}

/// Cursor state over a backend result.
pub struct ResultSet<'c> {
    cursor: Box<dyn Cursor + 'c>,
    device: DeviceId,
    collection: Option<String>,
    position: usize,
    buffer: Option<Record>,
    fetched: bool,
    exhausted: bool,
}

impl std::fmt::Debug for ResultSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("collection", &self.collection)
            .field("position", &self.position)
            .field("fetched", &self.fetched)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl<'c> ResultSet<'c> {
    pub(crate) fn new(
        cursor: Box<dyn Cursor + 'c>,
        device: DeviceId,
        collection: Option<String>,
    ) -> Self {
        Self {
            cursor,
            device,
            collection,
            position: 0,
            buffer: None,
            fetched: false,
            exhausted: false,
        }
    }

    /// Restart from the first row.
    ///
    /// SQL cursors are forward-only: once a row has been fetched this fails with
    /// `UnsupportedOperation` and the cursor state is left untouched.
    pub async fn rewind(&mut self) -> DbResult<()> {
        self.cursor.reset().await?;
        self.position = 0;
        self.buffer = None;
        self.fetched = false;
        self.exhausted = false;
        Ok(())
    }

    /// Whether a row exists at the current position, fetching it if needed.
    pub async fn valid(&mut self) -> DbResult<bool> {
        if self.exhausted {
            return Ok(false);
        }
        if !self.fetched {
            self.buffer = self.cursor.fetch().await?;
            self.fetched = true;
            self.exhausted = self.buffer.is_none();
        }
        Ok(self.buffer.is_some())
    }

    /// The buffered row: a `DataObject` when bound to a collection, else the raw row.
    pub fn current(&self) -> Option<Current> {
        let record = self.buffer.as_ref()?;
        Some(match &self.collection {
            Some(collection) => Current::Object(DataObject::new(
                self.device.clone(),
                collection.clone(),
                record.row.clone(),
            )),
            None => Current::Row(record.row.clone()),
        })
    }

    /// Advance to the next position. The row is fetched by the next `valid()`.
    pub fn next(&mut self) {
        self.position += 1;
        self.fetched = false;
    }

    /// Backend-native identity of the buffered row.
    pub fn key(&self) -> Option<&str> {
        self.buffer.as_ref().and_then(|r| r.id.as_deref())
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Collection the rows belong to, if any.
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Drive the whole protocol from a rewind and collect every row.
    pub async fn fetch_all(&mut self) -> DbResult<Vec<Current>> {
        self.rewind().await?;
        let mut rows = Vec::new();
        while self.valid().await? {
            if let Some(current) = self.current() {
                rows.push(current);
            }
            self.next();
        }
        Ok(rows)
    }
}
