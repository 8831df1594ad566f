//! In-process document store.
//!
//! Collections hold schemaless JSON objects keyed by an auto-assigned numeric
//! id, exposed as `_id`. The store is shared by every connection opened on it,
//! and its availability flag lets callers simulate an outage.
//!
//! # Query language
//!
//! ```text
//! FIND <collection> [WHERE <field> = <operand> [AND <field> = <operand>]...]
//! ```
//!
//! An operand is a JSON literal or the placeholder `?`. Keywords are case
//! insensitive; field names may be quoted with double quotes.

use crate::backend::{Adapter, BackendKind, Cursor, PreparedQuery};
use crate::error::{DbError, DbResult};
use crate::models::{BoundValue, ID_FIELD, Record, Row};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::debug;

/// Shared in-memory document store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<StoreInner>>,
}

#[derive(Debug)]
struct StoreInner {
    available: bool,
    collections: BTreeMap<String, Documents>,
}

#[derive(Debug, Default)]
struct Documents {
    next_id: u64,
    records: BTreeMap<u64, Row>,
}

impl Documents {
    fn with_id(id: u64, row: &Row) -> Row {
        let mut row = row.clone();
        row.insert(ID_FIELD.to_string(), JsonValue::from(id));
        row
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                available: true,
                collections: BTreeMap::new(),
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty collection if it does not exist yet.
    pub fn create_collection(&self, name: &str) {
        self.write().collections.entry(name.to_string()).or_default();
    }

    /// Insert a document and return its assigned id. An `_id` field in `row` is ignored.
    pub fn insert(&self, collection: &str, mut row: Row) -> u64 {
        row.remove(ID_FIELD);
        let mut inner = self.write();
        let docs = inner.collections.entry(collection.to_string()).or_default();
        docs.next_id += 1;
        let id = docs.next_id;
        docs.records.insert(id, row);
        id
    }

    /// Insert or replace the document stored under `id`.
    pub fn put(&self, collection: &str, id: u64, mut row: Row) -> Option<Row> {
        row.remove(ID_FIELD);
        let mut inner = self.write();
        let docs = inner.collections.entry(collection.to_string()).or_default();
        docs.next_id = docs.next_id.max(id);
        docs.records.insert(id, row)
    }

    /// Document stored under `id`, with its `_id` field.
    pub fn get(&self, collection: &str, id: u64) -> Option<Row> {
        self.read()
            .collections
            .get(collection)
            .and_then(|docs| docs.records.get(&id))
            .map(|row| Documents::with_id(id, row))
    }

    pub fn remove(&self, collection: &str, id: u64) -> Option<Row> {
        self.write()
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.records.remove(&id))
    }

    /// Number of documents in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.read()
            .collections
            .get(collection)
            .map(|docs| docs.records.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Collection names, sorted ascending.
    pub fn collection_names(&self) -> Vec<String> {
        self.read().collections.keys().cloned().collect()
    }

    /// Mark the store reachable or not. Unavailable stores fail liveness probes.
    pub fn set_available(&self, available: bool) {
        self.write().available = available;
    }

    pub fn is_available(&self) -> bool {
        self.read().available
    }

    fn ensure_available(&self) -> DbResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(DbError::unavailable("memory store is offline"))
        }
    }

    /// Snapshot of the documents matching every filter, in id order.
    fn select(&self, collection: &str, filters: &[(String, JsonValue)]) -> Vec<Row> {
        let inner = self.read();
        let Some(docs) = inner.collections.get(collection) else {
            return Vec::new();
        };
        docs.records
            .iter()
            .map(|(id, row)| Documents::with_id(*id, row))
            .filter(|row| {
                filters
                    .iter()
                    .all(|(field, expected)| row.get(field).is_some_and(|v| loose_eq(v, expected)))
            })
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON equality that treats numerically equal numbers as equal.
fn loose_eq(left: &JsonValue, right: &JsonValue) -> bool {
    match (left, right) {
        (JsonValue::Number(a), JsonValue::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => left == right,
    }
}

// =============================================================================
// Query Parsing
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    /// Index of a `?` placeholder
    Param(usize),
    Literal(JsonValue),
}

#[derive(Debug, Clone, PartialEq)]
struct FindQuery {
    collection: String,
    filters: Vec<(String, Operand)>,
}

impl FindQuery {
    fn param_count(&self) -> usize {
        self.filters
            .iter()
            .filter(|(_, op)| matches!(op, Operand::Param(_)))
            .count()
    }

    fn resolve(&self, params: &[BoundValue]) -> DbResult<Vec<(String, JsonValue)>> {
        self.filters
            .iter()
            .map(|(field, operand)| {
                let value = match operand {
                    Operand::Literal(v) => v.clone(),
                    Operand::Param(idx) => params
                        .get(*idx)
                        .map(BoundValue::to_json)
                        .ok_or_else(|| DbError::internal(format!("parameter {} is not bound", idx)))?,
                };
                Ok((field.clone(), value))
            })
            .collect()
    }
}

struct Parser<'q> {
    rest: &'q str,
    params: usize,
}

impl<'q> Parser<'q> {
    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    /// Next run of non-whitespace characters, stopping before `=`.
    fn word(&mut self) -> Option<&'q str> {
        self.skip_ws();
        let end = self
            .rest
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(self.rest.len());
        if end == 0 {
            return None;
        }
        let (word, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(word)
    }

    fn keyword(&mut self, keyword: &str) -> bool {
        let saved = self.rest;
        match self.word() {
            Some(w) if w.eq_ignore_ascii_case(keyword) => true,
            _ => {
                self.rest = saved;
                false
            }
        }
    }

    fn name(&mut self) -> Result<String, String> {
        self.skip_ws();
        if let Some(mut quoted) = self.rest.strip_prefix('"') {
            // `""` inside a quoted name stands for one `"`
            let mut name = String::new();
            loop {
                let end = quoted
                    .find('"')
                    .ok_or_else(|| "unterminated quoted name".to_string())?;
                name.push_str(&quoted[..end]);
                match quoted[end + 1..].strip_prefix('"') {
                    Some(rest) => {
                        name.push('"');
                        quoted = rest;
                    }
                    None => {
                        self.rest = &quoted[end + 1..];
                        return Ok(name);
                    }
                }
            }
        }
        self.word()
            .map(str::to_string)
            .ok_or_else(|| "expected a name".to_string())
    }

    fn operand(&mut self) -> Result<Operand, String> {
        self.skip_ws();
        if let Some(rest) = self.rest.strip_prefix('?') {
            self.rest = rest;
            self.params += 1;
            return Ok(Operand::Param(self.params - 1));
        }
        let mut values = serde_json::Deserializer::from_str(self.rest).into_iter::<JsonValue>();
        match values.next() {
            Some(Ok(value)) => {
                let consumed = values.byte_offset();
                self.rest = &self.rest[consumed..];
                Ok(Operand::Literal(value))
            }
            Some(Err(e)) => Err(format!("invalid literal: {}", e)),
            None => Err("expected a value after '='".to_string()),
        }
    }

    fn parse(query: &'q str) -> Result<FindQuery, String> {
        let mut parser = Parser {
            rest: query,
            params: 0,
        };
        if !parser.keyword("FIND") {
            return Err("query must start with FIND".to_string());
        }
        let collection = parser.name()?;
        let mut filters = Vec::new();

        if parser.keyword("WHERE") {
            loop {
                let field = parser.name()?;
                parser.skip_ws();
                parser.rest = parser
                    .rest
                    .strip_prefix('=')
                    .ok_or_else(|| format!("expected '=' after field '{}'", field))?;
                filters.push((field, parser.operand()?));
                if !parser.keyword("AND") {
                    break;
                }
            }
        }

        parser.skip_ws();
        if !parser.rest.is_empty() {
            return Err(format!("unexpected input '{}'", parser.rest));
        }
        Ok(FindQuery {
            collection,
            filters,
        })
    }
}

/// Query selecting every document of `collection`.
pub(crate) fn scan_query(collection: &str) -> String {
    format!("FIND \"{}\"", collection.replace('"', "\"\""))
}

// =============================================================================
// Adapter
// =============================================================================

/// Open a connection on `store`. Never fails; availability is checked per call.
pub(crate) fn connect(store: &MemoryStore) -> Box<dyn Adapter> {
    debug!("Opening memory store connection");
    Box::new(MemoryAdapter {
        store: store.clone(),
    })
}

struct MemoryAdapter {
    store: MemoryStore,
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn is_alive(&mut self, _timeout: Duration) -> bool {
        self.store.is_available()
    }

    async fn collections(&mut self) -> DbResult<Vec<String>> {
        self.store.ensure_available()?;
        Ok(self.store.collection_names())
    }

    async fn fetch_record(&mut self, collection: &str, id: &str) -> DbResult<Option<Row>> {
        self.store.ensure_available()?;
        Ok(id
            .parse::<u64>()
            .ok()
            .and_then(|id| self.store.get(collection, id)))
    }

    async fn query<'a>(&'a mut self, query: &'a str) -> DbResult<Box<dyn Cursor + 'a>> {
        let parsed =
            Parser::parse(query).map_err(|message| DbError::execution_message(message, query))?;
        if parsed.param_count() > 0 {
            return Err(DbError::execution_message(
                format!(
                    "query declares {} parameters; prepare it and bind values",
                    parsed.param_count()
                ),
                query,
            ));
        }
        self.store.ensure_available()?;
        let rows = self.store.select(&parsed.collection, &parsed.resolve(&[])?);
        Ok(Box::new(MemoryCursor::new(rows)))
    }

    async fn prepare<'a>(&'a mut self, query: &str) -> DbResult<Box<dyn PreparedQuery + 'a>> {
        let parsed =
            Parser::parse(query).map_err(|message| DbError::compile_message(message, query))?;
        Ok(Box::new(MemoryPrepared {
            store: self.store.clone(),
            query: parsed,
        }))
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        Ok(())
    }
}

struct MemoryPrepared {
    store: MemoryStore,
    query: FindQuery,
}

#[async_trait]
impl PreparedQuery for MemoryPrepared {
    fn param_count(&self) -> usize {
        self.query.param_count()
    }

    async fn execute<'s>(
        &'s mut self,
        params: &'s [BoundValue],
    ) -> DbResult<Box<dyn Cursor + 's>> {
        self.store.ensure_available()?;
        let filters = self.query.resolve(params)?;
        let rows = self.store.select(&self.query.collection, &filters);
        Ok(Box::new(MemoryCursor::new(rows)))
    }
}

/// Cursor over a snapshot taken when the query ran. Always rewindable.
struct MemoryCursor {
    rows: Vec<Row>,
    pos: usize,
}

impl MemoryCursor {
    fn new(rows: Vec<Row>) -> Self {
        Self { rows, pos: 0 }
    }
}

#[async_trait]
impl Cursor for MemoryCursor {
    async fn fetch(&mut self) -> DbResult<Option<Record>> {
        let record = self.rows.get(self.pos).cloned().map(Record::from_row);
        if record.is_some() {
            self.pos += 1;
        }
        Ok(record)
    }

    async fn reset(&mut self) -> DbResult<()> {
        self.pos = 0;
        Ok(())
    }
}
