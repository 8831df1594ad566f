//! Checked-out connections.

use crate::backend::{Adapter, BackendKind};
use crate::db::collection::Collection;
use crate::db::device::{Device, PooledAdapter};
use crate::db::result::ResultSet;
use crate::db::statement::Statement;
use crate::error::{DbError, DbResult};
use crate::models::{DataObject, DbRef, Role};
use tracing::{debug, warn};

/// A connection checked out of a `Device`.
///
/// Hand it back with `release()`. Dropping it instead discards the backend
/// handle and frees its slot in the pool.
pub struct Connection {
    device: Device,
    id: u64,
    role: Role,
    handle: Option<PooledAdapter>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("device", self.device.id())
            .field("id", &self.id)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(device: Device, id: u64, role: Role, handle: PooledAdapter) -> Self {
        Self {
            device,
            id,
            role,
            handle: Some(handle),
        }
    }

    /// Pool-assigned connection id, unique within its device.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Backend serving this connection.
    pub fn kind(&self) -> BackendKind {
        self.handle
            .as_ref()
            .map(|handle| handle.adapter.kind())
            .unwrap_or_else(|| self.device.kind())
    }

    pub(crate) fn take_handle(&mut self) -> Option<PooledAdapter> {
        self.handle.take()
    }

    pub(crate) fn adapter(&mut self) -> DbResult<&mut (dyn Adapter + 'static)> {
        self.handle
            .as_mut()
            .map(|handle| handle.adapter.as_mut())
            .ok_or_else(|| DbError::internal(format!("connection {} was released", self.id)))
    }

    /// Return this connection to its device.
    pub async fn release(self) -> DbResult<()> {
        let device = self.device.clone();
        device.release(self).await
    }

    /// Probe the backend. Networked backends are bounded by the liveness timeout.
    pub async fn is_alive(&mut self) -> bool {
        let timeout = self.device.options().liveness_timeout_or_default();
        match self.adapter() {
            Ok(adapter) => adapter.is_alive(timeout).await,
            Err(_) => false,
        }
    }

    /// Fetch the record a reference points to.
    ///
    /// References minted by another device never resolve here.
    pub async fn resolve(&mut self, dbref: &DbRef) -> DbResult<Option<DataObject>> {
        if dbref.device() != self.device.id() {
            debug!(
                device = %self.device.id(),
                dbref_device = %dbref.device(),
                "Reference belongs to another device"
            );
            return Ok(None);
        }

        let row = self
            .adapter()?
            .fetch_record(dbref.collection(), dbref.id())
            .await?;
        Ok(row.map(|row| DataObject::new(dbref.device().clone(), dbref.collection(), row)))
    }

    /// Names of the collections visible on this connection, sorted ascending.
    pub async fn collections(&mut self) -> DbResult<Vec<String>> {
        self.adapter()?.collections().await
    }

    /// Collection handle for `name`. Existence is not checked.
    pub fn collection(&mut self, name: impl Into<String>) -> Collection<'_> {
        Collection::new(self, name.into())
    }

    /// Compile `query` for repeated execution.
    pub async fn prepare(&mut self, query: &str) -> DbResult<Statement<'_>> {
        let device = self.device.id().clone();
        debug!(device = %device, connection_id = self.id, "Preparing statement");
        let prepared = self.adapter()?.prepare(query).await?;
        Ok(Statement::new(prepared, device, query))
    }

    /// Run `query` immediately.
    pub async fn query<'a>(&'a mut self, query: &'a str) -> DbResult<ResultSet<'a>> {
        let device = self.device.id().clone();
        debug!(device = %device, connection_id = self.id, "Executing query");
        let cursor = self.adapter()?.query(query).await?;
        Ok(ResultSet::new(cursor, device, None))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.handle.take().is_some() {
            warn!(
                device = %self.device.id(),
                connection_id = self.id,
                "Connection dropped without release - consider calling release()"
            );
            self.device.forget(self.id);
        }
    }
}
