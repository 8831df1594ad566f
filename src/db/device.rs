//! Database devices: host registry and connection pool.
//!
//! A `Device` owns the hosts registered per role and the connections opened on
//! them. Released connections are kept idle per role and reused after a
//! liveness probe; new connections pick a host of the role in round-robin
//! order. A semaphore bounds the number of live connections, idle ones
//! included.

use crate::backend::memory::MemoryStore;
use crate::backend::{Adapter, BackendKind};
use crate::config::{AcquireMode, PoolOptions};
use crate::db::connection::Connection;
use crate::db::pool::{PoolState, PoolStatus};
use crate::error::{DbError, DbResult};
use crate::models::{DeviceId, HostConfig, HostOptions, NetworkHost, OpenFlags, Role, SqliteHost};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info, warn};

/// A live backend handle together with its connection slot.
pub(crate) struct PooledAdapter {
    pub(crate) adapter: Box<dyn Adapter>,
    permit: OwnedSemaphorePermit,
}

impl PooledAdapter {
    async fn close(self, device: &DeviceId) {
        if let Err(e) = self.adapter.close().await {
            debug!(device = %device, error = %e, "Error while closing connection");
        }
    }
}

/// Outcome of a checkout attempt.
enum Slot {
    Reused(Connection),
    Fresh(OwnedSemaphorePermit),
}

/// Builder registering hosts and pool options before a device is created.
#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    kind: BackendKind,
    id: Option<DeviceId>,
    hosts: HashMap<Role, Vec<HostOptions>>,
    options: PoolOptions,
}

impl DeviceBuilder {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            id: None,
            hosts: HashMap::new(),
            options: PoolOptions::default(),
        }
    }

    /// Register a host under `role`. Several hosts per role are allowed.
    ///
    /// Hosts are not validated until a connection is opened on them.
    pub fn add_host(mut self, role: Role, options: HostOptions) -> Self {
        self.hosts.entry(role).or_default().push(options);
        self
    }

    /// Register a parsed host configuration.
    pub fn add_host_config(self, host: HostConfig) -> Self {
        self.add_host(host.role, host.options)
    }

    pub fn pool_options(mut self, options: PoolOptions) -> Self {
        self.options = options;
        self
    }

    /// Use a fixed device id instead of a random one.
    ///
    /// References minted by a device only resolve on a device with the same id,
    /// so a stable id is needed to resolve tokens across processes.
    pub fn id(mut self, id: impl Into<DeviceId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn build(self) -> DbResult<Device> {
        self.options
            .validate()
            .map_err(DbError::configuration)?;

        let id = self.id.unwrap_or_else(DeviceId::generate);
        let max_connections = self.options.max_connections_or_default();
        let host_count: usize = self.hosts.values().map(Vec::len).sum();

        info!(
            device = %id,
            backend = %self.kind,
            hosts = host_count,
            max_connections,
            "Device created"
        );

        Ok(Device {
            inner: Arc::new(DeviceInner {
                id,
                kind: self.kind,
                hosts: self.hosts,
                limiter: Arc::new(Semaphore::new(max_connections as usize)),
                options: self.options,
                released: Notify::new(),
                state: Mutex::new(PoolState::new()),
            }),
        })
    }
}

struct DeviceInner {
    id: DeviceId,
    kind: BackendKind,
    hosts: HashMap<Role, Vec<HostOptions>>,
    options: PoolOptions,
    limiter: Arc<Semaphore>,
    /// Signalled whenever a checked-out connection comes back or is forgotten
    released: Notify,
    state: Mutex<PoolState<PooledAdapter>>,
}

/// Handle to a database device. Cloning shares the pool.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl Device {
    pub fn builder(kind: BackendKind) -> DeviceBuilder {
        DeviceBuilder::new(kind)
    }

    /// Device with a single SQLite master host.
    pub fn sqlite(
        file: impl Into<String>,
        flags: OpenFlags,
        key: Option<String>,
    ) -> DbResult<Self> {
        let host = SqliteHost {
            file: file.into(),
            flags,
            key,
        };
        DeviceBuilder::new(BackendKind::Sqlite)
            .add_host(Role::Master, HostOptions::Sqlite(host))
            .build()
    }

    /// Device with a single PostgreSQL master host.
    pub fn postgres(url: impl Into<String>) -> DbResult<Self> {
        DeviceBuilder::new(BackendKind::Postgres)
            .add_host(Role::Master, HostOptions::Postgres(NetworkHost::new(url)))
            .build()
    }

    /// Device serving both roles from one memory store.
    pub fn memory(store: MemoryStore) -> DbResult<Self> {
        DeviceBuilder::new(BackendKind::Memory)
            .add_host(Role::Master, HostOptions::Memory(store.clone()))
            .add_host(Role::Slave, HostOptions::Memory(store))
            .build()
    }

    pub fn id(&self) -> &DeviceId {
        &self.inner.id
    }

    pub fn kind(&self) -> BackendKind {
        self.inner.kind
    }

    pub fn options(&self) -> &PoolOptions {
        &self.inner.options
    }

    /// Hosts registered under `role`.
    pub fn hosts(&self, role: Role) -> &[HostOptions] {
        self.inner
            .hosts
            .get(&role)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) fn same_device(&self, other: &Device) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut PoolState<PooledAdapter>) -> R) -> R {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn closed_error(&self) -> DbError {
        DbError::unavailable(format!("device {} is closed", self.inner.id))
    }

    /// Check out a connection for `role`.
    ///
    /// Reuses the most recently released connection of the role when it is still
    /// alive; otherwise opens a new one on the next host of the role.
    pub async fn connection(&self, role: Role) -> DbResult<Connection> {
        let hosts = self.hosts(role);
        if hosts.is_empty() {
            return Err(DbError::no_host(role));
        }
        if self.with_state(|s| s.is_closed()) {
            return Err(self.closed_error());
        }

        let permit = match self.checkout(role).await? {
            Slot::Reused(connection) => return Ok(connection),
            Slot::Fresh(permit) => permit,
        };
        let host = &hosts[self.with_state(|s| s.pick_host(role, hosts.len()))];
        let adapter = self.create_connection(host).await?;
        let handle = PooledAdapter { adapter, permit };

        let registered = self.with_state(|s| (!s.is_closed()).then(|| s.register()));
        let Some(id) = registered else {
            handle.close(&self.inner.id).await;
            return Err(self.closed_error());
        };

        info!(
            device = %self.inner.id,
            role = %role,
            connection_id = id,
            host = %host.describe(),
            "Opened connection"
        );
        Ok(Connection::new(self.clone(), id, role, handle))
    }

    /// Reuse an idle connection or obtain a slot for a new one, applying the
    /// acquire mode once the limit is reached.
    async fn checkout(&self, role: Role) -> DbResult<Slot> {
        if let Some(slot) = self.try_checkout(role).await? {
            return Ok(slot);
        }

        let max_connections = self.inner.options.max_connections_or_default();
        match self.inner.options.acquire_mode_or_default() {
            AcquireMode::FailFast => Err(DbError::PoolExhausted { max_connections }),
            AcquireMode::Wait => {
                let timeout = self.inner.options.acquire_timeout_or_default();
                debug!(device = %self.inner.id, role = %role, "Waiting for a free connection slot");
                tokio::time::timeout(timeout, self.wait_for_slot(role))
                    .await
                    .unwrap_or_else(|_| {
                        Err(DbError::timeout("connection acquire", timeout.as_secs()))
                    })
            }
        }
    }

    /// Wait until a connection is released or a slot frees up.
    async fn wait_for_slot(&self, role: Role) -> DbResult<Slot> {
        let limiter = Arc::clone(&self.inner.limiter);
        loop {
            tokio::select! {
                _ = self.inner.released.notified() => {
                    if let Some(slot) = self.try_checkout(role).await? {
                        return Ok(slot);
                    }
                }
                permit = limiter.clone().acquire_owned() => {
                    return permit.map(Slot::Fresh).map_err(|_| self.closed_error());
                }
            }
        }
    }

    /// One non-blocking checkout attempt: idle reuse, then a free slot, then
    /// the slot of an evicted idle connection of another role.
    async fn try_checkout(&self, role: Role) -> DbResult<Option<Slot>> {
        if let Some(connection) = self.reuse_idle(role).await? {
            return Ok(Some(Slot::Reused(connection)));
        }

        match Arc::clone(&self.inner.limiter).try_acquire_owned() {
            Ok(permit) => return Ok(Some(Slot::Fresh(permit))),
            Err(TryAcquireError::Closed) => return Err(self.closed_error()),
            Err(TryAcquireError::NoPermits) => {}
        }

        let Some(evicted) = self.with_state(|s| s.evict_idle_except(role)) else {
            return Ok(None);
        };
        debug!(device = %self.inner.id, role = %role, "Evicting idle connection of another role");
        let PooledAdapter { adapter, permit } = evicted;
        if let Err(e) = adapter.close().await {
            debug!(device = %self.inner.id, error = %e, "Error while closing evicted connection");
        }
        Ok(Some(Slot::Fresh(permit)))
    }

    /// Check out the most recently idled live connection of `role`.
    /// Dead idle connections are closed on the way.
    async fn reuse_idle(&self, role: Role) -> DbResult<Option<Connection>> {
        let liveness_timeout = self.inner.options.liveness_timeout_or_default();
        while let Some((id, mut handle)) = self.with_state(|s| s.take_idle(role)) {
            if !handle.adapter.is_alive(liveness_timeout).await {
                warn!(
                    device = %self.inner.id,
                    role = %role,
                    connection_id = id,
                    "Discarding dead idle connection"
                );
                handle.close(&self.inner.id).await;
                continue;
            }

            // The device may have been closed during the probe
            if !self.with_state(|s| s.check_out(id)) {
                handle.close(&self.inner.id).await;
                return Err(self.closed_error());
            }
            debug!(device = %self.inner.id, role = %role, connection_id = id, "Reusing idle connection");
            return Ok(Some(Connection::new(self.clone(), id, role, handle)));
        }
        Ok(None)
    }

    /// Open a backend connection for `host` with this device's options.
    pub async fn create_connection(&self, host: &HostOptions) -> DbResult<Box<dyn Adapter>> {
        self.inner
            .kind
            .create_connection(host, &self.inner.options)
            .await
    }

    /// Return a connection to the pool without closing it.
    pub async fn release(&self, mut connection: Connection) -> DbResult<()> {
        if !self.same_device(connection.device()) {
            return Err(DbError::ForeignConnection {
                connection_id: connection.id(),
                device: self.inner.id.to_string(),
            });
        }

        let id = connection.id();
        let role = connection.role();
        let Some(handle) = connection.take_handle() else {
            return Err(DbError::DoubleRelease { connection_id: id });
        };

        match self.with_state(|s| s.check_in(role, id, handle))? {
            None => {
                debug!(device = %self.inner.id, role = %role, connection_id = id, "Connection released");
                self.inner.released.notify_one();
            }
            Some(handle) => {
                debug!(device = %self.inner.id, connection_id = id, "Device closed, closing released connection");
                handle.close(&self.inner.id).await;
            }
        }
        Ok(())
    }

    /// Forget a connection that was dropped without being released.
    pub(crate) fn forget(&self, id: u64) {
        self.with_state(|s| s.forget(id));
        self.inner.released.notify_one();
    }

    /// Close the device: idle connections are closed and no new ones are opened.
    ///
    /// Connections still checked out are closed when they are released.
    pub async fn close(&self) {
        let idle = self.with_state(|s| {
            s.close();
            s.drain_idle()
        });
        self.inner.limiter.close();
        self.inner.released.notify_waiters();

        info!(device = %self.inner.id, idle = idle.len(), "Closing device");
        for handle in idle {
            handle.close(&self.inner.id).await;
        }
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.with_state(|s| PoolStatus {
            device: self.inner.id.to_string(),
            idle: s.idle_count(),
            busy: s.busy_count(),
            max_connections: self.inner.options.max_connections_or_default(),
            closed: s.is_closed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_rejects_invalid_options() {
        let result = Device::builder(BackendKind::Memory)
            .pool_options(PoolOptions {
                max_connections: Some(0),
                ..Default::default()
            })
            .build();
        assert!(matches!(result, Err(DbError::Configuration { .. })));
    }

    #[test]
    fn test_explicit_id() {
        let device = Device::builder(BackendKind::Memory)
            .id("orders")
            .build()
            .unwrap();
        assert_eq!(device.id().as_str(), "orders");
        assert!(device.hosts(Role::Master).is_empty());
    }

    #[tokio::test]
    async fn test_no_host_for_role() {
        let device = Device::builder(BackendKind::Memory)
            .add_host(Role::Master, HostOptions::Memory(MemoryStore::new()))
            .build()
            .unwrap();
        let err = device.connection(Role::Slave).await.unwrap_err();
        assert!(matches!(err, DbError::NoHostConfigured { role: Role::Slave }));
    }

    #[tokio::test]
    async fn test_reuse_after_release() {
        let device = Device::memory(MemoryStore::new()).unwrap();
        let conn = device.connection(Role::Master).await.unwrap();
        let id = conn.id();
        assert_eq!(device.pool_status().busy, 1);

        device.release(conn).await.unwrap();
        assert_eq!(device.pool_status().idle, 1);

        let again = device.connection(Role::Master).await.unwrap();
        assert_eq!(again.id(), id);
        again.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_release_to_other_device() {
        let a = Device::memory(MemoryStore::new()).unwrap();
        let b = Device::memory(MemoryStore::new()).unwrap();
        let conn = a.connection(Role::Master).await.unwrap();
        let err = b.release(conn).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignConnection { .. }));
        // The rejected connection was dropped and forgotten by its own device
        assert_eq!(a.pool_status().busy, 0);
    }

    #[tokio::test]
    async fn test_closed_device() {
        let device = Device::memory(MemoryStore::new()).unwrap();
        let conn = device.connection(Role::Slave).await.unwrap();
        device.close().await;

        assert!(matches!(
            device.connection(Role::Slave).await,
            Err(DbError::BackendUnavailable { .. })
        ));
        conn.release().await.unwrap();
        let status = device.pool_status();
        assert!(status.closed);
        assert_eq!((status.idle, status.busy), (0, 0));
    }
}
