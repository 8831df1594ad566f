//! Database device library.
//!
//! A `Device` registers database hosts by role (master/slave) and pools the
//! connections opened on them. Every backend exposes the same surface:
//! - `Connection`: liveness, collections, reference resolution, queries
//! - `Statement`: prepared queries with typed parameter binding
//! - `ResultSet`: lazy cursor yielding raw rows or `DataObject`s
//! - `DbRef`: backend-opaque reference to a record
//!
//! Supported backends are SQLite and PostgreSQL through sqlx, and an in-process
//! document store (`MemoryStore`).
//!
//! ```no_run
//! use dbdevice::{Device, OpenFlags, Role};
//!
//! # async fn run() -> dbdevice::DbResult<()> {
//! let device = Device::sqlite("app.db", OpenFlags::default(), None)?;
//! let mut conn = device.connection(Role::Master).await?;
//! {
//!     let mut users = conn.collection("users");
//!     let mut results = users.results().await?;
//!     while results.valid().await? {
//!         println!("{:?}", results.current());
//!         results.next();
//!     }
//! }
//! conn.release().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use backend::BackendKind;
pub use backend::memory::MemoryStore;
pub use config::{AcquireMode, PoolOptions};
pub use db::{
    Collection, Connection, Current, Device, DeviceBuilder, PoolStatus, ResultSet, Statement,
};
pub use error::{BindingError, DbError, DbResult};
pub use models::{
    DataObject, DbRef, DeviceId, HostConfig, HostOptions, NetworkHost, OpenFlags, ParamType, Role,
    Row, SqliteHost, Value,
};
