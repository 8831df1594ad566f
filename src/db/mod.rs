//! Database device layer.
//!
//! This module provides the types callers work with:
//! - `Device`: host registry and connection pool
//! - `Connection`: a checked-out backend connection
//! - `Statement`: prepared query with typed parameter binding
//! - `ResultSet`: lazy cursor over query results
//! - `Collection`: named table or document collection
//! - Type mappings and parameter binding shared by the SQL backends

pub mod collection;
pub mod connection;
pub mod device;
pub(crate) mod params;
pub mod pool;
pub mod result;
pub mod statement;
pub mod types;

pub use collection::Collection;
pub use connection::Connection;
pub use device::{Device, DeviceBuilder};
pub use pool::PoolStatus;
pub use result::{Current, ResultSet};
pub use statement::Statement;
