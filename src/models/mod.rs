//! Data models for database devices.
//!
//! This module re-exports all model types used throughout the crate.

pub mod dbref;
pub mod host;
pub mod record;
pub mod value;

// Re-export commonly used types
pub use dbref::{DbRef, DeviceId};
pub use host::{HostConfig, HostConfigError, HostOptions, NetworkHost, OpenFlags, Role, SqliteHost};
pub use record::{DataObject, ID_FIELD, Record, Row};
pub use value::{BoundValue, ParamType, Value};
