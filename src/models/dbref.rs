//! Backend-opaque record references.

use crate::error::{DbError, DbResult};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifier of a device. Stable across processes only when set explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random device id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Reference to a record: device, collection and record id.
///
/// A reference only resolves through the device that minted it. The token form
/// (`to_token`) is URL-safe and can be handed to other processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DbRef {
    device: DeviceId,
    collection: String,
    id: String,
}

impl DbRef {
    pub fn new(device: DeviceId, collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            device,
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Encode as a compact token.
    pub fn to_token(&self) -> String {
        let triple = (self.device.as_str(), &self.collection, &self.id);
        // Serializing a tuple of strings cannot fail.
        let json = serde_json::to_vec(&triple).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a token produced by `to_token`.
    pub fn from_token(token: &str) -> DbResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| DbError::invalid_input(format!("Malformed reference token: {}", e)))?;
        let (device, collection, id): (String, String, String) = serde_json::from_slice(&bytes)
            .map_err(|e| DbError::invalid_input(format!("Malformed reference token: {}", e)))?;
        Ok(Self::new(DeviceId(device), collection, id))
    }
}

impl std::fmt::Display for DbRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_token())
    }
}

impl FromStr for DbRef {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s)
    }
}
