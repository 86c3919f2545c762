//! Remote storage transport contract.
//!
//! The engine replicates the entry tree through two primitives: container
//! (folder) creation and blob upload. Retry/backoff internals, credentials,
//! and the wire protocol are the transport's own business; the engine only
//! consumes the results. A user-initiated abort surfaces as a normal result
//! with [`TransportErrorKind::Aborted`](crate::error::TransportErrorKind).

use crate::archive::ProgressFn;
use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque identifier of a remote container, assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteId(pub String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a created remote object (folder or file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHandle {
    pub id: RemoteId,
    pub name: String,
    /// Backend link for presentation, when the transport provides one.
    pub link: Option<String>,
}

impl RemoteHandle {
    pub fn new(id: RemoteId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            link: None,
        }
    }
}

/// Remote storage operations consumed by the session engine.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Create a container named `name` under `parent`.
    async fn create_container(
        &self,
        name: &str,
        parent: &RemoteId,
    ) -> Result<RemoteHandle, TransportError>;

    /// Upload `data` as a blob named `name` under `parent`, reporting raw
    /// protocol byte progress (which may exceed `data.len()` due to
    /// envelope overhead).
    async fn upload_blob(
        &self,
        data: Vec<u8>,
        name: &str,
        parent: &RemoteId,
        progress: ProgressFn,
    ) -> Result<RemoteHandle, TransportError>;

    /// Ask the transport to cancel operations already dispatched. Their
    /// futures still resolve (typically with an `Aborted` error) and the
    /// engine handles those results normally.
    fn abort_in_flight(&self);
}
