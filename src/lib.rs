//! Unfurl: Archive Extraction and Remote Replication Engine
//!
//! Replicates the contents of a client-side extracted archive into a remote
//! storage backend, tracking per-entry state, errors, and session progress.
//! Archive decoding and the storage wire protocol are external collaborators
//! plugged in through the [`archive`] and [`transport`] contracts; the engine
//! owns the entry tree, the bounded scheduler, and the session lifecycle.

pub mod archive;
pub mod config;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod session;
pub mod transport;
pub mod tree;

pub use config::{EngineConfig, UnfurlConfig};
pub use error::{DecodeError, EngineError, TransportError, TransportErrorKind};
pub use session::{Session, SessionObserver, SessionOutcome, SelectionPolicy};
pub use transport::{RemoteHandle, RemoteId, RemoteTransport};
pub use tree::{EntryId, EntryState, EntryTree};
