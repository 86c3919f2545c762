//! Entry tree: the logical contents of the archive as an arena of nodes.
//!
//! Nodes are addressed by [`EntryId`] (a stable arena index); parent/child
//! relations are index lookups rather than owned references, so the session
//! engine can mutate per-entry state without cyclic ownership.

pub mod state;

pub use state::{transition_allowed, EntryState};

use crate::archive::{root_name_from_filename, ArchiveRecord, EntryReader};
use crate::error::{EngineError, TransportErrorKind};
use crate::transport::{RemoteHandle, RemoteId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Stable identifier of an entry within one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u32);

impl EntryId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Byte counters for one transfer phase, reset at the start of each
/// processing attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferTelemetry {
    pub prev: u64,
    pub current: u64,
    pub total: u64,
}

impl TransferTelemetry {
    pub fn reset(&mut self) {
        *self = TransferTelemetry::default();
    }

    /// Record a new progress sample, returning the byte delta since the
    /// previous sample.
    pub fn advance(&mut self, current: u64, total: u64) -> u64 {
        self.prev = self.current;
        self.current = current;
        self.total = total;
        current.saturating_sub(self.prev)
    }
}

/// One file-or-directory node in the extracted archive's logical tree.
pub struct Entry {
    pub path: String,
    pub name: String,
    pub is_directory: bool,
    pub is_root: bool,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub state: EntryState,
    pub decompression: TransferTelemetry,
    pub upload: TransferTelemetry,
    /// Destination container assigned when the work unit was created.
    pub remote_parent: Option<RemoteId>,
    /// Created remote object; for directories this becomes the children's
    /// parent container.
    pub remote_handle: Option<RemoteHandle>,
    pub last_error: Option<TransportErrorKind>,
    pub last_error_message: Option<String>,
    pub parent: Option<EntryId>,
    pub children: BTreeMap<String, EntryId>,
    pub(crate) reader: Option<Arc<dyn EntryReader>>,
}

impl Entry {
    fn new(path: String, name: String, is_directory: bool) -> Self {
        Self {
            path,
            name,
            is_directory,
            is_root: false,
            compressed_size: 0,
            uncompressed_size: 0,
            state: EntryState::Default,
            decompression: TransferTelemetry::default(),
            upload: TransferTelemetry::default(),
            remote_parent: None,
            remote_handle: None,
            last_error: None,
            last_error_message: None,
            parent: None,
            children: BTreeMap::new(),
            reader: None,
        }
    }

    pub fn has_reader(&self) -> bool {
        self.reader.is_some()
    }

    pub fn record_error(&mut self, kind: TransportErrorKind, message: impl Into<String>) {
        self.last_error = Some(kind);
        self.last_error_message = Some(message.into());
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("path", &self.path)
            .field("is_directory", &self.is_directory)
            .field("is_root", &self.is_root)
            .field("state", &self.state)
            .field("children", &self.children.len())
            .finish()
    }
}

/// The single root entry plus the full descendant arena, built exactly once
/// per session from the archive's record sequence.
pub struct EntryTree {
    entries: Vec<Entry>,
    by_path: HashMap<String, EntryId>,
    root: EntryId,
}

impl EntryTree {
    /// Build the tree from an ordered sequence of raw archive records.
    ///
    /// Intermediate directories implied by deeper paths are created on
    /// demand; an existing node is never overwritten by a later record with
    /// the same path (first structural reference wins), though a terminal
    /// file record's read capability is attached to a reader-less leaf.
    pub fn build(
        archive_filename: &str,
        records: &[ArchiveRecord],
    ) -> Result<Self, EngineError> {
        let root_name = root_name_from_filename(archive_filename);
        let mut root_entry = Entry::new(root_name.clone(), root_name.clone(), true);
        root_entry.is_root = true;

        let root = EntryId(0);
        let mut tree = Self {
            entries: vec![root_entry],
            by_path: HashMap::from([(root_name, root)]),
            root,
        };

        for record in records {
            tree.insert_record(record)?;
        }

        debug!(
            entry_count = tree.entries.len(),
            archive = archive_filename,
            "built entry tree"
        );
        Ok(tree)
    }

    fn insert_record(&mut self, record: &ArchiveRecord) -> Result<(), EngineError> {
        // Directory records carry a trailing slash; normalize it away so
        // "dir1/dir2/" and an implied "dir1/dir2" land on the same node.
        let normalized = record.path.strip_suffix('/').unwrap_or(&record.path);
        let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Err(EngineError::InvalidRecordPath(record.path.clone()));
        }

        let last = segments.len() - 1;
        let mut current = self.root;
        let mut current_path = String::new();

        for (i, segment) in segments.iter().enumerate() {
            if !current_path.is_empty() {
                current_path.push('/');
            }
            current_path.push_str(segment);

            match self.entries[current.index()].children.get(*segment).copied() {
                Some(existing) => {
                    // A duplicate terminal file record still contributes its
                    // read capability when the node is a file leaf.
                    if i == last && !record.is_directory {
                        let entry = &mut self.entries[existing.index()];
                        if !entry.is_directory && entry.reader.is_none() {
                            entry.reader = record.reader.clone();
                        }
                    }
                    current = existing;
                }
                None => {
                    let is_dir = i < last || record.is_directory;
                    let mut entry =
                        Entry::new(current_path.clone(), segment.to_string(), is_dir);
                    entry.parent = Some(current);
                    if i == last && !is_dir {
                        entry.compressed_size = record.compressed_size;
                        entry.uncompressed_size = record.uncompressed_size;
                        entry.reader = record.reader.clone();
                    }

                    let id = EntryId(self.entries.len() as u32);
                    self.entries.push(entry);
                    self.entries[current.index()]
                        .children
                        .insert(segment.to_string(), id);
                    self.by_path.entry(current_path.clone()).or_insert(id);
                    current = id;
                }
            }
        }

        Ok(())
    }

    pub fn root(&self) -> EntryId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        // The synthetic root always exists.
        self.entries.len() <= 1
    }

    pub fn entry(&self, id: EntryId) -> &Entry {
        &self.entries[id.index()]
    }

    pub(crate) fn entry_mut(&mut self, id: EntryId) -> &mut Entry {
        &mut self.entries[id.index()]
    }

    pub fn find(&self, path: &str) -> Option<EntryId> {
        self.by_path.get(path).copied()
    }

    /// Children of `id` in name order.
    pub fn children(&self, id: EntryId) -> Vec<EntryId> {
        self.entries[id.index()].children.values().copied().collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        (0..self.entries.len()).map(|i| EntryId(i as u32))
    }
}
