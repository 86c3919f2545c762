//! Session engine: drives one archive's replication into remote storage.
//!
//! A session binds an entry tree to a destination container and walks it with
//! the bounded scheduler: directories become container creations, files
//! become decompress-then-upload pipelines. Parent-before-child is a hard
//! guarantee (children are only enqueued from their parent's completion);
//! sibling completion order is unconstrained.
//!
//! Shared state lives behind a `parking_lot::Mutex` held only for synchronous
//! transitions, never across a collaborator `.await`.

pub mod observer;
pub mod sizing;

pub use observer::{NoopObserver, SelectAll, SelectionPolicy, SessionObserver};
pub use sizing::{entry_size, ProgressLedger};

use crate::archive::ProgressFn;
use crate::config::EngineConfig;
use crate::error::{EngineError, TransportErrorKind};
use crate::scheduler::{WorkScheduler, WorkUnit};
use crate::transport::{RemoteHandle, RemoteId, RemoteTransport};
use crate::tree::{transition_allowed, Entry, EntryId, EntryState, EntryTree};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

/// Snapshot returned by [`Session::execute`] once the pass settles.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub state_counts: HashMap<EntryState, usize>,
    pub completed: f64,
    pub total: f64,
    pub has_errors: bool,
    pub has_auth_errors: bool,
    pub aborted: bool,
}

impl SessionOutcome {
    pub fn is_complete(&self) -> bool {
        !self.has_errors && !self.aborted
    }
}

struct SessionState {
    tree: EntryTree,
    target_parent: RemoteId,
    /// Set on first execute; the destination cannot move afterwards.
    target_parent_locked: bool,
    state_index: HashMap<EntryState, HashSet<EntryId>>,
    ledger: ProgressLedger,
}

struct SessionInner {
    transport: Arc<dyn RemoteTransport>,
    observer: Arc<dyn SessionObserver>,
    policy: Arc<dyn SelectionPolicy>,
    config: EngineConfig,
    scheduler: WorkScheduler,
    state: Mutex<SessionState>,
    aborted: AtomicBool,
    closed: AtomicBool,
    retried: AtomicBool,
}

/// One replication session over a built entry tree.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Session with the default observer (none) and selection (everything).
    pub fn new(
        tree: EntryTree,
        target_parent: RemoteId,
        transport: Arc<dyn RemoteTransport>,
        config: EngineConfig,
    ) -> Self {
        Self::with_collaborators(
            tree,
            target_parent,
            transport,
            Arc::new(NoopObserver),
            Arc::new(SelectAll),
            config,
        )
    }

    pub fn with_collaborators(
        tree: EntryTree,
        target_parent: RemoteId,
        transport: Arc<dyn RemoteTransport>,
        observer: Arc<dyn SessionObserver>,
        policy: Arc<dyn SelectionPolicy>,
        config: EngineConfig,
    ) -> Self {
        let scheduler = WorkScheduler::new(config.max_workers);
        let mut state_index: HashMap<EntryState, HashSet<EntryId>> = HashMap::new();
        state_index.insert(EntryState::Default, tree.ids().collect());

        Self {
            inner: Arc::new(SessionInner {
                transport,
                observer,
                policy,
                config,
                scheduler,
                state: Mutex::new(SessionState {
                    tree,
                    target_parent,
                    target_parent_locked: false,
                    state_index,
                    ledger: ProgressLedger::default(),
                }),
                aborted: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                retried: AtomicBool::new(false),
            }),
        }
    }

    /// Run one full processing pass and resolve once all scheduled work has
    /// settled. `is_retry` re-opens entries left in retryable states by a
    /// previous pass; completed containers are never recreated.
    pub async fn execute(&self, is_retry: bool) -> Result<SessionOutcome, EngineError> {
        self.ensure_open()?;
        if is_retry {
            self.inner.retried.store(true, Ordering::SeqCst);
        }
        info!(is_retry, "starting session pass");

        let (root, root_uploadable, parent_remote) = {
            let mut state = self.inner.state.lock();
            self.inner.queue_pass(&mut state);
            let total = self.inner.compute_session_size(&state);
            state.ledger.reset(total as f64);
            state.target_parent_locked = true;

            let root = state.tree.root();
            let root_entry = state.tree.entry(root);
            let uploadable = root_entry.state.is_uploadable();
            let parent_remote = match &root_entry.remote_handle {
                Some(handle) => handle.id.clone(),
                None => state.target_parent.clone(),
            };
            debug!(total, entries = state.tree.len(), "session pass sized");
            self.inner.observer.session_progress(0.0, total as f64);
            (root, uploadable, parent_remote)
        };

        if root_uploadable {
            {
                let mut state = self.inner.state.lock();
                state.tree.entry_mut(root).remote_parent = Some(parent_remote.clone());
                self.inner.set_entry_state(&mut state, root, EntryState::Pending);
            }
            let unit: WorkUnit = {
                let inner = Arc::clone(&self.inner);
                Box::new(move || Box::pin(run_folder(inner, root, parent_remote)))
            };
            self.inner.scheduler.enqueue(unit);
            self.inner.scheduler.run();
        } else {
            // Root already replicated (retry) or excluded: children go
            // directly under the known container.
            process_children(&self.inner, root, parent_remote, is_retry);
        }

        self.inner.scheduler.wait_settled().await;
        let outcome = self.outcome();
        info!(
            has_errors = outcome.has_errors,
            aborted = outcome.aborted,
            "session pass settled"
        );
        Ok(outcome)
    }

    /// Cooperatively cancel the session: pending work is dropped, dispatched
    /// transport calls are asked to abort and settle through their own
    /// results, and every entry at rest moves to `Canceled`. Progress is
    /// frozen from this point on.
    pub fn abort(&self) -> Result<(), EngineError> {
        self.ensure_open()?;
        if self.inner.aborted.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("aborting session");
        self.inner.scheduler.stop();
        self.inner.transport.abort_in_flight();

        let mut state = self.inner.state.lock();
        let ids: Vec<EntryId> = state.tree.ids().collect();
        for id in ids {
            let s = state.tree.entry(id).state;
            if !s.is_terminal() && !s.is_in_progress() {
                self.inner.set_entry_state(&mut state, id, EntryState::Canceled);
            }
        }
        Ok(())
    }

    /// Release the session. Any further call answers `SessionClosed`,
    /// including a second close.
    pub fn close(&self) -> Result<(), EngineError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(EngineError::SessionClosed);
        }
        self.inner.scheduler.stop();
        let mut state = self.inner.state.lock();
        state.state_index.clear();
        state.ledger.reset(0.0);
        debug!("session closed");
        Ok(())
    }

    /// Change the destination container. Only legal before the first
    /// execute pass.
    pub fn set_target_parent(&self, id: RemoteId) -> Result<(), EngineError> {
        self.ensure_open()?;
        let mut state = self.inner.state.lock();
        if state.target_parent_locked {
            return Err(EngineError::TargetParentLocked);
        }
        state.target_parent = id;
        Ok(())
    }

    /// Convenience: retarget next to an already-known remote object.
    pub fn update_target_parent_from_handle(
        &self,
        handle: &RemoteHandle,
    ) -> Result<(), EngineError> {
        self.set_target_parent(handle.id.clone())
    }

    pub fn target_parent(&self) -> RemoteId {
        self.inner.state.lock().target_parent.clone()
    }

    /// Any entry anywhere in the tree in an error state.
    pub fn has_errors(&self) -> bool {
        let state = self.inner.state.lock();
        scan_tree(&state.tree, state.tree.root(), &|e| e.state.is_error())
    }

    /// Any failed upload whose recorded cause was an authentication
    /// rejection; callers route these to re-authorization before retrying.
    pub fn has_auth_errors(&self) -> bool {
        let state = self.inner.state.lock();
        scan_tree(&state.tree, state.tree.root(), &|e| {
            e.state == EntryState::UploadError
                && e.last_error == Some(TransportErrorKind::Auth)
        })
    }

    /// True when no entry holds scheduled-but-unsettled work.
    pub fn is_settled(&self) -> bool {
        let state = self.inner.state.lock();
        state
            .state_index
            .iter()
            .all(|(s, bucket)| !s.is_active() || bucket.is_empty())
    }

    pub fn has_been_retried(&self) -> bool {
        self.inner.retried.load(Ordering::SeqCst)
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// `(completed, total)` of the current pass's ledger.
    pub fn progress(&self) -> (f64, f64) {
        let state = self.inner.state.lock();
        (state.ledger.completed(), state.ledger.total())
    }

    pub fn entries_in_state(&self, entry_state: EntryState) -> Vec<EntryId> {
        let state = self.inner.state.lock();
        let mut ids: Vec<EntryId> = state
            .state_index
            .get(&entry_state)
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn state_counts(&self) -> HashMap<EntryState, usize> {
        let state = self.inner.state.lock();
        state
            .state_index
            .iter()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(s, bucket)| (*s, bucket.len()))
            .collect()
    }

    pub fn entry_state(&self, path: &str) -> Option<EntryState> {
        let state = self.inner.state.lock();
        state.tree.find(path).map(|id| state.tree.entry(id).state)
    }

    pub fn entry_remote_handle(&self, path: &str) -> Option<RemoteHandle> {
        let state = self.inner.state.lock();
        state
            .tree
            .find(path)
            .and_then(|id| state.tree.entry(id).remote_handle.clone())
    }

    pub fn outcome(&self) -> SessionOutcome {
        let state = self.inner.state.lock();
        let state_counts = state
            .state_index
            .iter()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(s, bucket)| (*s, bucket.len()))
            .collect();
        let root = state.tree.root();
        SessionOutcome {
            state_counts,
            completed: state.ledger.completed(),
            total: state.ledger.total(),
            has_errors: scan_tree(&state.tree, root, &|e| e.state.is_error()),
            has_auth_errors: scan_tree(&state.tree, root, &|e| {
                e.state == EntryState::UploadError
                    && e.last_error == Some(TransportErrorKind::Auth)
            }),
            aborted: self.inner.aborted.load(Ordering::SeqCst),
        }
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(EngineError::SessionClosed);
        }
        Ok(())
    }
}

fn scan_tree(tree: &EntryTree, id: EntryId, pred: &dyn Fn(&Entry) -> bool) -> bool {
    if pred(tree.entry(id)) {
        return true;
    }
    tree.children(id)
        .into_iter()
        .any(|child| scan_tree(tree, child, pred))
}

impl SessionInner {
    /// Single choke point for entry transitions. A disallowed transition is
    /// a logic defect and panics.
    fn set_entry_state(&self, state: &mut SessionState, id: EntryId, new: EntryState) {
        let old = state.tree.entry(id).state;
        if !transition_allowed(old, new) {
            panic!(
                "illegal entry state transition {} -> {} at {:?}",
                old.as_str(),
                new.as_str(),
                state.tree.entry(id).path
            );
        }
        state.tree.entry_mut(id).state = new;
        if let Some(bucket) = state.state_index.get_mut(&old) {
            bucket.remove(&id);
        }
        state.state_index.entry(new).or_default().insert(id);

        let entry = state.tree.entry(id);
        trace!(path = %entry.path, from = old.as_str(), to = new.as_str(), "entry transition");
        self.observer.entry_state_changed(entry, new, old);
    }

    fn accrue(&self, state: &mut SessionState, delta: f64) {
        if self.aborted.load(Ordering::SeqCst) {
            return;
        }
        state.ledger.accrue(delta);
        self.observer
            .session_progress(state.ledger.completed(), state.ledger.total());
    }

    fn accrue_overhead(&self, state: &mut SessionState) {
        self.accrue(state, self.config.entry_overhead_bytes as f64);
    }

    /// Selection pass: every `Default` entry becomes `Queued` or `Skipped`.
    /// Idempotent on anything already past `Default`; descendants of a
    /// skipped directory are skipped wholesale.
    fn queue_pass(&self, state: &mut SessionState) {
        let root = state.tree.root();
        self.queue_entry(state, root, true);
    }

    fn queue_entry(&self, state: &mut SessionState, id: EntryId, parent_selected: bool) {
        let current = state.tree.entry(id).state;
        let selected = if current == EntryState::Default {
            let entry = state.tree.entry(id);
            let selected =
                parent_selected && (entry.is_root || self.policy.is_selected(entry));
            let next = if selected {
                EntryState::Queued
            } else {
                EntryState::Skipped
            };
            self.set_entry_state(state, id, next);
            selected
        } else {
            !matches!(current, EntryState::Skipped | EntryState::Canceled)
        };

        for child in state.tree.children(id) {
            self.queue_entry(state, child, selected);
        }
    }

    fn compute_session_size(&self, state: &SessionState) -> u64 {
        state
            .tree
            .ids()
            .map(|id| sizing::entry_size(state.tree.entry(id), &self.config))
            .sum()
    }

    /// A failed directory pushes its not-yet-started descendants onto the
    /// retry pass; each counts as handled for this pass's progress.
    fn cascade_pending_retry(&self, state: &mut SessionState, id: EntryId) {
        for child in state.tree.children(id) {
            let s = state.tree.entry(child).state;
            if matches!(s, EntryState::Queued | EntryState::QueuedPendingRetry) {
                self.set_entry_state(state, child, EntryState::QueuedPendingRetry);
                self.accrue_overhead(state);
            }
            self.cascade_pending_retry(state, child);
        }
    }

    fn cascade_cancel(&self, state: &mut SessionState, id: EntryId) {
        for child in state.tree.children(id) {
            let s = state.tree.entry(child).state;
            if !s.is_terminal() && !s.is_in_progress() {
                self.set_entry_state(state, child, EntryState::Canceled);
            }
            self.cascade_cancel(state, child);
        }
    }

    fn on_decompression_progress(&self, id: EntryId, current: u64, total: u64) {
        if self.aborted.load(Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.lock();
        let s = state.tree.entry(id).state;
        // Late callbacks after the entry settled are dropped.
        if !matches!(
            s,
            EntryState::BeginDecompression | EntryState::DecompressionProgress
        ) {
            return;
        }
        let delta = state.tree.entry_mut(id).decompression.advance(current, total);
        self.set_entry_state(&mut state, id, EntryState::DecompressionProgress);
        if delta > 0 {
            self.accrue(&mut state, delta as f64);
        }
    }

    fn on_upload_progress(&self, id: EntryId, current: u64, total: u64) {
        if self.aborted.load(Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.lock();
        let s = state.tree.entry(id).state;
        if !matches!(
            s,
            EntryState::BeginUpload
                | EntryState::UploadProgress
                | EntryState::UploadAllBytesTransferred
        ) {
            return;
        }
        let (delta, uncompressed) = {
            let entry = state.tree.entry_mut(id);
            (entry.upload.advance(current, total), entry.uncompressed_size)
        };
        // Wire bytes include protocol envelope; normalize so the entry's
        // accumulated contribution converges to multiplier * uncompressed.
        if delta > 0 && total > 0 {
            let scaled = self.config.transfer_multiplier as f64
                * (uncompressed as f64 / total as f64)
                * delta as f64;
            self.accrue(&mut state, scaled);
        }
        self.set_entry_state(&mut state, id, EntryState::UploadProgress);
        if total > 0 && current >= total {
            self.set_entry_state(&mut state, id, EntryState::UploadAllBytesTransferred);
        }
    }
}

/// Enqueue work for each child of `parent`. Uploadable children become work
/// units; on a retry pass, completed directories are descended into with
/// their stored remote handle instead of being recreated.
fn process_children(
    inner: &Arc<SessionInner>,
    parent: EntryId,
    parent_remote: RemoteId,
    is_retry: bool,
) {
    let mut to_start: Vec<(EntryId, bool)> = Vec::new();
    let mut to_recurse: Vec<(EntryId, RemoteId)> = Vec::new();
    {
        let mut state = inner.state.lock();
        for child in state.tree.children(parent) {
            let s = state.tree.entry(child).state;
            if inner.aborted.load(Ordering::SeqCst) {
                if !s.is_terminal() && !s.is_in_progress() {
                    inner.set_entry_state(&mut state, child, EntryState::Canceled);
                }
                continue;
            }
            if s.is_uploadable() {
                state.tree.entry_mut(child).remote_parent = Some(parent_remote.clone());
                inner.set_entry_state(&mut state, child, EntryState::Pending);
                let is_dir = state.tree.entry(child).is_directory;
                to_start.push((child, is_dir));
            } else if is_retry && s == EntryState::UploadComplete {
                let entry = state.tree.entry(child);
                if entry.is_directory {
                    if let Some(handle) = &entry.remote_handle {
                        to_recurse.push((child, handle.id.clone()));
                    }
                }
            }
        }
    }

    for (child, is_dir) in to_start {
        let unit: WorkUnit = {
            let inner = Arc::clone(inner);
            let parent_remote = parent_remote.clone();
            if is_dir {
                Box::new(move || Box::pin(run_folder(inner, child, parent_remote)))
            } else {
                Box::new(move || Box::pin(run_file(inner, child, parent_remote)))
            }
        };
        inner.scheduler.enqueue(unit);
    }
    for (child, remote) in to_recurse {
        process_children(inner, child, remote, is_retry);
    }
    inner.scheduler.run();
}

/// Directory work unit: create the remote container, then fan out into the
/// children before the scheduler slot frees.
async fn run_folder(inner: Arc<SessionInner>, id: EntryId, parent: RemoteId) {
    let name = {
        let mut state = inner.state.lock();
        let s = state.tree.entry(id).state;
        if inner.aborted.load(Ordering::SeqCst) || s.is_terminal() {
            if !s.is_terminal() && !s.is_in_progress() {
                inner.set_entry_state(&mut state, id, EntryState::Canceled);
            }
            return;
        }
        inner.set_entry_state(&mut state, id, EntryState::BeginUpload);
        state.tree.entry(id).name.clone()
    };

    debug!(folder = %name, parent = %parent, "creating remote container");
    match inner.transport.create_container(&name, &parent).await {
        Ok(handle) => {
            let child_parent = handle.id.clone();
            {
                let mut state = inner.state.lock();
                state.tree.entry_mut(id).remote_handle = Some(handle);
                inner.set_entry_state(&mut state, id, EntryState::UploadComplete);
                inner.accrue_overhead(&mut state);
            }
            let is_retry = inner.retried.load(Ordering::SeqCst);
            process_children(&inner, id, child_parent, is_retry);
        }
        Err(err) if err.is_abort() => {
            let mut state = inner.state.lock();
            state.tree.entry_mut(id).record_error(err.kind, err.message);
            inner.set_entry_state(&mut state, id, EntryState::UploadAborted);
            inner.cascade_cancel(&mut state, id);
        }
        Err(err) => {
            warn!(folder = %name, kind = err.kind.as_str(), error = %err.message, "container creation failed");
            let mut state = inner.state.lock();
            state.tree.entry_mut(id).record_error(err.kind, err.message);
            inner.set_entry_state(&mut state, id, EntryState::UploadError);
            inner.accrue_overhead(&mut state);
            inner.cascade_pending_retry(&mut state, id);
        }
    }
}

/// File work unit: decompress with progress, then upload the payload.
async fn run_file(inner: Arc<SessionInner>, id: EntryId, parent: RemoteId) {
    let (name, reader) = {
        let mut state = inner.state.lock();
        let s = state.tree.entry(id).state;
        if inner.aborted.load(Ordering::SeqCst) || s.is_terminal() {
            if !s.is_terminal() && !s.is_in_progress() {
                inner.set_entry_state(&mut state, id, EntryState::Canceled);
            }
            return;
        }
        inner.set_entry_state(&mut state, id, EntryState::BeginDecompression);
        let entry = state.tree.entry_mut(id);
        entry.decompression.reset();
        entry.upload.reset();
        (entry.name.clone(), entry.reader.clone())
    };

    let Some(reader) = reader else {
        let mut state = inner.state.lock();
        state
            .tree
            .entry_mut(id)
            .record_error(TransportErrorKind::Other, "entry has no read capability");
        inner.set_entry_state(&mut state, id, EntryState::DecompressionError);
        inner.accrue_overhead(&mut state);
        return;
    };

    let progress: ProgressFn = {
        let inner = Arc::clone(&inner);
        Arc::new(move |current, total| inner.on_decompression_progress(id, current, total))
    };
    let data = match reader.read(progress).await {
        Ok(data) => data,
        Err(err) => {
            error!(file = %name, error = %err, "entry decode failed");
            let mut state = inner.state.lock();
            if state.tree.entry(id).state.is_terminal() {
                return;
            }
            state
                .tree
                .entry_mut(id)
                .record_error(TransportErrorKind::Other, err.to_string());
            inner.set_entry_state(&mut state, id, EntryState::DecompressionError);
            inner.accrue_overhead(&mut state);
            return;
        }
    };

    {
        let mut state = inner.state.lock();
        let s = state.tree.entry(id).state;
        // The abort sweep may have canceled us mid-read.
        if s.is_terminal() {
            return;
        }
        if inner.aborted.load(Ordering::SeqCst) {
            inner.set_entry_state(&mut state, id, EntryState::Canceled);
            return;
        }
        inner.set_entry_state(&mut state, id, EntryState::DecompressionComplete);
        inner.set_entry_state(&mut state, id, EntryState::BeginUpload);
    }

    let progress: ProgressFn = {
        let inner = Arc::clone(&inner);
        Arc::new(move |current, total| inner.on_upload_progress(id, current, total))
    };
    debug!(file = %name, parent = %parent, bytes = data.len(), "uploading blob");
    match inner.transport.upload_blob(data, &name, &parent, progress).await {
        Ok(handle) => {
            let mut state = inner.state.lock();
            state.tree.entry_mut(id).remote_handle = Some(handle);
            inner.set_entry_state(&mut state, id, EntryState::UploadComplete);
            inner.accrue_overhead(&mut state);
        }
        Err(err) if err.is_abort() => {
            let mut state = inner.state.lock();
            state.tree.entry_mut(id).record_error(err.kind, err.message);
            inner.set_entry_state(&mut state, id, EntryState::UploadAborted);
        }
        Err(err) => {
            warn!(file = %name, kind = err.kind.as_str(), error = %err.message, "blob upload failed");
            let mut state = inner.state.lock();
            state.tree.entry_mut(id).record_error(err.kind, err.message);
            inner.set_entry_state(&mut state, id, EntryState::UploadError);
            inner.accrue_overhead(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveRecord, EntryReader};
    use crate::error::{DecodeError, TransportError};
    use async_trait::async_trait;

    struct StubTransport;

    #[async_trait]
    impl RemoteTransport for StubTransport {
        async fn create_container(
            &self,
            name: &str,
            _parent: &RemoteId,
        ) -> Result<RemoteHandle, TransportError> {
            Ok(RemoteHandle::new(RemoteId::new(format!("c-{name}")), name))
        }

        async fn upload_blob(
            &self,
            data: Vec<u8>,
            name: &str,
            _parent: &RemoteId,
            progress: ProgressFn,
        ) -> Result<RemoteHandle, TransportError> {
            let total = (data.len() as u64).max(1);
            progress(total, total);
            Ok(RemoteHandle::new(RemoteId::new(format!("f-{name}")), name))
        }

        fn abort_in_flight(&self) {}
    }

    struct StaticReader(Vec<u8>);

    #[async_trait]
    impl EntryReader for StaticReader {
        async fn read(&self, progress: ProgressFn) -> Result<Vec<u8>, DecodeError> {
            let total = self.0.len() as u64;
            progress(total, total);
            Ok(self.0.clone())
        }
    }

    struct SkipBin;

    impl SelectionPolicy for SkipBin {
        fn is_selected(&self, entry: &Entry) -> bool {
            !entry.name.ends_with(".bin")
        }
    }

    fn sample_tree() -> EntryTree {
        let records = vec![
            ArchiveRecord::file("docs/a.txt", 10, 30, Arc::new(StaticReader(vec![1; 30]))),
            ArchiveRecord::file("docs/b.bin", 10, 30, Arc::new(StaticReader(vec![2; 30]))),
        ];
        EntryTree::build("bundle.zip", &records).unwrap()
    }

    fn session_with(policy: Arc<dyn SelectionPolicy>) -> Session {
        Session::with_collaborators(
            sample_tree(),
            RemoteId::new("dest"),
            Arc::new(StubTransport),
            Arc::new(NoopObserver),
            policy,
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn selection_policy_skips_entries() {
        let session = session_with(Arc::new(SkipBin));
        let outcome = session.execute(false).await.unwrap();

        assert!(outcome.is_complete());
        assert_eq!(session.entry_state("docs/a.txt"), Some(EntryState::UploadComplete));
        assert_eq!(session.entry_state("docs/b.bin"), Some(EntryState::Skipped));
    }

    #[tokio::test]
    async fn closed_session_rejects_everything() {
        let session = session_with(Arc::new(SelectAll));
        session.close().unwrap();

        assert!(session.is_closed());
        assert!(matches!(session.close(), Err(EngineError::SessionClosed)));
        assert!(matches!(
            session.execute(false).await,
            Err(EngineError::SessionClosed)
        ));
        assert!(matches!(session.abort(), Err(EngineError::SessionClosed)));
    }

    #[tokio::test]
    async fn target_parent_locks_on_first_execute() {
        let session = session_with(Arc::new(SelectAll));
        session.set_target_parent(RemoteId::new("elsewhere")).unwrap();
        assert_eq!(session.target_parent(), RemoteId::new("elsewhere"));

        session.execute(false).await.unwrap();
        assert!(matches!(
            session.set_target_parent(RemoteId::new("late")),
            Err(EngineError::TargetParentLocked)
        ));
    }

    #[tokio::test]
    async fn execute_reports_retry_flag() {
        let session = session_with(Arc::new(SelectAll));
        assert!(!session.has_been_retried());
        session.execute(false).await.unwrap();
        assert!(!session.has_been_retried());
        session.execute(true).await.unwrap();
        assert!(session.has_been_retried());
    }
}
