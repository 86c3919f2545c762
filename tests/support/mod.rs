//! Shared fakes for the session engine integration tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use unfurl::archive::{ArchiveRecord, EntryReader, ProgressFn};
use unfurl::error::{DecodeError, TransportError, TransportErrorKind};
use unfurl::session::SessionObserver;
use unfurl::transport::{RemoteHandle, RemoteId, RemoteTransport};
use unfurl::tree::{Entry, EntryState};

/// Scripted in-memory backend.
///
/// Failures are injected per entry name and consumed on first use, so a
/// retry pass succeeds. Every successful operation is appended to `log` in
/// dispatch-completion order.
pub struct FakeTransport {
    next_id: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    pub aborted: AtomicBool,
    failures: Mutex<HashMap<String, TransportErrorKind>>,
    pub log: Mutex<Vec<String>>,
    /// container name -> (assigned id, parent id)
    pub containers: Mutex<HashMap<String, (String, String)>>,
    /// blob name -> (parent id, payload length)
    pub blobs: Mutex<HashMap<String, (String, usize)>>,
    /// Extra envelope bytes reported in upload progress totals.
    upload_total_padding: u64,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Self::with_padding(0)
    }

    pub fn with_padding(upload_total_padding: u64) -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            aborted: AtomicBool::new(false),
            failures: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            containers: Mutex::new(HashMap::new()),
            blobs: Mutex::new(HashMap::new()),
            upload_total_padding,
        })
    }

    pub fn fail_once(&self, name: &str, kind: TransportErrorKind) {
        self.failures.lock().insert(name.to_string(), kind);
    }

    pub fn ops(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn op_index(&self, op: &str) -> Option<usize> {
        self.log.lock().iter().position(|entry| entry == op)
    }

    pub fn count_ops_named(&self, op: &str) -> usize {
        self.log.lock().iter().filter(|entry| *entry == op).count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn check(&self, name: &str) -> Result<(), TransportError> {
        if self.aborted.load(Ordering::SeqCst) {
            return Err(TransportError::aborted());
        }
        if let Some(kind) = self.failures.lock().remove(name) {
            return Err(TransportError::new(kind, format!("injected failure for {name}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteTransport for FakeTransport {
    async fn create_container(
        &self,
        name: &str,
        parent: &RemoteId,
    ) -> Result<RemoteHandle, TransportError> {
        self.enter();
        tokio::task::yield_now().await;
        let result = self.check(name);
        self.exit();
        result?;

        let id = format!("c{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.containers
            .lock()
            .insert(name.to_string(), (id.clone(), parent.as_str().to_string()));
        self.log.lock().push(format!("folder:{name}"));
        Ok(RemoteHandle::new(RemoteId::new(id), name))
    }

    async fn upload_blob(
        &self,
        data: Vec<u8>,
        name: &str,
        parent: &RemoteId,
        progress: ProgressFn,
    ) -> Result<RemoteHandle, TransportError> {
        self.enter();
        tokio::task::yield_now().await;
        let result = self.check(name);
        self.exit();
        result?;

        let total = data.len() as u64 + self.upload_total_padding;
        progress(total / 2, total);
        progress(total, total);

        let id = format!("b{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.blobs
            .lock()
            .insert(name.to_string(), (parent.as_str().to_string(), data.len()));
        self.log.lock().push(format!("blob:{name}"));
        Ok(RemoteHandle::new(RemoteId::new(id), name))
    }

    fn abort_in_flight(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

/// Reader that reports read progress against the compressed size in two
/// chunks and then yields the uncompressed payload.
pub struct ChunkReader {
    pub compressed_size: u64,
    pub data: Vec<u8>,
    pub fail: AtomicBool,
}

#[async_trait]
impl EntryReader for ChunkReader {
    async fn read(&self, progress: ProgressFn) -> Result<Vec<u8>, DecodeError> {
        tokio::task::yield_now().await;
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(DecodeError::ChecksumMismatch);
        }
        progress(self.compressed_size / 2, self.compressed_size);
        progress(self.compressed_size, self.compressed_size);
        Ok(self.data.clone())
    }
}

/// Reader that parks until the test releases it, so a test can abort the
/// session while this entry is mid-read.
pub struct GatedReader {
    pub data: Vec<u8>,
    pub started: Arc<tokio::sync::Notify>,
    pub release: Arc<tokio::sync::Semaphore>,
}

#[async_trait]
impl EntryReader for GatedReader {
    async fn read(&self, progress: ProgressFn) -> Result<Vec<u8>, DecodeError> {
        self.started.notify_one();
        let permit = self
            .release
            .acquire()
            .await
            .map_err(|_| DecodeError::Io("gate closed".to_string()))?;
        drop(permit);
        let total = self.data.len() as u64;
        progress(total, total);
        Ok(self.data.clone())
    }
}

/// File record backed by a [`ChunkReader`]; uncompressed size is the
/// payload length.
pub fn file_record(path: &str, compressed_size: u64, data: Vec<u8>) -> ArchiveRecord {
    let uncompressed = data.len() as u64;
    ArchiveRecord::file(
        path,
        compressed_size,
        uncompressed,
        Arc::new(ChunkReader {
            compressed_size,
            data,
            fail: AtomicBool::new(false),
        }),
    )
}

/// Observer that records every transition and progress sample.
#[derive(Default)]
pub struct RecordingObserver {
    pub transitions: Mutex<Vec<(String, EntryState, EntryState)>>,
    pub progress: Mutex<Vec<(f64, f64)>>,
}

impl SessionObserver for RecordingObserver {
    fn entry_state_changed(&self, entry: &Entry, new: EntryState, old: EntryState) {
        self.transitions.lock().push((entry.path.clone(), new, old));
    }

    fn session_progress(&self, completed: f64, total: f64) {
        self.progress.lock().push((completed, total));
    }
}
