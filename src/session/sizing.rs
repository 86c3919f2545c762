//! Session size accounting and the progress ledger.

use crate::config::EngineConfig;
use crate::tree::Entry;

/// Contribution of one entry to the session total.
///
/// Entries that are not currently uploadable contribute nothing (already
/// completed, skipped, or canceled). A directory costs only the fixed
/// per-entry overhead; a file additionally costs its compressed read plus
/// its uncompressed upload weighted by the transfer multiplier.
pub fn entry_size(entry: &Entry, config: &EngineConfig) -> u64 {
    if !entry.state.is_uploadable() {
        return 0;
    }
    if entry.is_directory {
        config.entry_overhead_bytes
    } else {
        entry.compressed_size
            + config.transfer_multiplier * entry.uncompressed_size
            + config.entry_overhead_bytes
    }
}

/// Monotone progress accumulator for one execute pass.
///
/// Completed/total are fractional because upload deltas are normalized
/// against the wire-reported total, which includes protocol envelope bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressLedger {
    completed: f64,
    total: f64,
}

impl ProgressLedger {
    pub fn reset(&mut self, total: f64) {
        self.completed = 0.0;
        self.total = total;
    }

    pub fn accrue(&mut self, delta: f64) {
        self.completed += delta;
    }

    pub fn completed(&self) -> f64 {
        self.completed
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn fraction(&self) -> f64 {
        if self.total > 0.0 {
            (self.completed / self.total).min(1.0)
        } else {
            0.0
        }
    }
}
