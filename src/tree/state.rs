//! Per-entry processing state machine.
//!
//! Every state change flows through [`transition_allowed`]; the session
//! engine panics on a disallowed transition since that indicates a logic
//! defect, not a runtime condition.

use serde::{Deserialize, Serialize};

/// Processing state of one entry in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Initial state, before the selection pass.
    Default,
    /// Selected for inclusion, not yet scheduled.
    Queued,
    /// Waiting on a retry pass after an ancestor's creation failed.
    QueuedPendingRetry,
    /// Deselected by the caller's policy.
    Skipped,
    /// A work unit has been created and handed to the scheduler.
    Pending,
    /// Forced out of the session by abort before its work started.
    Canceled,
    BeginDecompression,
    DecompressionProgress,
    DecompressionComplete,
    DecompressionError,
    BeginUpload,
    UploadProgress,
    /// All bytes acknowledged by the transport; final confirmation pending.
    UploadAllBytesTransferred,
    UploadComplete,
    UploadError,
    UploadAborted,
}

impl EntryState {
    /// No further automatic transition occurs from these without an
    /// explicit retry pass. `QueuedPendingRetry` is deliberately excluded
    /// so retries re-process it.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EntryState::UploadComplete
                | EntryState::UploadError
                | EntryState::DecompressionError
                | EntryState::Skipped
                | EntryState::Canceled
                | EntryState::UploadAborted
        )
    }

    /// States from which processing should (re)start.
    pub fn is_uploadable(self) -> bool {
        matches!(
            self,
            EntryState::Queued | EntryState::QueuedPendingRetry | EntryState::UploadError
        )
    }

    /// States a cancellation sweep must not overwrite: the transfer is on
    /// the wire and will settle through its own callback.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            EntryState::BeginUpload
                | EntryState::UploadProgress
                | EntryState::UploadAllBytesTransferred
        )
    }

    pub fn is_error(self) -> bool {
        matches!(self, EntryState::UploadError | EntryState::DecompressionError)
    }

    /// States that repeat while byte progress streams in.
    pub fn is_progress(self) -> bool {
        matches!(
            self,
            EntryState::DecompressionProgress | EntryState::UploadProgress
        )
    }

    /// The entry has scheduled work that has not yet come to rest. Used by
    /// the session's active index for O(1) settled checks.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            EntryState::Pending
                | EntryState::BeginDecompression
                | EntryState::DecompressionProgress
                | EntryState::DecompressionComplete
                | EntryState::BeginUpload
                | EntryState::UploadProgress
                | EntryState::UploadAllBytesTransferred
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryState::Default => "default",
            EntryState::Queued => "queued",
            EntryState::QueuedPendingRetry => "queued_pending_retry",
            EntryState::Skipped => "skipped",
            EntryState::Pending => "pending",
            EntryState::Canceled => "canceled",
            EntryState::BeginDecompression => "begin_decompression",
            EntryState::DecompressionProgress => "decompression_progress",
            EntryState::DecompressionComplete => "decompression_complete",
            EntryState::DecompressionError => "decompression_error",
            EntryState::BeginUpload => "begin_upload",
            EntryState::UploadProgress => "upload_progress",
            EntryState::UploadAllBytesTransferred => "upload_all_bytes_transferred",
            EntryState::UploadComplete => "upload_complete",
            EntryState::UploadError => "upload_error",
            EntryState::UploadAborted => "upload_aborted",
        }
    }
}

/// Central transition table.
///
/// Progress states allow self-transitions (byte events repeat). The
/// cancellation arcs cover both the abort sweep (any resting, non-terminal
/// state) and the cooperative checks inside work units (decompression can
/// be cancelled mid-flight; wire uploads cannot, they settle on their own).
pub fn transition_allowed(from: EntryState, to: EntryState) -> bool {
    use EntryState::*;
    match (from, to) {
        (Default, Queued) | (Default, Skipped) => true,

        (Queued, Pending) | (QueuedPendingRetry, Pending) | (UploadError, Pending) => true,

        // A failed directory cascades pending-retry onto descendants that
        // never got a chance to run (and re-marks ones from a prior pass).
        (Queued, QueuedPendingRetry) | (QueuedPendingRetry, QueuedPendingRetry) => true,

        (Pending, BeginUpload) | (Pending, BeginDecompression) => true,

        (BeginDecompression, DecompressionProgress)
        | (BeginDecompression, DecompressionComplete)
        | (BeginDecompression, DecompressionError) => true,
        (DecompressionProgress, DecompressionProgress)
        | (DecompressionProgress, DecompressionComplete)
        | (DecompressionProgress, DecompressionError) => true,
        (DecompressionComplete, BeginUpload) => true,

        (BeginUpload, UploadProgress)
        | (BeginUpload, UploadComplete)
        | (BeginUpload, UploadError)
        | (BeginUpload, UploadAborted) => true,
        (UploadProgress, UploadProgress)
        | (UploadProgress, UploadAllBytesTransferred)
        | (UploadProgress, UploadComplete)
        | (UploadProgress, UploadError)
        | (UploadProgress, UploadAborted) => true,
        // Late progress events can arrive after the all-bytes mark.
        (UploadAllBytesTransferred, UploadProgress)
        | (UploadAllBytesTransferred, UploadComplete)
        | (UploadAllBytesTransferred, UploadError)
        | (UploadAllBytesTransferred, UploadAborted) => true,

        // Cancellation: settled-or-unstarted entries only; in-progress wire
        // transfers reach UploadAborted/UploadError via their own result.
        (
            Default | Queued | QueuedPendingRetry | Pending | BeginDecompression
            | DecompressionProgress | DecompressionComplete,
            Canceled,
        ) => true,

        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EntryState::*;

    const ALL: [EntryState; 16] = [
        Default,
        Queued,
        QueuedPendingRetry,
        Skipped,
        Pending,
        Canceled,
        BeginDecompression,
        DecompressionProgress,
        DecompressionComplete,
        DecompressionError,
        BeginUpload,
        UploadProgress,
        UploadAllBytesTransferred,
        UploadComplete,
        UploadError,
        UploadAborted,
    ];

    #[test]
    fn terminal_states_have_no_exits_except_upload_error_retry() {
        for from in ALL {
            if !from.is_terminal() {
                continue;
            }
            for to in ALL {
                let allowed = transition_allowed(from, to);
                if from == UploadError && to == Pending {
                    assert!(allowed, "retry path must re-open failed entries");
                } else {
                    assert!(!allowed, "{from:?} -> {to:?} must be rejected");
                }
            }
        }
    }

    #[test]
    fn in_progress_states_resist_cancellation() {
        for from in [BeginUpload, UploadProgress, UploadAllBytesTransferred] {
            assert!(!transition_allowed(from, Canceled));
            assert!(transition_allowed(from, UploadAborted));
        }
    }

    #[test]
    fn decompression_can_be_cancelled_mid_flight() {
        assert!(transition_allowed(BeginDecompression, Canceled));
        assert!(transition_allowed(DecompressionProgress, Canceled));
        assert!(transition_allowed(DecompressionComplete, Canceled));
    }

    #[test]
    fn progress_states_allow_repeats() {
        assert!(transition_allowed(DecompressionProgress, DecompressionProgress));
        assert!(transition_allowed(UploadProgress, UploadProgress));
        assert!(!transition_allowed(BeginUpload, BeginUpload));
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&QueuedPendingRetry).unwrap();
        assert_eq!(json, "\"queued_pending_retry\"");
        let back: EntryState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, QueuedPendingRetry);
    }

    #[test]
    fn queued_pending_retry_is_not_terminal() {
        assert!(!QueuedPendingRetry.is_terminal());
        assert!(QueuedPendingRetry.is_uploadable());
        assert!(transition_allowed(QueuedPendingRetry, Pending));
    }

    #[test]
    fn happy_paths_are_reachable() {
        // Folder unit.
        for (a, b) in [(Default, Queued), (Queued, Pending), (Pending, BeginUpload), (BeginUpload, UploadComplete)] {
            assert!(transition_allowed(a, b), "{a:?} -> {b:?}");
        }
        // File unit.
        for (a, b) in [
            (Pending, BeginDecompression),
            (BeginDecompression, DecompressionProgress),
            (DecompressionProgress, DecompressionComplete),
            (DecompressionComplete, BeginUpload),
            (BeginUpload, UploadProgress),
            (UploadProgress, UploadAllBytesTransferred),
            (UploadAllBytesTransferred, UploadComplete),
        ] {
            assert!(transition_allowed(a, b), "{a:?} -> {b:?}");
        }
    }
}
