//! Caller-facing seams: entry selection and session observation.

use crate::tree::{Entry, EntryState};

/// Decides which entries an execute pass includes.
///
/// Queried once per entry per pass, only for entries still in
/// [`EntryState::Default`]; the synthetic root is always included.
pub trait SelectionPolicy: Send + Sync {
    fn is_selected(&self, entry: &Entry) -> bool;
}

/// Include everything.
pub struct SelectAll;

impl SelectionPolicy for SelectAll {
    fn is_selected(&self, _entry: &Entry) -> bool {
        true
    }
}

/// Observational callbacks fired by the session engine.
///
/// Callbacks are invoked synchronously while the session holds its internal
/// lock: keep them cheap and never call back into the session from one.
pub trait SessionObserver: Send + Sync {
    fn entry_state_changed(&self, _entry: &Entry, _new: EntryState, _old: EntryState) {}

    fn session_progress(&self, _completed: f64, _total: f64) {}
}

/// Observer that ignores every event.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}
