//! Observable session state
//!
//! Every session publishes a [`FetchState`] snapshot: the `{data, loading,
//! error}` triple consumers render, plus the state-machine position.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Position in the fetch state machine
///
/// `Idle` is left on the first request; `Success` and `Error` cycle back
/// through `Loading` on every network fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStatus {
    #[default]
    Idle,
    /// Cached data was published without a foreground fetch
    ServingFromCache,
    Loading,
    Success,
    Error,
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchStatus::Idle => "idle",
            FetchStatus::ServingFromCache => "serving-from-cache",
            FetchStatus::Loading => "loading",
            FetchStatus::Success => "success",
            FetchStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Snapshot of what a session currently shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchState {
    /// Last payload published, kept across failed refreshes
    pub data: Option<Arc<Value>>,
    /// Whether a foreground fetch is in progress
    pub loading: bool,
    /// Message of the last foreground failure
    pub error: Option<String>,
    pub status: FetchStatus,
}

impl FetchState {
    pub(crate) fn begin_loading(&mut self, clear_error: bool) {
        self.loading = true;
        if clear_error {
            self.error = None;
        }
        self.status = FetchStatus::Loading;
    }

    pub(crate) fn serve_cached(&mut self, value: Arc<Value>) {
        self.data = Some(value);
        self.loading = false;
        self.error = None;
        self.status = FetchStatus::ServingFromCache;
    }

    pub(crate) fn succeed(&mut self, value: Arc<Value>) {
        self.data = Some(value);
        self.loading = false;
        self.error = None;
        self.status = FetchStatus::Success;
    }

    /// Record a failure without dropping data already on display
    pub(crate) fn fail(&mut self, message: String, fallback: Option<Arc<Value>>) {
        if let Some(value) = fallback {
            self.data = Some(value);
        }
        self.loading = false;
        self.error = Some(message);
        self.status = FetchStatus::Error;
    }

    /// Undo `begin_loading` after a refresh whose failure stays silent
    ///
    /// No-op once another request has already settled the state.
    pub(crate) fn restore(&mut self, status: FetchStatus) {
        if self.status != FetchStatus::Loading {
            return;
        }
        self.loading = false;
        self.status = status;
    }
}
