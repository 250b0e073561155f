use tokio::sync::broadcast;

use crate::{
    context::{LoadResponse, LoadStats},
    fragment::Fragment,
};

/// Classifier attached to network error events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorDetail {
    LoadError,
    LoadTimeout,
}

#[derive(Clone, Debug)]
pub enum LoadEvent {
    FragmentLoaded {
        fragment: Fragment,
        response: LoadResponse,
        stats: LoadStats,
    },
    LoadProgress {
        fragment: Fragment,
        stats: LoadStats,
        chunk: bytes::Bytes,
    },
    NetworkError {
        detail: ErrorDetail,
        /// Always false: a single failed fragment load is recoverable.
        fatal: bool,
        fragment: Fragment,
        reason: String,
    },
    EmergencyAborted {
        fragment: Fragment,
    },
}

#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<LoadEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoadEvent> {
        self.tx.subscribe()
    }

    pub fn emit_fragment_loaded(
        &self,
        fragment: Fragment,
        response: LoadResponse,
        stats: LoadStats,
    ) {
        let _ = self.tx.send(LoadEvent::FragmentLoaded {
            fragment,
            response,
            stats,
        });
    }

    pub fn emit_load_progress(&self, fragment: Fragment, stats: LoadStats, chunk: bytes::Bytes) {
        let _ = self.tx.send(LoadEvent::LoadProgress {
            fragment,
            stats,
            chunk,
        });
    }

    pub fn emit_network_error(&self, detail: ErrorDetail, fragment: Fragment, reason: String) {
        let _ = self.tx.send(LoadEvent::NetworkError {
            detail,
            fatal: false,
            fragment,
            reason,
        });
    }

    pub fn emit_emergency_aborted(&self, fragment: Fragment) {
        let _ = self.tx.send(LoadEvent::EmergencyAborted { fragment });
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(128)
    }
}
