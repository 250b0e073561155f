//! The callback contract every loader implementation must honor: exactly
//! one terminal invocation (`on_success`, `on_error`, `on_timeout` or
//! `on_abort`) per attempt, plus any number of ordered `on_progress` calls
//! before it.

use std::sync::Arc;

use bytes::Bytes;
use segfetch_net::NetError;

use crate::context::{LoadContext, LoadResponse, LoadStats};

pub type SuccessFn = Arc<dyn Fn(LoadResponse, LoadStats, &LoadContext) + Send + Sync>;
pub type ErrorFn = Arc<dyn Fn(NetError, &LoadContext) + Send + Sync>;
pub type TimeoutFn = Arc<dyn Fn(LoadStats, &LoadContext) + Send + Sync>;
pub type ProgressFn = Arc<dyn Fn(LoadStats, &LoadContext, Bytes) + Send + Sync>;
pub type AbortFn = Arc<dyn Fn(&LoadContext) + Send + Sync>;

/// Plain record of callback values. Owned by the coordinator, cloned into
/// loaders, never mutated by them.
#[derive(Clone)]
pub struct Callbacks {
    pub on_success: SuccessFn,
    pub on_error: ErrorFn,
    pub on_timeout: TimeoutFn,
    pub on_progress: ProgressFn,
    pub on_abort: AbortFn,
}

impl Callbacks {
    /// Callbacks that ignore every notification. Useful as a base for
    /// tests that only care about a subset.
    pub fn noop() -> Self {
        Self {
            on_success: Arc::new(|_, _, _| {}),
            on_error: Arc::new(|_, _| {}),
            on_timeout: Arc::new(|_, _| {}),
            on_progress: Arc::new(|_, _, _| {}),
            on_abort: Arc::new(|_| {}),
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks").finish_non_exhaustive()
    }
}
