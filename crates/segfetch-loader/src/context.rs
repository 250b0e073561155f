use std::time::{Duration, Instant};

use bytes::Bytes;
use segfetch_net::{RangeSpec, RetryPolicy};
use url::Url;

use crate::fragment::Fragment;

/// How the response body is decoded before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Binary,
    Text,
}

/// Which retrieval path a load attempt takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Deliver the payload once fully downloaded.
    Buffered,
    /// Deliver bytes incrementally; consumption start is queue-gated.
    Progressive,
}

/// Immutable per-attempt bundle passed between coordinator and loader.
#[derive(Debug, Clone)]
pub struct LoadContext {
    pub url: Url,
    pub response_type: ResponseType,
    pub fragment: Fragment,
    /// Set only when the fragment carries both range bounds. Not used on
    /// the progressive path.
    pub range: Option<RangeSpec>,
    pub mode: LoadMode,
}

/// Declarative loader configuration. Retries are transported, never
/// executed here; the coordinator wires `max_retries = 0`.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
        }
    }
}

/// Timing and byte counters for one load attempt.
#[derive(Debug, Clone, Copy)]
pub struct LoadStats {
    /// When the request was issued.
    pub trequest: Instant,
    /// When response headers resolved; clamped to be >= `trequest`.
    pub tfirst: Option<Instant>,
    /// When the body fully resolved; clamped to be >= `tfirst`.
    pub tload: Option<Instant>,
    pub loaded: u64,
    pub total: u64,
    pub retry: u32,
}

impl LoadStats {
    pub fn start() -> Self {
        Self {
            trequest: Instant::now(),
            tfirst: None,
            tload: None,
            loaded: 0,
            total: 0,
            retry: 0,
        }
    }

    pub fn mark_first_byte(&mut self) {
        self.tfirst = Some(self.trequest.max(Instant::now()));
    }

    pub fn mark_loaded(&mut self) {
        let floor = self.tfirst.unwrap_or(self.trequest);
        self.tload = Some(floor.max(Instant::now()));
    }
}

/// Decoded payload of a buffered load.
#[derive(Debug, Clone)]
pub enum LoadPayload {
    Binary(Bytes),
    Text(String),
}

impl LoadPayload {
    pub fn len(&self) -> u64 {
        match self {
            Self::Binary(bytes) => bytes.len() as u64,
            Self::Text(text) => text.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Terminal success value handed to `on_success`.
///
/// Buffered loads carry the payload; progressive loads carry only the final
/// byte count (all bytes were already delivered through progress calls).
#[derive(Debug, Clone)]
pub struct LoadResponse {
    pub url: Url,
    pub payload: Option<LoadPayload>,
    pub byte_length: u64,
}
