use std::{sync::Arc, time::Duration};

use segfetch_net::{Headers, NetOptions, RetryPolicy};

use crate::{
    context::{LoadContext, LoaderConfig},
    http_loader::FragmentLoader,
};

/// Builds a fresh loader per load attempt. Lets callers substitute their
/// own `FragmentLoader` implementation.
pub type LoaderFactory = Arc<dyn Fn() -> Arc<dyn FragmentLoader> + Send + Sync>;

/// Callback invoked before each request to adjust outgoing headers.
pub type RequestHook = Arc<dyn Fn(&LoadContext, &mut Headers) + Send + Sync>;

/// Configuration for the fragment load coordinator.
#[derive(Clone)]
pub struct LoaderOptions {
    /// Network transport configuration.
    pub net: NetOptions,
    /// Bounds the request/response-headers phase of a fragment load.
    pub fragment_timeout: Duration,
    /// Upper bound handed to the declarative retry policy.
    pub max_retry_timeout: Duration,
    /// Custom loader factory; defaults to the built-in HTTP loader.
    pub loader_factory: Option<LoaderFactory>,
    /// Enables the progressive path. When false, `load_progressive`
    /// requests fall back to buffered loading.
    pub low_latency: bool,
    /// Hook applied to outgoing request headers.
    pub request_hook: Option<RequestHook>,
    /// Capacity of the events broadcast channel.
    pub events_channel_capacity: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            net: NetOptions::default(),
            fragment_timeout: Duration::from_secs(20),
            max_retry_timeout: Duration::from_secs(64),
            loader_factory: None,
            low_latency: false,
            request_hook: None,
            events_channel_capacity: 128,
        }
    }
}

impl LoaderOptions {
    pub fn with_low_latency(mut self, enabled: bool) -> Self {
        self.low_latency = enabled;
        self
    }

    pub fn with_fragment_timeout(mut self, timeout: Duration) -> Self {
        self.fragment_timeout = timeout;
        self
    }

    pub fn with_loader_factory(mut self, factory: LoaderFactory) -> Self {
        self.loader_factory = Some(factory);
        self
    }

    pub fn with_request_hook(mut self, hook: RequestHook) -> Self {
        self.request_hook = Some(hook);
        self
    }

    /// Per-attempt configuration handed to loaders. Retries stay disabled;
    /// retry scheduling belongs to the caller, not the loader.
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            timeout: self.fragment_timeout,
            retry: RetryPolicy::new(0, Duration::ZERO, self.max_retry_timeout),
        }
    }
}

impl std::fmt::Debug for LoaderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("net", &self.net)
            .field("fragment_timeout", &self.fragment_timeout)
            .field("max_retry_timeout", &self.max_retry_timeout)
            .field("low_latency", &self.low_latency)
            .field("events_channel_capacity", &self.events_channel_capacity)
            .finish_non_exhaustive()
    }
}
