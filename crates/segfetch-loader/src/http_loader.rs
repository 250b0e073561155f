//! HTTP-backed fragment loader.
//!
//! One `HttpLoader` serves one load attempt. The buffered path (`load`)
//! collects the whole body before a single terminal callback. The
//! progressive path splits into `connect` (issue the request, park the
//! resolved body) and `stream` (pump the parked body through progress
//! callbacks), so the coordinator can start the network transfer eagerly
//! while gating consumption behind its queue.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use segfetch_net::{Headers, Net, NetBody};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    callbacks::Callbacks,
    context::{LoadContext, LoadPayload, LoadResponse, LoadStats, LoaderConfig, ResponseType},
    options::RequestHook,
    pump::StreamPump,
};

/// A pluggable fragment loader.
///
/// Exactly one terminal callback fires per attempt. `load` runs the whole
/// buffered attempt; `connect` plus `stream` together run one progressive
/// attempt, with `stream` callable before `connect` has resolved.
#[async_trait]
pub trait FragmentLoader: Send + Sync {
    /// Buffered load: fetch, collect, deliver once.
    async fn load(&self, context: LoadContext, config: LoaderConfig, callbacks: Callbacks);

    /// Progressive step 1: issue the request and park the response body.
    /// Terminal error and timeout callbacks fire from here when the
    /// connection itself fails.
    async fn connect(&self, context: LoadContext, config: LoaderConfig, callbacks: Callbacks);

    /// Progressive step 2: wait for `connect` to resolve, then pump the
    /// parked body. Returns without any callback when the connection
    /// already failed (the failure callback has fired from `connect`).
    async fn stream(&self);

    /// Request cooperative cancellation. Idempotent.
    fn abort(&self);

    /// Release resources. Equivalent to `abort` for this implementation.
    fn destroy(&self);
}

enum ConnectState {
    Idle,
    Failed,
    Ready(Box<Connected>),
}

struct Connected {
    body: NetBody,
    context: LoadContext,
    callbacks: Callbacks,
    stats: LoadStats,
}

pub struct HttpLoader {
    net: Arc<dyn Net>,
    hook: Option<RequestHook>,
    cancel: CancellationToken,
    connected: Mutex<ConnectState>,
    connect_resolved: Notify,
}

impl HttpLoader {
    pub fn new(net: Arc<dyn Net>, hook: Option<RequestHook>) -> Self {
        Self {
            net,
            hook,
            cancel: CancellationToken::new(),
            connected: Mutex::new(ConnectState::Idle),
            connect_resolved: Notify::new(),
        }
    }

    fn request_headers(&self, context: &LoadContext) -> Option<Headers> {
        let mut headers = Headers::new();
        if let Some(hook) = &self.hook {
            hook(context, &mut headers);
        }
        if headers.is_empty() {
            None
        } else {
            Some(headers)
        }
    }

    fn resolve_connect(&self, state: ConnectState) {
        *self.connected.lock().unwrap() = state;
        self.connect_resolved.notify_waiters();
        self.connect_resolved.notify_one();
    }

    async fn run_buffered(
        &self,
        context: &LoadContext,
        config: &LoaderConfig,
        callbacks: &Callbacks,
    ) {
        let mut stats = LoadStats::start();
        let headers = self.request_headers(context);

        let fetch = self
            .net
            .fetch(context.url.clone(), headers, context.range.clone());
        let body = match tokio::time::timeout(config.timeout, fetch).await {
            Err(_) => {
                debug!(url = %context.url, "buffered load timed out");
                (callbacks.on_timeout)(stats, context);
                return;
            }
            Ok(Err(e)) if e.is_timeout() => {
                (callbacks.on_timeout)(stats, context);
                return;
            }
            Ok(Err(e)) => {
                debug!(url = %context.url, error = %e, "buffered load failed");
                (callbacks.on_error)(e, context);
                return;
            }
            Ok(Ok(body)) => body,
        };

        stats.mark_first_byte();
        let final_url = body.url().clone();

        let payload = match context.response_type {
            ResponseType::Binary => body.bytes().await.map(LoadPayload::Binary),
            ResponseType::Text => body.text().await.map(LoadPayload::Text),
        };
        let payload = match payload {
            Ok(payload) => payload,
            Err(e) if e.is_timeout() => {
                (callbacks.on_timeout)(stats, context);
                return;
            }
            Err(e) => {
                debug!(url = %context.url, error = %e, "body collection failed");
                (callbacks.on_error)(e, context);
                return;
            }
        };

        // A superseded attempt never resolves as success, even when its
        // body finished downloading first.
        if self.cancel.is_cancelled() {
            debug!(url = %context.url, "buffered load aborted");
            (callbacks.on_abort)(context);
            return;
        }

        let byte_length = payload.len();
        stats.loaded = byte_length;
        stats.total = byte_length;
        stats.mark_loaded();

        let response = LoadResponse {
            url: final_url,
            payload: Some(payload),
            byte_length,
        };
        (callbacks.on_success)(response, stats, context);
    }
}

#[async_trait]
impl FragmentLoader for HttpLoader {
    async fn load(&self, context: LoadContext, config: LoaderConfig, callbacks: Callbacks) {
        // Buffered delivery is all-or-nothing, so unlike the progressive
        // pump the whole attempt can race the cancellation token.
        tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(url = %context.url, "buffered load aborted");
                (callbacks.on_abort)(&context);
            }
            _ = self.run_buffered(&context, &config, &callbacks) => {}
        }
    }

    async fn connect(&self, context: LoadContext, config: LoaderConfig, callbacks: Callbacks) {
        let mut stats = LoadStats::start();
        let headers = self.request_headers(&context);

        let fetch = self.net.fetch(context.url.clone(), headers, None);
        let body = match tokio::time::timeout(config.timeout, fetch).await {
            Err(_) => {
                debug!(url = %context.url, "progressive connect timed out");
                self.resolve_connect(ConnectState::Failed);
                (callbacks.on_timeout)(stats, &context);
                return;
            }
            Ok(Err(e)) if e.is_timeout() => {
                self.resolve_connect(ConnectState::Failed);
                (callbacks.on_timeout)(stats, &context);
                return;
            }
            Ok(Err(e)) => {
                debug!(url = %context.url, error = %e, "progressive connect failed");
                self.resolve_connect(ConnectState::Failed);
                (callbacks.on_error)(e, &context);
                return;
            }
            Ok(Ok(body)) => body,
        };

        stats.mark_first_byte();
        debug!(url = %context.url, "progressive connect resolved");
        self.resolve_connect(ConnectState::Ready(Box::new(Connected {
            body,
            context,
            callbacks,
            stats,
        })));
    }

    async fn stream(&self) {
        let connected = loop {
            // Arm the notification before inspecting state so a connect
            // resolving in between is not missed.
            let resolved = self.connect_resolved.notified();

            {
                let mut state = self.connected.lock().unwrap();
                match std::mem::replace(&mut *state, ConnectState::Idle) {
                    ConnectState::Ready(connected) => break connected,
                    // Failure callback already fired from connect.
                    ConnectState::Failed => {
                        *state = ConnectState::Failed;
                        return;
                    }
                    ConnectState::Idle => {}
                }
            }

            resolved.await;
        };

        let Connected {
            body,
            context,
            callbacks,
            stats,
        } = *connected;

        let pump = StreamPump::new(self.cancel.clone());
        pump.run(body.into_stream(), &context, &callbacks, stats).await;
    }

    fn abort(&self) {
        debug!("loader abort requested");
        self.cancel.cancel();
    }

    fn destroy(&self) {
        self.abort();
    }
}
