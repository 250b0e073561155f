//! Fragment load coordination.
//!
//! Buffered loads are keyed by media type: issuing a load for a type that
//! already has one in flight aborts and replaces it. Progressive loads go
//! through a single-slot queue that starts the network transfer eagerly
//! but gates byte consumption until the slot is free.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use segfetch_net::{HttpClient, Net, RangeSpec};
use tracing::{debug, warn};

use crate::{
    callbacks::Callbacks,
    context::{LoadContext, LoadMode, ResponseType},
    error::{LoadError, LoadResult},
    events::{ErrorDetail, EventEmitter, LoadEvent},
    fragment::{Fragment, MediaType},
    http_loader::{FragmentLoader, HttpLoader},
    options::LoaderOptions,
};

struct SlotEntry {
    loader: Arc<dyn FragmentLoader>,
    fragment: Fragment,
}

struct QueueEntry {
    loader: Arc<dyn FragmentLoader>,
    fragment: Fragment,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<MediaType, SlotEntry>,
    queue: VecDeque<QueueEntry>,
    destroyed: bool,
}

pub struct FragmentLoadCoordinator {
    inner: Arc<Mutex<Inner>>,
    events: EventEmitter,
    options: LoaderOptions,
    net: Arc<dyn Net>,
}

impl FragmentLoadCoordinator {
    pub fn new(options: LoaderOptions) -> Self {
        let net: Arc<dyn Net> = Arc::new(HttpClient::new(options.net.clone()));
        Self::with_net(options, net)
    }

    /// Coordinator over a caller-supplied transport.
    pub fn with_net(options: LoaderOptions, net: Arc<dyn Net>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            events: EventEmitter::new(options.events_channel_capacity),
            options,
            net,
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<LoadEvent> {
        self.events.subscribe()
    }

    /// Start a buffered load for the fragment. An in-flight load of the
    /// same media type is aborted and replaced; the superseded attempt
    /// resolves as an abort, never a success.
    pub fn load(&self, mut fragment: Fragment) -> LoadResult<()> {
        let loader = self.make_loader();
        fragment.loaded = 0;

        {
            let mut inner = self.inner.lock().unwrap();
            if inner.destroyed {
                return Err(LoadError::Destroyed);
            }
            let entry = SlotEntry {
                loader: loader.clone(),
                fragment: fragment.clone(),
            };
            if let Some(prev) = inner.slots.insert(fragment.media_type, entry) {
                warn!(media_type = %fragment.media_type, "aborting superseded fragment loader");
                prev.loader.abort();
            }
        }

        let context = LoadContext {
            url: fragment.url.clone(),
            response_type: ResponseType::Binary,
            range: fragment
                .range
                .map(|r| RangeSpec::new(r.start, r.end)),
            fragment,
            mode: LoadMode::Buffered,
        };
        let config = self.options.loader_config();
        let callbacks = self.make_callbacks(loader.clone(), LoadMode::Buffered);
        tokio::spawn(async move { loader.load(context, config, callbacks).await });
        Ok(())
    }

    /// Start a progressive load: connect immediately, stream once the
    /// queue slot is free. Falls back to buffered loading when low-latency
    /// mode is off; dropped when the queue is already occupied.
    pub fn load_progressive(&self, mut fragment: Fragment) -> LoadResult<()> {
        if !self.options.low_latency {
            return self.load(fragment);
        }

        let loader = self.make_loader();
        fragment.loaded = 0;

        {
            let mut inner = self.inner.lock().unwrap();
            if inner.destroyed {
                return Err(LoadError::Destroyed);
            }
            if !inner.queue.is_empty() {
                debug!(url = %fragment.url, "progressive queue occupied, dropping request");
                return Ok(());
            }
            inner.queue.push_back(QueueEntry {
                loader: loader.clone(),
                fragment: fragment.clone(),
            });
        }

        let context = LoadContext {
            url: fragment.url.clone(),
            response_type: ResponseType::Binary,
            range: None,
            fragment,
            mode: LoadMode::Progressive,
        };
        let config = self.options.loader_config();
        let callbacks = self.make_callbacks(loader.clone(), LoadMode::Progressive);

        // The queue entry exists before the connect task runs, so even an
        // instant failure finds its entry to remove.
        tokio::spawn(async move { loader.connect(context, config, callbacks).await });
        advance_queue(&self.inner);
        Ok(())
    }

    /// Request cancellation of every progressive queue entry. Fire and
    /// forget: each entry removes itself through its own abort callback
    /// once the pump observes the flag. Buffered type-slot loads are not
    /// touched; their teardown belongs to [`destroy`](Self::destroy).
    pub fn abort_all(&self) {
        let queued: Vec<_> = {
            let inner = self.inner.lock().unwrap();
            inner.queue.iter().map(|e| e.loader.clone()).collect()
        };
        debug!(progressive = queued.len(), "aborting progressive fragment loads");
        for loader in queued {
            loader.abort();
        }
    }

    /// Tear down the coordinator. Subsequent load calls fail with
    /// [`LoadError::Destroyed`].
    pub fn destroy(&self) {
        let loaders = {
            let mut inner = self.inner.lock().unwrap();
            inner.destroyed = true;
            let mut loaders: Vec<_> = inner.slots.drain().map(|(_, e)| e.loader).collect();
            loaders.extend(inner.queue.drain(..).map(|e| e.loader));
            loaders
        };
        for loader in loaders {
            loader.destroy();
        }
    }

    fn make_loader(&self) -> Arc<dyn FragmentLoader> {
        match &self.options.loader_factory {
            Some(factory) => factory(),
            None => Arc::new(HttpLoader::new(
                self.net.clone(),
                self.options.request_hook.clone(),
            )),
        }
    }

    fn make_callbacks(&self, loader: Arc<dyn FragmentLoader>, mode: LoadMode) -> Callbacks {
        let on_success = {
            let inner = self.inner.clone();
            let events = self.events.clone();
            let loader = loader.clone();
            Arc::new(
                move |response: crate::LoadResponse, stats: crate::LoadStats, ctx: &LoadContext| {
                    remove_entry(&inner, &loader, mode, ctx.fragment.media_type);
                    if mode == LoadMode::Progressive {
                        advance_queue(&inner);
                    }
                    let mut fragment = ctx.fragment.clone();
                    fragment.loaded = response.byte_length;
                    events.emit_fragment_loaded(fragment, response, stats);
                },
            )
        };

        let on_error = {
            let inner = self.inner.clone();
            let events = self.events.clone();
            let loader = loader.clone();
            Arc::new(move |error: segfetch_net::NetError, ctx: &LoadContext| {
                remove_entry(&inner, &loader, mode, ctx.fragment.media_type);
                loader.abort();
                if mode == LoadMode::Progressive {
                    advance_queue(&inner);
                }
                events.emit_network_error(
                    ErrorDetail::LoadError,
                    ctx.fragment.clone(),
                    error.to_string(),
                );
            })
        };

        let on_timeout = {
            let inner = self.inner.clone();
            let events = self.events.clone();
            let loader = loader.clone();
            Arc::new(move |_stats: crate::LoadStats, ctx: &LoadContext| {
                remove_entry(&inner, &loader, mode, ctx.fragment.media_type);
                loader.abort();
                if mode == LoadMode::Progressive {
                    advance_queue(&inner);
                }
                events.emit_network_error(
                    ErrorDetail::LoadTimeout,
                    ctx.fragment.clone(),
                    "fragment load timed out".to_string(),
                );
            })
        };

        let on_progress = {
            let inner = self.inner.clone();
            let events = self.events.clone();
            let loader = loader.clone();
            Arc::new(
                move |stats: crate::LoadStats, ctx: &LoadContext, chunk: bytes::Bytes| {
                    update_loaded(&inner, &loader, mode, ctx.fragment.media_type, stats.loaded);
                    if ctx.response_type != ResponseType::Binary {
                        return;
                    }
                    let mut fragment = ctx.fragment.clone();
                    fragment.loaded = stats.loaded;
                    events.emit_load_progress(fragment, stats, chunk);
                },
            )
        };

        let on_abort = {
            let inner = self.inner.clone();
            let events = self.events.clone();
            Arc::new(move |ctx: &LoadContext| match mode {
                LoadMode::Progressive => {
                    remove_entry(&inner, &loader, mode, ctx.fragment.media_type);
                    advance_queue(&inner);
                    events.emit_emergency_aborted(ctx.fragment.clone());
                }
                // Superseded or destroyed buffered load; its slot entry
                // was already replaced or drained.
                LoadMode::Buffered => {
                    debug!(url = %ctx.url, "buffered fragment load aborted");
                }
            })
        };

        Callbacks {
            on_success,
            on_error,
            on_timeout,
            on_progress,
            on_abort,
        }
    }
}

/// Remove the entry owned by this loader, if it still owns one. A
/// superseded loader's terminal callback must not evict its replacement.
fn remove_entry(
    inner: &Arc<Mutex<Inner>>,
    loader: &Arc<dyn FragmentLoader>,
    mode: LoadMode,
    media_type: MediaType,
) {
    let mut inner = inner.lock().unwrap();
    match mode {
        LoadMode::Buffered => {
            let owned = inner
                .slots
                .get(&media_type)
                .is_some_and(|e| Arc::ptr_eq(&e.loader, loader));
            if owned {
                inner.slots.remove(&media_type);
            }
        }
        LoadMode::Progressive => {
            let owned = inner
                .queue
                .front()
                .is_some_and(|e| Arc::ptr_eq(&e.loader, loader));
            if owned {
                inner.queue.pop_front();
            }
        }
    }
}

fn update_loaded(
    inner: &Arc<Mutex<Inner>>,
    loader: &Arc<dyn FragmentLoader>,
    mode: LoadMode,
    media_type: MediaType,
    loaded: u64,
) {
    let mut inner = inner.lock().unwrap();
    let fragment = match mode {
        LoadMode::Buffered => inner
            .slots
            .get_mut(&media_type)
            .filter(|e| Arc::ptr_eq(&e.loader, loader))
            .map(|e| &mut e.fragment),
        LoadMode::Progressive => inner
            .queue
            .front_mut()
            .filter(|e| Arc::ptr_eq(&e.loader, loader))
            .map(|e| &mut e.fragment),
    };
    if let Some(fragment) = fragment {
        fragment.loaded = loaded;
    }
}

/// Start streaming the queue head, if any. Each entry is streamed exactly
/// once, when it reaches the head.
fn advance_queue(inner: &Arc<Mutex<Inner>>) {
    let head = inner.lock().unwrap().queue.front().map(|e| e.loader.clone());
    if let Some(loader) = head {
        tokio::spawn(async move { loader.stream().await });
    }
}
