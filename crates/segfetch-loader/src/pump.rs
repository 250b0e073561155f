//! The stream pump: a cancellable, chunked-read loop over a response body.
//!
//! Cancellation is checked at the top of every step, before the next read
//! is issued. A chunk whose read was already in flight when cancellation
//! was requested is still delivered; no further reads follow and the
//! stream is dropped (releasing the connection) as soon as the flag is
//! observed.

use futures::StreamExt;
use segfetch_net::ByteStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    callbacks::Callbacks,
    context::{LoadContext, LoadResponse, LoadStats},
};

pub struct StreamPump {
    cancel: CancellationToken,
}

impl StreamPump {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Drive the stream to a terminal outcome.
    ///
    /// Per step: cancelled -> `on_abort` once, stream released, no success;
    /// stream end -> `on_success` with the final byte count and no payload;
    /// chunk -> accumulate and `on_progress`; stream error -> `on_error`.
    pub async fn run(
        &self,
        mut stream: ByteStream,
        ctx: &LoadContext,
        callbacks: &Callbacks,
        mut stats: LoadStats,
    ) {
        let mut loaded: u64 = 0;
        let mut first_chunk = true;

        loop {
            if self.cancel.is_cancelled() {
                debug!(url = %ctx.url, loaded, "pump cancelled");
                drop(stream);
                (callbacks.on_abort)(ctx);
                return;
            }

            match stream.next().await {
                None => {
                    stats.loaded = loaded;
                    stats.total = loaded;
                    stats.mark_loaded();
                    debug!(url = %ctx.url, loaded, "pump stream ended");
                    let response = LoadResponse {
                        url: ctx.url.clone(),
                        payload: None,
                        byte_length: loaded,
                    };
                    (callbacks.on_success)(response, stats, ctx);
                    return;
                }
                Some(Ok(chunk)) => {
                    loaded += chunk.len() as u64;
                    stats.loaded = loaded;
                    if first_chunk {
                        trace!(url = %ctx.url, "pump first chunk");
                        first_chunk = false;
                    }
                    (callbacks.on_progress)(stats, ctx, chunk);
                }
                Some(Err(e)) => {
                    debug!(url = %ctx.url, loaded, error = %e, "pump stream error");
                    (callbacks.on_error)(e, ctx);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use bytes::Bytes;
    use futures::stream;
    use segfetch_net::NetError;
    use url::Url;

    use super::*;
    use crate::fragment::{Fragment, MediaType};
    use crate::{LoadMode, ResponseType};

    fn test_ctx() -> LoadContext {
        let url = Url::parse("http://cdn.example.com/seg1.ts").unwrap();
        LoadContext {
            url: url.clone(),
            response_type: ResponseType::Binary,
            fragment: Fragment::new(MediaType::Main, url),
            range: None,
            mode: LoadMode::Progressive,
        }
    }

    struct Recorder {
        progress: Mutex<Vec<u64>>,
        success: Mutex<Vec<LoadResponse>>,
        aborts: AtomicUsize,
        errors: AtomicUsize,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                progress: Mutex::new(Vec::new()),
                success: Mutex::new(Vec::new()),
                aborts: AtomicUsize::new(0),
                errors: AtomicUsize::new(0),
            })
        }

        fn callbacks(self: &Arc<Self>) -> Callbacks {
            let progress = self.clone();
            let success = self.clone();
            let abort = self.clone();
            let error = self.clone();
            Callbacks {
                on_success: Arc::new(move |response, _, _| {
                    success.success.lock().unwrap().push(response);
                }),
                on_error: Arc::new(move |_, _| {
                    error.errors.fetch_add(1, Ordering::SeqCst);
                }),
                on_progress: Arc::new(move |stats, _, _| {
                    progress.progress.lock().unwrap().push(stats.loaded);
                }),
                on_abort: Arc::new(move |_| {
                    abort.aborts.fetch_add(1, Ordering::SeqCst);
                }),
                ..Callbacks::noop()
            }
        }
    }

    fn chunk_stream(sizes: &[usize]) -> ByteStream {
        let chunks: Vec<_> = sizes
            .iter()
            .map(|&n| Ok(Bytes::from(vec![0u8; n])))
            .collect();
        Box::pin(stream::iter(chunks))
    }

    // Three chunks (300, 300, 400): three ordered progress calls, then one
    // success with byte_length 1000 and no payload.
    #[tokio::test]
    async fn test_pump_delivers_chunks_then_success() {
        let recorder = Recorder::new();
        let pump = StreamPump::new(CancellationToken::new());
        let ctx = test_ctx();

        pump.run(
            chunk_stream(&[300, 300, 400]),
            &ctx,
            &recorder.callbacks(),
            LoadStats::start(),
        )
        .await;

        assert_eq!(*recorder.progress.lock().unwrap(), vec![300, 600, 1000]);
        let success = recorder.success.lock().unwrap();
        assert_eq!(success.len(), 1);
        assert_eq!(success[0].byte_length, 1000);
        assert!(success[0].payload.is_none());
        assert_eq!(recorder.aborts.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pump_empty_stream_success_zero_bytes() {
        let recorder = Recorder::new();
        let pump = StreamPump::new(CancellationToken::new());
        let ctx = test_ctx();

        pump.run(chunk_stream(&[]), &ctx, &recorder.callbacks(), LoadStats::start())
            .await;

        let success = recorder.success.lock().unwrap();
        assert_eq!(success.len(), 1);
        assert_eq!(success[0].byte_length, 0);
        assert!(recorder.progress.lock().unwrap().is_empty());
    }

    // Cancellation observed before the next read: flag raised during the
    // second chunk's delivery, so chunk 2 still arrives (it was already in
    // flight) but chunk 3 is never read and abort fires exactly once.
    #[tokio::test]
    async fn test_pump_cancel_mid_stream_delivers_inflight_chunk() {
        let recorder = Recorder::new();
        let cancel = CancellationToken::new();
        let pump = StreamPump::new(cancel.clone());
        let ctx = test_ctx();

        let flag = cancel.clone();
        let stream: ByteStream = Box::pin(stream::unfold(0u32, move |step| {
            let flag = flag.clone();
            async move {
                match step {
                    0 => Some((Ok(Bytes::from(vec![0u8; 300])), 1)),
                    1 => {
                        // Requested while this read was in flight.
                        flag.cancel();
                        Some((Ok(Bytes::from(vec![0u8; 300])), 2))
                    }
                    _ => Some((Ok(Bytes::from(vec![0u8; 400])), 3)),
                }
            }
        }));

        pump.run(stream, &ctx, &recorder.callbacks(), LoadStats::start())
            .await;

        assert_eq!(*recorder.progress.lock().unwrap(), vec![300, 600]);
        assert_eq!(recorder.aborts.load(Ordering::SeqCst), 1);
        assert!(recorder.success.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pump_cancelled_before_start_reads_nothing() {
        let recorder = Recorder::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pump = StreamPump::new(cancel);
        let ctx = test_ctx();

        pump.run(
            chunk_stream(&[300, 300, 400]),
            &ctx,
            &recorder.callbacks(),
            LoadStats::start(),
        )
        .await;

        assert!(recorder.progress.lock().unwrap().is_empty());
        assert_eq!(recorder.aborts.load(Ordering::SeqCst), 1);
        assert!(recorder.success.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pump_stream_error_after_partial_delivery() {
        let recorder = Recorder::new();
        let pump = StreamPump::new(CancellationToken::new());
        let ctx = test_ctx();

        let chunks: Vec<Result<Bytes, NetError>> = vec![
            Ok(Bytes::from(vec![0u8; 500])),
            Err(NetError::http("connection reset")),
        ];
        let stream: ByteStream = Box::pin(stream::iter(chunks));

        pump.run(stream, &ctx, &recorder.callbacks(), LoadStats::start())
            .await;

        assert_eq!(*recorder.progress.lock().unwrap(), vec![500]);
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 1);
        assert!(recorder.success.lock().unwrap().is_empty());
        assert_eq!(recorder.aborts.load(Ordering::SeqCst), 0);
    }
}
