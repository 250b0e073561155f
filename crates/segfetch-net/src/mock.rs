//! Scripted transport for tests.
//!
//! `MockNet` replays a queue of canned outcomes in call order and records
//! every request it saw, so downstream crates can assert on URLs, headers
//! and range bounds without a live server.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use url::Url;

use crate::{
    error::{NetError, NetResult},
    traits::{ByteStream, Net, NetBody},
    types::{Headers, RangeSpec},
};

/// One request as seen by the mock.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub url: Url,
    pub headers: Option<Headers>,
    pub range: Option<RangeSpec>,
}

enum MockOutcome {
    /// Resolve with a body built from these chunk results.
    Body(Vec<NetResult<Bytes>>),
    /// Resolve with a body whose chunk stream is supplied directly,
    /// e.g. a channel the test feeds by hand.
    BodyStream(ByteStream),
    /// Fail the request before any body is produced.
    Error(NetError),
}

#[derive(Clone, Default)]
pub struct MockNet {
    script: Arc<Mutex<VecDeque<MockOutcome>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockNet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response whose body arrives as the given chunks.
    pub fn respond_with_chunks(&self, chunks: Vec<Bytes>) {
        let chunks = chunks.into_iter().map(Ok).collect();
        self.script
            .lock()
            .unwrap()
            .push_back(MockOutcome::Body(chunks));
    }

    /// Queue a successful response whose body yields the given chunk
    /// results verbatim, including mid-stream errors.
    pub fn respond_with_chunk_results(&self, chunks: Vec<NetResult<Bytes>>) {
        self.script
            .lock()
            .unwrap()
            .push_back(MockOutcome::Body(chunks));
    }

    /// Queue a successful response backed by an arbitrary chunk stream.
    pub fn respond_with_stream(&self, stream: ByteStream) {
        self.script
            .lock()
            .unwrap()
            .push_back(MockOutcome::BodyStream(stream));
    }

    /// Queue a request failure.
    pub fn respond_with_error(&self, error: NetError) {
        self.script
            .lock()
            .unwrap()
            .push_back(MockOutcome::Error(error));
    }

    /// Requests recorded so far, in call order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Net for MockNet {
    async fn fetch(
        &self,
        url: Url,
        headers: Option<Headers>,
        range: Option<RangeSpec>,
    ) -> NetResult<NetBody> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.clone(),
            headers,
            range,
        });

        let outcome = self.script.lock().unwrap().pop_front();
        match outcome {
            Some(MockOutcome::Body(chunks)) => {
                Ok(NetBody::new(url, Box::pin(stream::iter(chunks))))
            }
            Some(MockOutcome::BodyStream(stream)) => Ok(NetBody::new(url, stream)),
            Some(MockOutcome::Error(error)) => Err(error),
            None => Err(NetError::http(format!(
                "mock: no scripted response for {url}"
            ))),
        }
    }
}
