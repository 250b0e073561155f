use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use url::Url;

use crate::{
    error::{NetError, NetResult},
    types::{Headers, RangeSpec},
};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, NetError>> + Send>>;

/// A response body, handed over once status and headers have resolved.
///
/// The caller decides whether to collect it in one go (`bytes`/`text`) or to
/// consume it chunk by chunk (`into_stream`).
pub struct NetBody {
    url: Url,
    stream: ByteStream,
}

impl NetBody {
    pub fn new(url: Url, stream: ByteStream) -> Self {
        Self { url, stream }
    }

    /// Final URL of the response (after redirects).
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Hand over the raw chunk stream.
    pub fn into_stream(self) -> ByteStream {
        self.stream
    }

    /// Collect the whole body into a single buffer.
    pub async fn bytes(mut self) -> NetResult<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Collect the whole body and decode it as UTF-8 text.
    pub async fn text(self) -> NetResult<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| NetError::http(e.to_string()))
    }
}

impl std::fmt::Debug for NetBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetBody").field("url", &self.url).finish()
    }
}

#[async_trait]
pub trait Net: Send + Sync {
    /// Issue a GET request, optionally with a byte range, and resolve once
    /// status and headers are in. The body has not been consumed yet.
    async fn fetch(
        &self,
        url: Url,
        headers: Option<Headers>,
        range: Option<RangeSpec>,
    ) -> NetResult<NetBody>;
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    fn test_url() -> Url {
        Url::parse("http://example.com/seg1.ts").unwrap()
    }

    #[tokio::test]
    async fn test_body_bytes_collects_chunks() {
        let chunks = vec![
            Ok(Bytes::from_static(b"Hello")),
            Ok(Bytes::from_static(b", ")),
            Ok(Bytes::from_static(b"World!")),
        ];
        let body = NetBody::new(test_url(), Box::pin(stream::iter(chunks)));

        let bytes = body.bytes().await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"Hello, World!"));
    }

    #[tokio::test]
    async fn test_body_bytes_propagates_stream_error() {
        let chunks = vec![Ok(Bytes::from_static(b"partial")), Err(NetError::Timeout)];
        let body = NetBody::new(test_url(), Box::pin(stream::iter(chunks)));

        let result = body.bytes().await;
        assert!(matches!(result, Err(NetError::Timeout)));
    }

    #[tokio::test]
    async fn test_body_text() {
        let chunks = vec![Ok(Bytes::from_static(b"#EXTM3U\n"))];
        let body = NetBody::new(test_url(), Box::pin(stream::iter(chunks)));

        let text = body.text().await.unwrap();
        assert_eq!(text, "#EXTM3U\n");
    }

    #[tokio::test]
    async fn test_body_text_rejects_invalid_utf8() {
        let chunks = vec![Ok(Bytes::from_static(&[0xFF, 0xFE, 0xFD]))];
        let body = NetBody::new(test_url(), Box::pin(stream::iter(chunks)));

        assert!(body.text().await.is_err());
    }

    #[tokio::test]
    async fn test_body_into_stream_preserves_chunking() {
        let chunks = vec![
            Ok(Bytes::from(vec![0u8; 300])),
            Ok(Bytes::from(vec![0u8; 700])),
        ];
        let body = NetBody::new(test_url(), Box::pin(stream::iter(chunks)));

        let mut stream = body.into_stream();
        let mut sizes = Vec::new();
        while let Some(chunk) = stream.next().await {
            sizes.push(chunk.unwrap().len());
        }
        assert_eq!(sizes, vec![300, 700]);
    }
}
