use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use tracing::trace;
use url::Url;

use crate::{
    error::{NetError, NetResult},
    traits::{Net, NetBody},
    types::{Headers, NetOptions, RangeSpec},
};

#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
    options: NetOptions,
}

impl HttpClient {
    /// # Panics
    ///
    /// Panics if the `reqwest::Client` builder fails to build.
    #[must_use]
    pub fn new(options: NetOptions) -> Self {
        let inner = Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .expect("failed to build reqwest client");
        Self { inner, options }
    }

    fn build_request(
        &self,
        url: Url,
        headers: Option<Headers>,
        range: Option<RangeSpec>,
    ) -> reqwest::RequestBuilder {
        let mut req = self.inner.get(url);

        if let Some(headers) = headers {
            for (k, v) in headers.iter() {
                req = req.header(k, v);
            }
        }

        if let Some(range) = range {
            req = req.header("Range", range.to_header_value());
        }

        req
    }
}

#[async_trait]
impl Net for HttpClient {
    async fn fetch(
        &self,
        url: Url,
        headers: Option<Headers>,
        range: Option<RangeSpec>,
    ) -> NetResult<NetBody> {
        let req = self.build_request(url.clone(), headers, range);

        // The timeout bounds the request/response-headers phase only;
        // body streaming can take arbitrary time.
        let resp = tokio::time::timeout(self.options.request_timeout, req.send())
            .await
            .map_err(|_| NetError::timeout())?
            .map_err(NetError::from)?;

        let status = resp.status();
        if !(status.is_success() || status == reqwest::StatusCode::PARTIAL_CONTENT) {
            return Err(NetError::http_status(status.as_u16(), url.to_string()));
        }

        trace!(url = %url, status = status.as_u16(), "headers resolved");

        let final_url = resp.url().clone();
        let stream = resp.bytes_stream().map_err(NetError::from);
        Ok(NetBody::new(final_url, Box::pin(stream)))
    }
}
