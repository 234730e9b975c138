use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use crate::errors::TransportError;

pub const BATCH_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// One-shot delivery of a payload to the collector.
///
/// `Ok` means the collector acknowledged the batch; anything else is a
/// failure and the caller keeps the batch for the next attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), TransportError>;
}

/// reqwest-backed transport. Any 2xx status counts as delivered.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Unavailable {
                message: format!("failed to build http client: {e}"),
            })?;
        Ok(Self { http })
    }

    /// Wraps an existing client, e.g. one shared with the host
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), TransportError> {
        let resp = self
            .http
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
