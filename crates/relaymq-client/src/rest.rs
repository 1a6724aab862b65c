//! The retrying request executor.
//!
//! [`RequestExecutor`] performs every REST exchange in this crate: publish,
//! pull and acknowledge all go through it, as does acknowledgement issued
//! from a push subscription. Each verb builds a fresh request per attempt
//! and hands the exchange to [`retry_with_backoff`], so transport failures
//! and transient broker errors are retried transparently while everything
//! else surfaces unchanged.
//!
//! The executor holds no state across calls beyond the connection pool
//! inside `reqwest::Client`.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, StatusCode};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Executes request/response exchanges against a fixed base endpoint,
/// retrying transient failures per its [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    http: Client,
    base_url: String,
    policy: RetryPolicy,
}

impl RequestExecutor {
    /// Build an executor for `base_url` with the given request timeout and
    /// retry policy.
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| ClientError::Config(format!("failed to build http client: {err}")))?;

        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            http,
            base_url,
            policy,
        })
    }

    /// GET `path`, returning the raw response body.
    pub async fn get(&self, path: &str, authorization: &str) -> Result<Bytes> {
        self.execute(Method::GET, path, authorization, None).await
    }

    /// POST `body` to `path`, returning the raw response body.
    pub async fn post(&self, path: &str, authorization: &str, body: Bytes) -> Result<Bytes> {
        self.execute(Method::POST, path, authorization, Some(body))
            .await
    }

    /// DELETE `path` with `body`, returning the raw response body.
    pub async fn delete(&self, path: &str, authorization: &str, body: Bytes) -> Result<Bytes> {
        self.execute(Method::DELETE, path, authorization, Some(body))
            .await
    }

    /// One logical call: build a fresh request per attempt, classify the
    /// outcome, and let the retry layer decide whether to go again.
    ///
    /// HTTP 200 is the broker's single OK status; its body is returned
    /// verbatim. Any other status becomes [`ClientError::Api`], retried
    /// only for the transient server-error class.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        authorization: &str,
        body: Option<Bytes>,
    ) -> Result<Bytes> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "issuing request");

        retry_with_backoff(&self.policy, || {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .header(AUTHORIZATION, authorization);
            if let Some(body) = &body {
                request = request.body(body.clone());
            }
            async move {
                let response = request.send().await?;
                let status = response.status();
                if status == StatusCode::OK {
                    Ok(response.bytes().await?)
                } else {
                    let body = response.text().await.unwrap_or_default();
                    Err(ClientError::Api {
                        status: status.as_u16(),
                        body,
                    })
                }
            }
        })
        .await
    }
}
