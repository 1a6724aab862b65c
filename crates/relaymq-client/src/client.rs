//! Client facade: connection settings, credentials, and construction of
//! producers, consumers and subscriptions.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::consumer::Consumer;
use crate::error::{ClientError, Result};
use crate::producer::Producer;
use crate::rest::RequestExecutor;
use crate::retry::RetryPolicy;
use crate::subscription::{Subscription, SubscriptionConfig};

/// A principal id paired with its secret token.
///
/// Sent as the opaque authorization value `"id:token"`. Each Producer,
/// Consumer or Subscription owns its own copy.
#[derive(Debug, Clone)]
pub struct Credential {
    id: String,
    token: String,
}

impl Credential {
    /// Create a credential from a principal id and its token.
    pub fn new(id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: token.into(),
        }
    }

    /// The wire form sent in the `Authorization` header.
    pub(crate) fn authorization(&self) -> String {
        format!("{}:{}", self.id, self.token)
    }
}

/// Builder for [`RelayClient`].
///
/// `host` and `project_id` are required; everything else has broker
/// defaults. Timeouts and retry knobs apply to every producer, consumer
/// and subscription the client hands out.
pub struct ClientBuilder {
    host: Option<String>,
    project_id: Option<String>,
    request_timeout: Duration,
    retry_policy: RetryPolicy,
    reconnect_policy: RetryPolicy,
}

impl ClientBuilder {
    fn new() -> Self {
        Self {
            host: None,
            project_id: None,
            request_timeout: Duration::from_secs(60),
            retry_policy: RetryPolicy::default(),
            // The push side retries less patiently: 200 ms base, 10 s cap,
            // five attempts before the subscription gives up.
            reconnect_policy: RetryPolicy::new(
                Duration::from_millis(200),
                Duration::from_secs(10),
                5,
            ),
        }
    }

    /// Base URL of the broker, e.g. `http://mq.example.com/v1/`.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Project all topics are scoped under.
    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Per-request timeout for REST exchanges (default 60 s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Retry schedule for REST exchanges.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Reconnect schedule for push subscriptions.
    pub fn reconnect_policy(mut self, policy: RetryPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when `host` or `project_id` is
    /// missing, or when `host` is not a valid http(s) URL.
    pub fn build(self) -> Result<RelayClient> {
        let host = self
            .host
            .ok_or_else(|| ClientError::Config("host required".into()))?;
        let project_id = self
            .project_id
            .ok_or_else(|| ClientError::Config("project_id required".into()))?;

        // Validate eagerly so a typo fails at construction, not first use.
        let parsed = Url::parse(&host)
            .map_err(|err| ClientError::Config(format!("invalid host url: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "host scheme must be http or https, got {}",
                parsed.scheme()
            )));
        }

        let executor = Arc::new(RequestExecutor::new(
            host.clone(),
            self.request_timeout,
            self.retry_policy,
        )?);

        Ok(RelayClient {
            executor,
            host,
            project_id,
            reconnect_policy: self.reconnect_policy,
        })
    }
}

/// Entry point to the broker: builds producers, consumers and push
/// subscriptions that share one retrying request executor.
#[derive(Debug)]
pub struct RelayClient {
    executor: Arc<RequestExecutor>,
    host: String,
    project_id: String,
    reconnect_policy: RetryPolicy,
}

impl RelayClient {
    /// Start configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// A producer authorized to publish to this project's topics.
    pub fn producer(&self, producer_id: impl Into<String>, token: impl Into<String>) -> Producer {
        Producer::new(
            self.executor.clone(),
            self.project_id.clone(),
            Credential::new(producer_id, token),
        )
    }

    /// A consumer authorized to pull and acknowledge on this project's
    /// topics.
    pub fn consumer(&self, consumer_id: impl Into<String>, token: impl Into<String>) -> Consumer {
        Consumer::new(
            self.executor.clone(),
            self.project_id.clone(),
            Credential::new(consumer_id, token),
        )
    }

    /// Open a push subscription to `topic`.
    ///
    /// `permits` is the prefetch credit: how many unacknowledged messages
    /// the broker may have in flight before it pauses delivery. Zero is
    /// promoted to 1. Connecting starts immediately; consume with
    /// [`Subscription::recv`].
    pub fn subscribe(
        &self,
        consumer_id: impl Into<String>,
        token: impl Into<String>,
        topic: impl Into<String>,
        permits: u32,
    ) -> Result<Subscription> {
        let topic = topic.into();
        let permits = permits.max(1);
        let url = self.subscription_url(&topic, permits)?;

        let config = SubscriptionConfig {
            url,
            topic,
            credential: Credential::new(consumer_id, token),
            project_id: self.project_id.clone(),
            permits,
            reconnect: self.reconnect_policy.clone(),
        };
        Ok(Subscription::spawn(config, self.executor.clone()))
    }

    /// Derive the streaming endpoint from the HTTP host:
    /// `ws(s)://host/{project}/{topic}/message/subscription?permits=N`.
    fn subscription_url(&self, topic: &str, permits: u32) -> Result<String> {
        let mut url = Url::parse(&self.host)
            .map_err(|err| ClientError::Config(format!("invalid host url: {err}")))?;

        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::Config("host url does not allow a ws scheme".into()))?;

        let path = format!(
            "{}/{}/{}/message/subscription",
            url.path().trim_end_matches('/'),
            self.project_id,
            topic
        );
        url.set_path(&path);
        url.set_query(Some(&format!("permits={permits}")));
        Ok(url.into())
    }
}
