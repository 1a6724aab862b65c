//! Consumer API: pull-model reads and acknowledgement.
//!
//! Pulling is a long poll: the broker holds the request open up to
//! `timeout` seconds waiting for messages, and an empty topic yields an
//! empty list rather than an error. Acknowledgement is fire-and-forget
//! from the caller's perspective: a successful call resolves to `()` and
//! re-acknowledging an id that was already acknowledged is not treated as
//! a failure mode by the broker.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::Credential;
use crate::error::{ClientError, Result};
use crate::message::{Message, MessageId};
use crate::rest::RequestExecutor;

#[derive(Debug, Deserialize)]
struct PullResponse {
    // The broker omits or nulls the list when the topic is empty.
    #[serde(default)]
    messages: Option<Vec<Message>>,
}

#[derive(Debug, Serialize)]
struct AckRequest<'a> {
    #[serde(rename = "MessageID")]
    message_ids: &'a [MessageId],
}

/// Acknowledge `message_ids` on `topic` through the request executor.
///
/// Shared by [`Consumer`] and the push [`Subscription`], which is why it
/// lives here as a free function rather than a method: acknowledgement is
/// a REST operation regardless of how the messages arrived.
///
/// [`Subscription`]: crate::subscription::Subscription
pub(crate) async fn acknowledge(
    executor: &RequestExecutor,
    project_id: &str,
    topic: &str,
    message_ids: &[MessageId],
    authorization: &str,
) -> Result<()> {
    let path = format!("{project_id}/{topic}/message");
    let body = serde_json::to_vec(&AckRequest { message_ids })
        .map_err(|err| ClientError::Protocol(format!("failed to encode acknowledge body: {err}")))?;

    executor.delete(&path, authorization, Bytes::from(body)).await?;
    debug!(topic, count = message_ids.len(), "messages acknowledged");
    Ok(())
}

/// Pulls and acknowledges messages for one project, authorized by a
/// consumer credential.
///
/// Created via [`RelayClient::consumer`].
///
/// [`RelayClient::consumer`]: crate::client::RelayClient::consumer
pub struct Consumer {
    executor: Arc<RequestExecutor>,
    project_id: String,
    credential: Credential,
}

impl Consumer {
    pub(crate) fn new(
        executor: Arc<RequestExecutor>,
        project_id: String,
        credential: Credential,
    ) -> Self {
        Self {
            executor,
            project_id,
            credential,
        }
    }

    /// Pull up to `count` messages from `topic`, long-polling for at most
    /// `timeout_secs` seconds.
    ///
    /// `count` defaults to 1 when `None`. Returns however many messages
    /// were available within the wait bound, possibly none. No ordering is
    /// guaranteed across independently pulled batches.
    pub async fn pull(
        &self,
        topic: &str,
        count: Option<u32>,
        timeout_secs: Option<u32>,
    ) -> Result<Vec<Message>> {
        let mut path = format!(
            "{}/{}/message?count={}",
            self.project_id,
            topic,
            count.unwrap_or(1)
        );
        if let Some(timeout) = timeout_secs {
            path.push_str(&format!("&timeout={timeout}"));
        }

        let body = self
            .executor
            .get(&path, &self.credential.authorization())
            .await?;
        let response: PullResponse = serde_json::from_slice(&body)
            .map_err(|err| ClientError::Protocol(format!("malformed pull response: {err}")))?;

        let messages = response.messages.unwrap_or_default();
        debug!(topic, count = messages.len(), "messages pulled");
        Ok(messages)
    }

    /// Acknowledge processed messages so the broker stops redelivering
    /// them. Makes no promise about ids not listed.
    pub async fn acknowledge(&self, topic: &str, message_ids: &[MessageId]) -> Result<()> {
        acknowledge(
            &self.executor,
            &self.project_id,
            topic,
            message_ids,
            &self.credential.authorization(),
        )
        .await
    }
}
