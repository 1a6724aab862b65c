//! Producer API for publishing messages to a topic.

use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use crate::client::Credential;
use crate::error::{ClientError, Result};
use crate::message::MessageId;
use crate::rest::RequestExecutor;

/// Successful publish response.
#[derive(Debug, Deserialize)]
struct PublishResponse {
    #[serde(rename = "MessageID")]
    message_id: MessageId,
}

/// Publishes messages to topics under one project, authorized by a
/// producer credential.
///
/// Created via [`RelayClient::producer`]. Cheap to clone-per-topic is not
/// needed: one producer serves any topic in the project.
///
/// [`RelayClient::producer`]: crate::client::RelayClient::producer
pub struct Producer {
    executor: Arc<RequestExecutor>,
    project_id: String,
    credential: Credential,
}

impl Producer {
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

    /// Publish `content` to `topic`, returning the broker-assigned id.
    ///
    /// The payload is sent verbatim; both text and raw bytes work. Executor
    /// failures (after its retry budget) surface unchanged.
    pub async fn publish(&self, topic: &str, content: impl Into<Bytes>) -> Result<MessageId> {
        let path = format!("{}/{}/message", self.project_id, topic);
        let body = self
            .executor
            .post(&path, &self.credential.authorization(), content.into())
            .await?;

        let response: PublishResponse = serde_json::from_slice(&body).map_err(|err| {
            ClientError::Protocol(format!("malformed publish response: {err}"))
        })?;

        debug!(topic, message_id = %response.message_id, "message published");
        Ok(response.message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_response_uses_broker_casing() {
        let parsed: PublishResponse = serde_json::from_str(r#"{"MessageID":"m-42"}"#).unwrap();
        assert_eq!(parsed.message_id, "m-42");
    }
}
