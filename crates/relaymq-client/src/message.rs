//! Message wire types shared by the pull and push delivery paths.

use serde::{Deserialize, Serialize};

/// Broker-assigned message identifier.
pub type MessageId = String;

/// A message delivered by the broker.
///
/// Immutable once received; identity is `message_id`. The serde renames
/// match the broker's JSON casing on both the pull response and push
/// frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Broker-assigned identifier, used for acknowledgement.
    #[serde(rename = "messageID")]
    pub message_id: MessageId,

    /// Message payload as published.
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_broker_casing() {
        let message: Message =
            serde_json::from_str(r#"{"messageID":"m-1","content":"hello"}"#).unwrap();
        assert_eq!(message.message_id, "m-1");
        assert_eq!(message.content, "hello");
    }

    #[test]
    fn rejects_frames_missing_the_id() {
        assert!(serde_json::from_str::<Message>(r#"{"content":"hello"}"#).is_err());
    }
}
