//! Error types for RelayMQ client operations.
//!
//! Every failure a caller can observe is a [`ClientError`]. The variants map
//! onto how the client reacts to them:
//!
//! - **Retried** by the request executor: `Transport`, and `Api` with a
//!   5xx-class status (500, 502, 503, 504).
//! - **Surfaced immediately**: `Api` with any other status (bad request,
//!   auth failure, not found).
//! - **Fatal to a subscription**: `Protocol` (malformed push frame) and
//!   `ConnectionExhausted` (reconnect budget spent).

use thiserror::Error;

/// Convenience type alias for `Result<T, ClientError>`.
///
/// All public APIs in this crate return this type.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error type for all RelayMQ client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response: connection refused, timeout,
    /// DNS failure, or a socket-level I/O error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The broker answered with a non-OK status. Carries the status code
    /// and the response body verbatim.
    #[error("broker returned status {status}: {body}")]
    Api {
        /// HTTP status code of the response.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// A payload received from the broker could not be decoded. On a push
    /// connection this is treated as a protocol violation and closes the
    /// subscription.
    #[error("malformed payload from broker: {0}")]
    Protocol(String),

    /// A subscription gave up reconnecting after exhausting its attempt
    /// budget. The subscription is closed when this is emitted.
    #[error("failed to connect to broker after {attempts} attempts")]
    ConnectionExhausted {
        /// Reconnect attempts made before giving up.
        attempts: u32,
    },

    /// The client was misconfigured (missing required builder field,
    /// unparseable host URL).
    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// The HTTP status code, for `Api` errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the request executor may retry after this error.
    ///
    /// Transport failures are always worth retrying. Broker responses are
    /// retried only for the transient server-error statuses; anything else
    /// (auth failures, bad requests) will not succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::Api { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        assert!(ClientError::Transport("connection refused".into()).is_retryable());
    }

    #[test]
    fn server_error_statuses_are_retryable() {
        for status in [500, 502, 503, 504] {
            let err = ClientError::Api {
                status,
                body: String::new(),
            };
            assert!(err.is_retryable(), "status {} should be retryable", status);
        }
    }

    #[test]
    fn client_error_statuses_are_not_retryable() {
        for status in [400, 401, 403, 404, 409, 501] {
            let err = ClientError::Api {
                status,
                body: String::new(),
            };
            assert!(!err.is_retryable(), "status {} must not be retried", status);
        }
    }

    #[test]
    fn fatal_kinds_are_not_retryable() {
        assert!(!ClientError::Protocol("bad frame".into()).is_retryable());
        assert!(!ClientError::ConnectionExhausted { attempts: 5 }.is_retryable());
        assert!(!ClientError::Config("host required".into()).is_retryable());
    }

    #[test]
    fn status_code_only_on_api_errors() {
        let api = ClientError::Api {
            status: 404,
            body: "no such topic".into(),
        };
        assert_eq!(api.status_code(), Some(404));
        assert_eq!(ClientError::Transport("timeout".into()).status_code(), None);
    }

    #[test]
    fn api_error_display_includes_status_and_body() {
        let err = ClientError::Api {
            status: 403,
            body: "forbidden".into(),
        };
        assert_eq!(err.to_string(), "broker returned status 403: forbidden");
    }
}
