// Local crates
use crate::parser::parser::DecodeError;

// External crates
use std::time::Duration;

/// Failures of a single request against Log Cache or the inventory API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid endpoint {addr:?}: {reason}")]
    InvalidEndpoint { addr: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Setup(String),
    #[error("unable to reach {url}: {reason}")]
    Unreachable { url: String, reason: String },
    #[error("request to {url} failed: context deadline exceeded after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("unexpected status code {status} from {url}: {body}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },
    #[error("malformed response from {url}: {source}")]
    MalformedResponse {
        url: String,
        #[source]
        source: DecodeError,
    },
}

impl ClientError {
    /// Worth retrying on the next poll: the remote may recover.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Unreachable { .. }
                | ClientError::Timeout { .. }
                | ClientError::UnexpectedStatus { .. }
        )
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, ClientError::MalformedResponse { .. })
    }
}

/// Render an error with its whole source chain, e.g.
/// `error sending request: client error (Connect): dns error: ...`.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}
