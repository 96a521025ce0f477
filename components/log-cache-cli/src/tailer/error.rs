// Local crates
use crate::client::error::ClientError;

/// Terminal failures of one tail invocation.
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("failed to write to output: {0}")]
    SinkWrite(#[source] std::io::Error),
}
