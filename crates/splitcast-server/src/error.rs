use crate::transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// `answer` arrived before any `subscribe`
    #[error("No subscriber connection to apply the answer to")]
    NoSubscriber,

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Control channel closed")]
    ChannelClosed,
}

impl SessionError {
    /// Whether the client can still be told about this error
    pub fn is_reportable(&self) -> bool {
        !matches!(self, SessionError::ChannelClosed)
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
