use reqwest::StatusCode;
use thiserror::Error;

use campus_login::SessionError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Non-success response the recovery machinery did not (or could not)
    /// absorb.
    #[error("unexpected status {0}: {1}")]
    UnexpectedStatus(StatusCode, String),

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize request body: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ClientError {
    /// Status of the failing response, when one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::UnexpectedStatus(status, _) => Some(*status),
            Self::Http(err) => err.status(),
            _ => None,
        }
    }
}
