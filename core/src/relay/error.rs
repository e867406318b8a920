//! Errors surfaced to a client connection outside of a relay session

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    #[error("missing connection identity")]
    MissingIdentity,
}
