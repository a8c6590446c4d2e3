use thiserror::Error;

/// Errors surfaced by the realtime layer.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The hub's control loop is no longer running.
    #[error("hub control loop is not running")]
    HubUnavailable,

    /// A wire event could not be serialized.
    #[error("failed to encode wire event: {0}")]
    Encode(#[from] serde_json::Error),
}
