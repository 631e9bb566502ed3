use thiserror::Error;

/// Road tracker error types
#[derive(Error, Debug)]
pub enum RoadTrackerError {
    /// Unparseable raw record; the stream skips it and continues
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The whole batch was rolled back
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Record {0} not found")]
    NotFound(i64),

    #[error("Subscriber unreachable: {0}")]
    SubscriberUnreachable(String),

    #[error("Invalid connection state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for RoadTrackerError {
    fn from(err: rusqlite::Error) -> Self {
        RoadTrackerError::PersistenceFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RoadTrackerError>;
