use crate::catalog::GestureId;

/// Result alias that carries the custom [`TrainerError`] type.
pub type Result<T> = std::result::Result<T, TrainerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum TrainerError {
    /// Free-form failure that does not warrant its own variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON in an envelope, a config file or a serialized catalog.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("gesture {0} does not exist")]
    GestureNotFound(GestureId),
    #[error("gesture {gesture} has no sample at index {index}")]
    SampleNotFound { gesture: GestureId, index: usize },
    #[error("no gesture is currently selected")]
    NoCurrentGesture,
    /// The serialized catalog parsed but violates a catalog invariant.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),
    /// The host transport refused an outbound envelope.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl TrainerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for TrainerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for TrainerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
