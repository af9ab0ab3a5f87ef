/// Result alias that carries the custom [`BeatPulseError`] type.
pub type Result<T> = std::result::Result<T, BeatPulseError>;

/// Common error type for the core crate.
///
/// The tracking algorithms themselves never fail; an estimate that cannot be
/// produced is `None`. Errors only surface at the edges: configuration,
/// config files and the thread-shared session handle.
#[derive(Debug, thiserror::Error)]
pub enum BeatPulseError {
    /// Free-form message, mostly used by hosts built on top of the core.
    #[error("{0}")]
    Message(String),
    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A shared session lock was poisoned by a panicking holder.
    #[error("{0} has been poisoned")]
    Poisoned(&'static str),
    /// Configuration document could not be parsed.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl BeatPulseError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<&str> for BeatPulseError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for BeatPulseError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
