use thiserror::Error;

/// Main error type for Ember+ operations
#[derive(Error, Debug)]
pub enum EmberError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structural BER decode error. Fatal to the decode in progress: the
    /// reader that raised it must be reset before it is used again.
    ///
    /// `trace` is the chain of open container tag:type pairs at the point
    /// of failure, `"root"` when no container was open.
    #[error("BER decode error {code}: {message} (at {trace})")]
    Decode {
        code: u32,
        message: String,
        trace: String,
    },

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl EmberError {
    /// Numeric code of a structural decode error, `None` for other kinds.
    pub fn decode_code(&self) -> Option<u32> {
        match self {
            EmberError::Decode { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type alias for Ember+ operations
pub type EmberResult<T> = Result<T, EmberError>;
