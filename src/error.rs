use std::fmt;

/// Result type for fbapomdp operations
pub type Result<T> = std::result::Result<T, FbaError>;

/// Main error type for the fbapomdp library
#[derive(Debug, Clone, PartialEq)]
pub enum FbaError {
    /// Invalid parameter value, detected at construction
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// Domain tag that the factory does not know
    UnsupportedDomain(String),

    /// Belief tag that the factory does not know
    UnsupportedBelief(String),

    /// Operation the chosen domain or prior does not provide
    Unsupported(String),

    /// A table or index that does not fit the requested shape
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Sampling gave up after a bounded number of attempts, or the population
    /// carried no likelihood mass at all
    DegenerateSampling {
        operation: String,
        attempts: usize,
    },

    /// IO errors (file operations)
    IoError(String),

    /// Serialization/deserialization errors
    SerializationError(String),
}

impl fmt::Display for FbaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FbaError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            FbaError::UnsupportedDomain(name) => write!(f, "Unsupported domain '{}'", name),
            FbaError::UnsupportedBelief(name) => write!(f, "Unsupported belief '{}'", name),
            FbaError::Unsupported(msg) => write!(f, "Unsupported operation: {}", msg),
            FbaError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {}, got {}", expected, actual)
            }
            FbaError::DegenerateSampling { operation, attempts } => {
                write!(f, "Degenerate sampling in {} after {} attempts", operation, attempts)
            }
            FbaError::IoError(msg) => write!(f, "IO error: {}", msg),
            FbaError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for FbaError {}

// Conversion from std::io::Error
impl From<std::io::Error> for FbaError {
    fn from(err: std::io::Error) -> Self {
        FbaError::IoError(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for FbaError {
    fn from(err: serde_json::Error) -> Self {
        FbaError::SerializationError(err.to_string())
    }
}

// Helper functions for common error patterns
impl FbaError {
    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        FbaError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        FbaError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn degenerate<S: Into<String>>(operation: S, attempts: usize) -> Self {
        FbaError::DegenerateSampling {
            operation: operation.into(),
            attempts,
        }
    }
}
