//! Errors generated by the compiler.
use thiserror::Error as ThisError;

/// Convenience wrapper to represent success or meaningful compiler error.
pub type GearResult<T> = std::result::Result<T, Error>;

/// Errors generated by the compiler
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The control program cannot be scheduled.
    #[error("Malformed Control: {0}")]
    MalformedControl(String),
    /// A structural invariant of an intermediate tree does not hold.
    #[error("Malformed Structure: {0}")]
    MalformedStructure(String),
    /// A type could not be resolved to a concrete width.
    #[error("Type Error: {0}")]
    Type(String),
    /// Miscellaneous error message
    #[error("{0}")]
    Misc(String),
}

impl Error {
    pub fn malformed_control<S: ToString>(msg: S) -> Self {
        Error::MalformedControl(msg.to_string())
    }

    pub fn malformed_structure<S: ToString>(msg: S) -> Self {
        Error::MalformedStructure(msg.to_string())
    }

    pub fn type_error<S: ToString>(msg: S) -> Self {
        Error::Type(msg.to_string())
    }

    pub fn misc<S: ToString>(msg: S) -> Self {
        Error::Misc(msg.to_string())
    }

    /// The message carried by this error, without its category prefix.
    pub fn message(&self) -> &str {
        match self {
            Error::MalformedControl(msg)
            | Error::MalformedStructure(msg)
            | Error::Type(msg)
            | Error::Misc(msg) => msg,
        }
    }
}
