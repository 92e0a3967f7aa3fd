use std::error::Error;
use std::fmt::{Display, Formatter};

/// A custom error message for the analysis engine
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum AnalysisError {
    /// A location expected to hold a pointer does not
    TypeMismatch(String),
    /// Dereference of a pointer that is not a pointer of pointer
    InvalidDereference(String),
    /// A program construct the analysis does not model
    UnsupportedTarget(String),
    /// Malformed argument to an operation
    InvalidArgument(String),
    /// Re-assignment of a write-once value
    IllegalReassignment(String),
    /// Error during the loading of an input program
    LoadingError(String),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

impl Display for AnalysisError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TypeMismatch(msg) => {
                write!(f, "[petra::type-mismatch] {}", msg)
            }
            Self::InvalidDereference(msg) => {
                write!(f, "[petra::deref] {}", msg)
            }
            Self::UnsupportedTarget(msg) => {
                write!(f, "[petra::unsupported] {}", msg)
            }
            Self::InvalidArgument(msg) => {
                write!(f, "[petra::argument] {}", msg)
            }
            Self::IllegalReassignment(msg) => {
                write!(f, "[petra::reassignment] {}", msg)
            }
            Self::LoadingError(msg) => {
                write!(f, "[petra::loading] {}", msg)
            }
        }
    }
}

impl Error for AnalysisError {}
