use thiserror::Error;

use crate::{Op, capture::CaptureError, wire::DecodeError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter {0} not found")]
    NotFound(u16),
    #[error("filter {0} already exists")]
    AlreadyExists(u16),
    #[error("filter references unknown filter {0}")]
    InvalidReference(u16),
    #[error("target {0:#x} is not defined in the current context")]
    InvalidTarget(u32),
    #[error("operator {op} not allowed on {found} target")]
    TypeMismatch { op: Op, found: &'static str },
    #[error("out of memory")]
    OutOfMemory,
    #[error("interrupted")]
    Interrupted,
    #[error("invalid filter definition: {0}")]
    InvalidDefinition(String),
    #[error("malformed record: {0}")]
    Decode(#[from] DecodeError),
}

impl FilterError {
    /// Maps a failure of the argument-capture layer for argument `code`.
    pub(crate) fn from_capture(code: u32, err: CaptureError) -> Self {
        match err {
            CaptureError::Missing(_) => FilterError::InvalidTarget(code),
            CaptureError::Interrupted => FilterError::Interrupted,
            CaptureError::OutOfMemory => FilterError::OutOfMemory,
        }
    }
}
