//! Seam to the system-call argument capture layer.

use thiserror::Error;
use vigil_core::{CapturedArg, EventContext};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("argument {0} was not captured")]
    Missing(u32),
    #[error("interrupted while capturing")]
    Interrupted,
    #[error("out of memory while capturing")]
    OutOfMemory,
}

/// Provides the arguments of the call currently being audited.
pub trait ArgumentCapture: Send + Sync {
    /// Returns argument `position` of the current call, already materialized.
    fn argument(&self, event: &EventContext, position: u32) -> Result<CapturedArg, CaptureError>;
}

/// Serves the arguments the interception layer already stored in the event.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapturedArguments;

impl ArgumentCapture for CapturedArguments {
    fn argument(&self, event: &EventContext, position: u32) -> Result<CapturedArg, CaptureError> {
        event
            .call
            .as_ref()
            .and_then(|call| call.args.get(position as usize))
            .cloned()
            .ok_or(CaptureError::Missing(position))
    }
}
