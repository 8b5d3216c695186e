use thiserror::Error;

use crate::adts::AdtsError;
use crate::negotiate::CapabilityError;
use crate::session::SessionState;

/// Errors surfaced by encoder sessions, framers, and the capture pipeline
#[derive(Debug, Error)]
pub enum EncoderError {
    /// Requested configuration is outside what the codec declares it supports
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// Codec context, frame, or packet could not be created
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// The reusable input frame is still referenced by the codec
    #[error("input frame buffer is busy; drain pending packets before submitting again")]
    BufferBusy,

    /// The codec declined the frame (e.g. its internal queue is full)
    #[error("codec rejected frame: {0}")]
    RejectedFrame(String),

    /// Unrecoverable codec failure; the session is closed
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("session is closed")]
    Closed,

    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    #[error(transparent)]
    Adts(#[from] AdtsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("capture error: {0}")]
    Capture(String),
}

impl EncoderError {
    /// True when the session survives the error and the call can be retried
    /// after draining.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EncoderError::BufferBusy | EncoderError::RejectedFrame(_))
    }
}

pub type Result<T, E = EncoderError> = std::result::Result<T, E>;
