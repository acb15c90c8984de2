use std::io;
use thiserror::Error;

/// Errors raised by a convolution invocation.
///
/// Every variant aborts the invocation it was raised in; the output tensor
/// is left in an unspecified state.
#[derive(Debug, Error)]
pub enum ConvError {
  /// Dimension, group, bias or quantization-slice invariants violated.
  #[error("shape mismatch: {0}")]
  ShapeMismatch(String),

  /// The accelerator command sequence was broken.
  #[error("accelerator protocol violation: {0}")]
  ProtocolViolation(String),

  /// The configured problem cannot be accumulated in the chosen width.
  #[error("accumulator overflow: {0}")]
  AccumulatorOverflow(String),

  #[error("accelerator link: {0}")]
  Io(#[from] io::Error),

  #[error("config: {0}")]
  Config(String),
}

pub type Result<T> = std::result::Result<T, ConvError>;

pub(crate) fn shape_mismatch(msg: impl Into<String>) -> ConvError {
  ConvError::ShapeMismatch(msg.into())
}

pub(crate) fn protocol_violation(msg: impl Into<String>) -> ConvError {
  ConvError::ProtocolViolation(msg.into())
}

impl From<ConvError> for io::Error {
  fn from(e: ConvError) -> Self {
    match e {
      ConvError::Io(inner) => inner,
      ConvError::Config(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
      other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
  }
}
