//! Error taxonomy for the prebuffering filter.
//!
//! Mirrors the refuse-to-engage / sticky-error / per-call-seek-failure split
//! the original stream filter expresses with plain integer return codes.

/// Errors produced by [`crate::PrebufferFilter`].
#[derive(Debug, thiserror::Error)]
pub enum MembufError {
  /// The filter is disabled via [`crate::MembufOptions::enabled`].
  #[error("membuf: disabled")]
  Disabled,

  /// The upstream source reported an unknown or zero size.
  #[error("membuf: stream unknown size")]
  UnknownSize,

  /// A construction parameter is out of range.
  #[error("membuf: invalid config: {0}")]
  InvalidConfig(&'static str),

  /// The upstream source does not support seeking.
  #[error("membuf: source is not seekable")]
  NotSeekable,

  /// The upstream source returned an error from `read`, `seek`, or `tell`.
  #[error("membuf: source error: {0}")]
  Source(#[from] std::io::Error),

  /// The filter has been closed, or is being closed.
  #[error("membuf: closed")]
  Closed,
}

impl MembufError {
  /// True for the sticky runtime errors that cause every subsequent
  /// `read`/`peek` call to fail (as opposed to a one-shot seek failure).
  pub fn is_sticky(&self) -> bool {
    matches!(self, MembufError::Source(_) | MembufError::Closed)
  }
}

/// A [`Result`] alias for fallible membuf operations.
pub type MembufResult<T> = Result<T, MembufError>;
