//! Operator-visible options and the compile-time constants from the
//! original filter, exposed as overridable construction parameters.

use crate::error::MembufError;

/// Block size used by the original filter: 4 MiB.
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Per-`read()` chunk size issued against the upstream source: 16 KiB.
pub const DEFAULT_BYTES_PER_READ: usize = 16 * 1024;

/// Width of the short-seek-ahead absorption window: 64 KiB.
pub const DEFAULT_SHORT_SEEK_RANGE: u64 = 64 * 1024;

/// Construction options for [`crate::PrebufferFilter::open`].
///
/// `Default` matches the original module's defaults: disabled, 4 MiB
/// blocks, 16 KiB reads, a 64 KiB short-seek window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembufOptions {
  /// Operator switch. The filter refuses to engage unless this is `true`,
  /// mirroring the `membuf-enable` boolean option (default off).
  pub enabled: bool,
  /// Fixed block capacity in bytes. Must be nonzero.
  pub block_size: usize,
  /// Bytes requested per `source.read()` call inside the producer's fill
  /// loop. Must be nonzero.
  pub bytes_per_read: usize,
  /// Width of the forward window, measured from the frontier, within
  /// which a seek is absorbed by waiting rather than re-seeking the
  /// source.
  pub short_seek_range: u64,
}

impl Default for MembufOptions {
  fn default() -> Self {
    Self {
      enabled: false,
      block_size: DEFAULT_BLOCK_SIZE,
      bytes_per_read: DEFAULT_BYTES_PER_READ,
      short_seek_range: DEFAULT_SHORT_SEEK_RANGE,
    }
  }
}

impl MembufOptions {
  /// Convenience constructor: defaults, but enabled.
  pub fn enabled() -> Self {
    Self {
      enabled: true,
      ..Self::default()
    }
  }

  pub(crate) fn validate(&self) -> Result<(), MembufError> {
    if self.block_size == 0 {
      return Err(MembufError::InvalidConfig("block_size must be nonzero"));
    }
    if self.bytes_per_read == 0 {
      return Err(MembufError::InvalidConfig(
        "bytes_per_read must be nonzero",
      ));
    }
    Ok(())
  }
}
