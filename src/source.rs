//! The upstream byte-source contract.
//!
//! This is the external collaborator `spec.md` explicitly treats as out of
//! scope: a file, network stream, or archive entry. The filter only ever
//! calls these five operations, and only while holding its own
//! `source_lock` (see [`crate::filter`]), so implementors do not need to be
//! internally reentrant — just `Send + Sync` so an `Arc<dyn Source>` can be
//! shared between the producer thread and reader-side callers.

use std::io;

/// A blocking, seekable byte source with a known size.
pub trait Source: Send + Sync {
  /// Read up to `buf.len()` bytes, returning the count read. `Ok(0)`
  /// means end of stream. Blocking.
  fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

  /// Reposition the source. The filter always treats the source's own
  /// post-seek `tell()` as authoritative, so a best-effort or clamping
  /// implementation is acceptable.
  fn seek(&self, pos: u64) -> io::Result<u64>;

  /// Current source position.
  fn tell(&self) -> io::Result<u64>;

  /// Total size in bytes, or `0` if unknown. A filter `open()` against a
  /// source reporting `0` here is a refuse-to-engage condition.
  fn size(&self) -> u64;

  /// Whether `seek` is supported at all.
  fn can_seek(&self) -> bool;

  /// Whether seeking is cheap (as opposed to merely possible). Exposed
  /// read-only via `control`; this crate does not change behavior based
  /// on it.
  fn can_fast_seek(&self) -> bool;
}
