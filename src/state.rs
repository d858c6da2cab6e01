//! Per-instance shared state and the synchronization primitives tying the
//! producer and reader sides together.
//!
//! Lock order, outermost first (`spec.md` §3): `frontier_lock` →
//! `source_lock` → a block's own range lock. No two block locks are ever
//! held at once. `cv_fill` and `cv_rewind` both wait on `frontier_lock`'s
//! mutex — a single `Mutex` may host more than one `Condvar` as long as
//! every wait on a given condvar always uses a guard from that same mutex,
//! which holds here.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use crate::block_array::BlockArray;
use crate::config::MembufOptions;

/// The data `frontier_lock` guards: the frontier itself, whether the
/// producer has parked at end-of-stream, and the block array's structure.
pub struct FrontierState {
  /// First global byte offset not yet guaranteed buffered.
  pub frontier: u64,
  /// Set by the producer when `frontier >= stream_size` and it is about
  /// to park.
  pub eos: bool,
  pub blocks: BlockArray,
}

/// All per-instance state shared between the producer thread and reader
/// calls.
pub struct CacheState {
  pub stream_size: u64,
  pub can_seek: bool,
  pub can_fast_seek: bool,

  pub block_size: usize,
  pub bytes_per_read: usize,
  pub short_seek_range: u64,

  /// Next byte the reader will consume. Mutated only on the reader side
  /// (spec.md §3); readable from anywhere for `control` queries.
  reader_offset: AtomicU64,
  /// Sticky: a source read or allocation failure occurred.
  error: AtomicBool,
  /// Sticky: the filter is being torn down.
  closing: AtomicBool,

  pub frontier_lock: Mutex<FrontierState>,
  pub cv_fill: Condvar,
  pub cv_rewind: Condvar,

  /// Orders access to the upstream source: its `read`/`seek`/`tell` must
  /// be atomic with respect to the filter's view of its own position.
  pub source_lock: Mutex<()>,
}

impl CacheState {
  pub fn new(stream_size: u64, can_seek: bool, can_fast_seek: bool, opts: &MembufOptions) -> Self {
    Self {
      stream_size,
      can_seek,
      can_fast_seek,
      block_size: opts.block_size,
      bytes_per_read: opts.bytes_per_read,
      short_seek_range: opts.short_seek_range,
      reader_offset: AtomicU64::new(0),
      error: AtomicBool::new(false),
      closing: AtomicBool::new(false),
      frontier_lock: Mutex::new(FrontierState {
        frontier: 0,
        eos: false,
        blocks: BlockArray::new(),
      }),
      cv_fill: Condvar::new(),
      cv_rewind: Condvar::new(),
      source_lock: Mutex::new(()),
    }
  }

  pub fn reader_offset(&self) -> u64 {
    self.reader_offset.load(Ordering::Acquire)
  }

  pub fn set_reader_offset(&self, value: u64) {
    self.reader_offset.store(value, Ordering::Release);
  }

  pub fn advance_reader_offset(&self, n: u64) {
    self.reader_offset.fetch_add(n, Ordering::AcqRel);
  }

  pub fn is_error(&self) -> bool {
    self.error.load(Ordering::Acquire)
  }

  pub fn set_error(&self) {
    self.error.store(true, Ordering::Release);
  }

  pub fn is_closing(&self) -> bool {
    self.closing.load(Ordering::Acquire)
  }

  pub fn set_closing(&self) {
    self.closing.store(true, Ordering::Release);
  }

  /// Best-effort read of the frontier for `GET_CACHED_SIZE`. `spec.md`
  /// §4.3 explicitly allows an unlocked read here; we still take the
  /// lock briefly since nothing in this crate's design benefits from a
  /// torn read, but we never block waiting on a condvar to serve this
  /// query.
  pub fn cached_size(&self) -> u64 {
    self.frontier_lock.lock().unwrap().frontier
  }
}
