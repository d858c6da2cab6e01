//! A fixed-capacity byte buffer holding one contiguous valid range.
//!
//! Mirrors `buffer_block_t` in the original filter: a `range_lock` guards
//! only the `[begin, end)` bookkeeping, never the byte storage itself. The
//! byte storage lives in an [`UnsafeCell`] so that [`Block::filled_slice`]
//! can hand back a slice whose lifetime is tied to the block (and, through
//! it, to the filter), not to a held `MutexGuard` — this is what makes
//! zero-copy `peek` possible. See `SPEC_FULL.md` §9 ("Block interior
//! mutability") for the safety argument this relies on.

use std::cell::UnsafeCell;
use std::sync::Mutex;

/// The mutable, lock-guarded part of a [`Block`]: its valid byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
  pub begin: usize,
  pub end: usize,
}

/// One aligned, fixed-capacity window of the source stream.
pub struct Block {
  capacity: usize,
  // SAFETY invariant maintained by this module and by `frontier`/`range`
  // synchronization in `crate::filter`: bytes in `[range.begin,
  // range.end)` are written exactly once, before the `range.end` advance
  // that publishes them becomes visible to other threads, and are never
  // rewritten except by `reset_range`, which is only ever called by the
  // producer while holding both the frontier lock and `range`'s mutex.
  // No caller is handed a `filled_slice()` that outlives a seek it issued
  // itself (enforced by `crate::reader`), so a reader's aliased slice
  // never observes a concurrent reset.
  buffer: UnsafeCell<Box<[u8]>>,
  range: Mutex<BlockRange>,
}

// SAFETY: the only interior-mutable field, `buffer`, is only ever written
// by the producer thread, and only inside the byte range not yet readable
// through `range` (enforced by the `range` mutex ordering in
// `crate::producer`). Concurrent reads from reader threads only ever touch
// `[0, range.end)` snapshots taken under the `range` mutex, which can never
// overlap with the producer's concurrent write to `[range.end, ..)`.
unsafe impl Sync for Block {}

impl Block {
  /// Allocate a fresh, empty block of the given capacity.
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      buffer: UnsafeCell::new(vec![0u8; capacity].into_boxed_slice()),
      range: Mutex::new(BlockRange { begin: 0, end: 0 }),
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Snapshot of the current valid range.
  pub fn range(&self) -> BlockRange {
    *self.range.lock().unwrap()
  }

  /// Apply the `spec.md` §4.1 partial-fill reconciliation for a producer
  /// retargeting this block to in-block offset `off`. Returns the
  /// resulting range.
  pub fn retarget(&self, off: usize) -> BlockRange {
    let mut range = self.range.lock().unwrap();
    if off < range.begin {
      // Uncompleted at head of block: drop, rewind to `off`.
      range.begin = off;
      range.end = off;
    } else {
      // Either a forward gap (off >= end) or off falling inside the
      // current range: both cases drop down to `end = off` and keep
      // `begin`. The in-range case is a deliberate simplification —
      // the policy always resets rather than preserving the
      // buffered segment ahead of `off` (spec.md §4.1, §9 Open
      // Question) — rather than issuing an intra-block source seek.
      range.end = off;
    }
    *range
  }

  /// Write `data` at in-block offset `at` and advance `end` by
  /// `data.len()`. Caller (the producer) guarantees `at == range.end`
  /// before the call and that no other thread writes to this block
  /// concurrently.
  pub fn write_and_advance(&self, at: usize, data: &[u8]) {
    // SAFETY: see `write_region_mut`.
    unsafe { self.write_region_mut(at, data.len()) }.copy_from_slice(data);
    self.publish_end(at + data.len());
  }

  /// Borrow `[at, at+len)` of the backing storage for an in-place write,
  /// without touching `range`. The producer reads the source directly
  /// into this slice, then calls [`Block::publish_end`] to make the
  /// bytes visible.
  ///
  /// # Safety
  /// The caller must be the sole writer (the producer thread), and
  /// `[at, at+len)` must not overlap the block's currently-visible range
  /// `[range.begin, range.end)` — i.e. `at >= range.end` at the time of
  /// the call, so no reader can observe a partially-written byte.
  pub unsafe fn write_region_mut(&self, at: usize, len: usize) -> &mut [u8] {
    debug_assert!(at + len <= self.capacity);
    let buf = &mut *self.buffer.get();
    &mut buf[at..at + len]
  }

  /// Make bytes written via [`Block::write_region_mut`] visible by
  /// advancing `range.end`.
  pub fn publish_end(&self, new_end: usize) {
    let mut range = self.range.lock().unwrap();
    range.end = new_end;
  }

  /// Borrow the filled slice `[offset, offset+len)`. Caller guarantees
  /// (via `wait_fill`'s postcondition) that this sub-range is within the
  /// block's current valid range at the time of the call.
  pub fn filled_slice(&self, offset: usize, len: usize) -> &[u8] {
    {
      let range = self.range.lock().unwrap();
      debug_assert!(offset >= range.begin && offset + len <= range.end);
    }
    // SAFETY: see the struct-level comment; the caller-guaranteed
    // sub-range lies entirely below `range.end` at a moment the
    // `wait_fill` contract established happened-before this call, and
    // no writer touches bytes below `range.end` again until a reset
    // that the reader contract forbids during an outstanding peek.
    unsafe {
      let buf = &*self.buffer.get();
      &buf[offset..offset + len]
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fresh_block_is_empty() {
    let b = Block::new(16);
    let r = b.range();
    assert_eq!(r.begin, 0);
    assert_eq!(r.end, 0);
  }

  #[test]
  fn write_and_read_back() {
    let b = Block::new(16);
    b.write_and_advance(0, b"hello");
    assert_eq!(b.filled_slice(0, 5), b"hello");
    assert_eq!(b.range(), BlockRange { begin: 0, end: 5 });
  }

  #[test]
  fn retarget_at_zero_on_fresh_block_resets_tail() {
    // begin == end == 0 on a fresh block, so off == 0 hits the
    // forward-gap branch (off >= end), not the head-drop branch.
    let b = Block::new(16);
    let range = b.retarget(0);
    assert_eq!(range, BlockRange { begin: 0, end: 0 });
  }

  #[test]
  fn retarget_forward_gap_keeps_begin() {
    let b = Block::new(16);
    b.write_and_advance(0, &[0; 4]); // range now [0, 4)
    let range = b.retarget(10);
    assert_eq!(range, BlockRange { begin: 0, end: 10 });
  }

  #[test]
  fn retarget_inside_range_always_resets() {
    let b = Block::new(16);
    b.write_and_advance(0, &[0; 10]); // range now [0, 10)
    let range = b.retarget(5);
    assert_eq!(range, BlockRange { begin: 0, end: 5 });
  }
}
