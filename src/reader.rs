//! Reader-side operations: `wait_fill`, `read`, `peek`.
//!
//! These are plain functions taking `&CacheState` rather than methods on
//! `PrebufferFilter` so that `filter.rs` stays a thin dispatch layer; this
//! mirrors how `crate::producer` is a free function taking the same state.

use std::sync::Arc;

use crate::block::Block;
use crate::block_array::BlockArray;
use crate::error::{MembufError, MembufResult};
use crate::state::CacheState;

/// The result of [`peek`]: either a zero-copy view into a single block, or
/// an owned view over the reader's scratch buffer when the requested range
/// straddled a block boundary. Derefs to `&[u8]` either way.
///
/// Holding the block's `Arc` here (rather than borrowing `&'a CacheState`)
/// is what makes the zero-copy path sound: the returned bytes stay valid
/// for as long as this value is alive, independent of whether the block is
/// later reset by a seek issued through the *same* filter, since the reset
/// only replaces what a future `filled_slice` call would see — the backing
/// allocation itself is never freed or shrunk while any `Arc<Block>` (this
/// one included) is outstanding.
pub enum Peeked<'a> {
  Block { block: Arc<Block>, offset: usize, len: usize },
  Scratch(&'a [u8]),
}

impl std::ops::Deref for Peeked<'_> {
  type Target = [u8];

  fn deref(&self) -> &[u8] {
    match self {
      Peeked::Block { block, offset, len } => block.filled_slice(*offset, *len),
      Peeked::Scratch(s) => s,
    }
  }
}

/// Resolve how many of the `len` requested bytes starting at
/// `state.reader_offset()` are immediately serviceable, blocking on
/// `cv_fill` as needed. Returns `Ok(n)` with the (possibly clamped) byte
/// count, per `spec.md` §4.3. `len == 0` always resolves to `Ok(0)`
/// without blocking.
pub fn wait_fill(state: &CacheState, len: u64) -> MembufResult<u64> {
  if len == 0 {
    return Ok(0);
  }
  let reader_offset = state.reader_offset();
  let mut fs = state.frontier_lock.lock().unwrap();

  let mut want = len;
  loop {
    if state.is_error() {
      return Err(MembufError::Source(std::io::Error::other("membuf: sticky source error")));
    }
    if state.is_closing() {
      return Err(MembufError::Closed);
    }
    if fs.eos && reader_offset >= fs.frontier {
      return Ok(0);
    }
    if reader_offset + want <= fs.frontier {
      return Ok(want);
    }
    if fs.eos {
      want = fs.frontier - reader_offset;
      return Ok(want);
    }
    fs = state.cv_fill.wait(fs).unwrap();
  }
}

/// Copy up to `dst.len()` bytes starting at `state.reader_offset()` into
/// `dst`, advancing `reader_offset` by the amount copied. Returns the byte
/// count, or `Ok(0)` at clean EOS.
pub fn read(state: &CacheState, dst: &mut [u8]) -> MembufResult<usize> {
  let n = wait_fill(state, dst.len() as u64)?;
  if n == 0 {
    return Ok(0);
  }
  copy_from_blocks(state, &mut dst[..n as usize]);
  state.advance_reader_offset(n);
  Ok(n as usize)
}

/// Advance `reader_offset` by up to `len` bytes without copying (the
/// downstream `read(nullptr, n)` skip form).
pub fn skip(state: &CacheState, len: u64) -> MembufResult<u64> {
  let n = wait_fill(state, len)?;
  state.advance_reader_offset(n);
  Ok(n)
}

/// Borrow up to `len` bytes starting at `state.reader_offset()` without
/// advancing the reader position. Returns a zero-copy view if the
/// available range sits inside one block; otherwise gathers into
/// `scratch`. The caller must not issue a seek while the returned
/// [`Peeked`] is still alive (`spec.md` §4.3, §9).
pub fn peek<'a>(state: &CacheState, len: u64, scratch: &'a mut Vec<u8>) -> MembufResult<Peeked<'a>> {
  let n = wait_fill(state, len)? as usize;
  if n == 0 {
    return Ok(Peeked::Scratch(&[]));
  }

  let reader_offset = state.reader_offset();
  let block_size = state.block_size as u64;
  let k = (reader_offset / block_size) as usize;
  let in_block_off = (reader_offset % block_size) as usize;

  if in_block_off + n <= block_size as usize {
    let block = {
      let fs = state.frontier_lock.lock().unwrap();
      fs.blocks.get(k).expect("wait_fill postcondition: block must exist")
    };
    return Ok(Peeked::Block { block, offset: in_block_off, len: n });
  }

  if scratch.len() < n {
    scratch.resize(n, 0);
  }
  copy_from_blocks(state, &mut scratch[..n]);
  Ok(Peeked::Scratch(&scratch[..n]))
}

/// Walk blocks starting at `state.reader_offset()`, copying `dst.len()`
/// bytes total. Caller guarantees (via `wait_fill`'s postcondition) that
/// every byte in range is already buffered.
fn copy_from_blocks(state: &CacheState, dst: &mut [u8]) {
  let block_size = state.block_size as u64;
  let mut remaining = dst;
  let mut offset = state.reader_offset();

  while !remaining.is_empty() {
    let k = (offset / block_size) as usize;
    let in_block_off = (offset % block_size) as usize;

    let block = {
      let fs = state.frontier_lock.lock().unwrap();
      block_at(&fs.blocks, k)
    };

    let range = block.range();
    debug_assert!(in_block_off >= range.begin && in_block_off < range.end);
    let avail = range.end - in_block_off;
    let take = avail.min(remaining.len());

    let chunk = block.filled_slice(in_block_off, take);
    remaining[..take].copy_from_slice(chunk);

    offset += take as u64;
    remaining = &mut remaining[take..];
  }
}

fn block_at(blocks: &BlockArray, index: usize) -> std::sync::Arc<crate::block::Block> {
  blocks.get(index).expect("wait_fill postcondition: block must exist")
}
