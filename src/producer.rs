//! The background fill thread.
//!
//! One outer iteration targets a block and fills as much of it as
//! possible (`spec.md` §4.2). Every lock acquired here is released on
//! every exit path, including the early returns below — Rust's
//! `MutexGuard`/`Drop` gives us that for free, which is the main way this
//! translation simplifies on the original's manual `mutex_cleanup_push`
//! bookkeeping (used to survive POSIX thread cancellation at an arbitrary
//! point). This crate has no equivalent of `pthread_cancel`: the producer
//! thread can only be signalled to stop cooperatively via `closing`, which
//! it checks at every loop boundary and every lock acquisition below. A
//! thread blocked inside `Source::read` cannot be interrupted; `close()`
//! still joins it, so teardown only returns once that last read completes.

use std::sync::Arc;

use crate::source::Source;
use crate::state::CacheState;

pub fn run(state: Arc<CacheState>, source: Arc<dyn Source>) {
  loop {
    let frontier = match park_until_target(&state) {
      Some(f) => f,
      None => {
        tracing::debug!("membuf: producer exiting");
        return;
      }
    };

    let block_size = state.block_size;
    let k = (frontier / block_size as u64) as usize;
    let off = (frontier % block_size as u64) as usize;

    let block = {
      let mut fs = state.frontier_lock.lock().unwrap();
      let block = fs.blocks.get_or_allocate(k, state.stream_size, block_size);
      block.retarget(off);
      block
    };

    if state.is_error() || state.is_closing() {
      return;
    }

    fill_block(&state, &source, &block, off, frontier);
  }
}

/// Step 1 of `spec.md` §4.2: park while `frontier >= stream_size`, waking
/// any blocked reader and waiting for a seek or teardown. Returns `None` if
/// the producer should exit, `Some(frontier)` otherwise.
fn park_until_target(state: &CacheState) -> Option<u64> {
  let mut fs = state.frontier_lock.lock().unwrap();
  loop {
    if fs.frontier < state.stream_size {
      return Some(fs.frontier);
    }
    if state.is_error() || state.is_closing() {
      return None;
    }
    fs.eos = true;
    state.cv_fill.notify_all();
    tracing::info!(frontier = fs.frontier, "membuf: EOS, wait for seek or exit");
    fs = state.cv_rewind.wait(fs).unwrap();
  }
}

/// Steps 2–3 of `spec.md` §4.2: fill `block`, starting at in-block offset
/// `off`, until the block is full, the reader seeks (frontier no longer
/// matches `expect_frontier`), or an error occurs.
fn fill_block(
  state: &Arc<CacheState>,
  source: &Arc<dyn Source>,
  block: &crate::block::Block,
  mut off: usize,
  frontier: u64,
) {
  let mut expect_frontier = frontier;

  while off < block.capacity() {
    if state.is_error() || state.is_closing() {
      return;
    }

    let step = state.bytes_per_read.min(block.capacity() - off);

    // Stability check: has a reader seeked since we picked this target?
    if state.frontier_lock.lock().unwrap().frontier != expect_frontier {
      return;
    }

    enum ReadOutcome {
      Read(std::io::Result<usize>),
      OffsetMismatch(u64),
      TellFailed(std::io::Error),
    }

    let outcome = {
      let _source_guard = state.source_lock.lock().unwrap();
      match source.tell() {
        Ok(tell) if tell == expect_frontier => {
          // SAFETY: `off == block's current range.end` here — it
          // was just set by `retarget` or the previous iteration
          // of this loop, so the region is not yet visible to
          // any reader.
          let dst = unsafe { block.write_region_mut(off, step) };
          ReadOutcome::Read(source.read(dst))
        }
        Ok(tell) => ReadOutcome::OffsetMismatch(tell),
        Err(err) => ReadOutcome::TellFailed(err),
      }
    };

    match outcome {
      ReadOutcome::OffsetMismatch(actual) => {
        tracing::error!(
          expected = expect_frontier,
          actual,
          "membuf: wrong prebuffer offset"
        );
        return;
      }
      ReadOutcome::TellFailed(err) => {
        tracing::error!(%err, "membuf: source.tell failed");
        state.set_error();
        state.cv_fill.notify_all();
        return;
      }
      ReadOutcome::Read(Ok(n)) if n > 0 => {
        off += n;
        block.publish_end(off);

        let mut fs = state.frontier_lock.lock().unwrap();
        if fs.frontier == expect_frontier {
          expect_frontier += n as u64;
          fs.frontier = expect_frontier;
          drop(fs);
        } else {
          // A reader seeked while the read was in flight. The
          // bytes we just wrote stay valid on this block (they
          // form a legitimate [begin, end) range) but this
          // producer iteration is no longer current.
          drop(fs);
          state.cv_fill.notify_all();
          return;
        }
        state.cv_fill.notify_all();
      }
      ReadOutcome::Read(Ok(_)) => {
        tracing::error!(offset = expect_frontier, "membuf: source read returned no data before end of stream");
        state.set_error();
        state.cv_fill.notify_all();
        return;
      }
      ReadOutcome::Read(Err(err)) => {
        tracing::error!(%err, offset = expect_frontier, "membuf: source read failed");
        state.set_error();
        state.cv_fill.notify_all();
        return;
      }
    }
  }
}
