//! The `SET_POSITION` seek policy (`spec.md` §4.4).

use crate::error::{MembufError, MembufResult};
use crate::reader;
use crate::state::CacheState;
use crate::Source;
use std::sync::Arc;

/// Apply `target` as the new reader position, absorbing short forward
/// seeks by waiting, and otherwise rewinding the source only as far as
/// necessary. Returns `Ok(())` on success.
pub fn seek(state: &CacheState, source: &Arc<dyn Source>, target: u64) -> MembufResult<()> {
  if !state.can_seek {
    return Err(MembufError::NotSeekable);
  }

  let frontier = state.frontier_lock.lock().unwrap().frontier;
  if frontier < target && target < frontier + state.short_seek_range {
    let want = target.saturating_sub(state.reader_offset());
    tracing::debug!(target, frontier, want, "membuf: short seek absorbed by waiting");
    let n = reader::wait_fill(state, want)?;
    if n == 0 {
      // The producer parked at true end-of-stream before it could fill
      // the gap: `target` is past the stream's actual end and
      // unreachable. Leave `reader_offset` where it is rather than
      // falling through to the rewind scan below, which would otherwise
      // clamp the out-of-buffer source seek to the stream's end and
      // report success for a target that was never served.
      return Ok(());
    }
  }

  let reachable = {
    let fs = state.frontier_lock.lock().unwrap();
    let reachable = scan_reachable(state, target, &fs.blocks, fs.frontier);
    if target <= fs.frontier && target < reachable {
      drop(fs);
      state.set_reader_offset(target);
      return Ok(());
    }
    reachable
  };

  tracing::info!(target, reachable, "membuf: rewind seek, leaving buffered range");
  let tell = {
    let _source_guard = state.source_lock.lock().unwrap();
    let _ = source.seek(reachable);
    source.tell().map_err(MembufError::Source)?
  };

  let mut fs = state.frontier_lock.lock().unwrap();
  fs.eos = false;
  fs.frontier = tell;

  let result = if target <= tell {
    state.set_reader_offset(target);
    Ok(())
  } else if state.reader_offset() > tell {
    state.set_reader_offset(tell);
    Err(MembufError::Source(std::io::Error::other("membuf: seek landed short of reader position")))
  } else {
    Ok(())
  };

  drop(fs);
  state.cv_rewind.notify_all();
  result
}

/// Largest offset `>= target` such that the stream is contiguously
/// buffered from `target`'s in-block position through full blocks, up to
/// either a gap, an unfinished tail, or the stream's end.
pub(crate) fn scan_reachable(state: &CacheState, target: u64, blocks: &crate::block_array::BlockArray, frontier: u64) -> u64 {
  let block_size = state.block_size as u64;
  let first_k = (target / block_size) as usize;

  let Some(first_block) = blocks.get(first_k) else {
    return target;
  };
  let first_off = (target % block_size) as usize;
  let first_range = first_block.range();
  if first_off < first_range.begin || first_off >= first_range.end {
    return target;
  }
  let mut reachable = first_k as u64 * block_size + first_range.end as u64;
  if reachable >= state.stream_size || reachable >= frontier {
    return reachable.min(state.stream_size);
  }

  let mut k = first_k + 1;
  loop {
    let global_start = k as u64 * block_size;
    if global_start >= state.stream_size {
      break;
    }
    let Some(block) = blocks.get(k) else { break };
    let range = block.range();
    if range.begin != 0 {
      break;
    }
    reachable = global_start + range.end as u64;
    if range.end < block.capacity() {
      break;
    }
    k += 1;
  }
  reachable.min(state.stream_size)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block_array::BlockArray;
  use crate::config::MembufOptions;

  fn state_with(stream_size: u64, block_size: usize) -> CacheState {
    let mut opts = MembufOptions::enabled();
    opts.block_size = block_size;
    CacheState::new(stream_size, true, true, &opts)
  }

  #[test]
  fn scan_reachable_stops_at_gap_in_first_block() {
    let state = state_with(1000, 100);
    let blocks = BlockArray::new();
    let reachable = scan_reachable(&state, 10, &blocks, 0);
    // No block materialized at all: reachable collapses to target.
    assert_eq!(reachable, 10);
  }
}
