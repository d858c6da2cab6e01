//! The growable, block-number-indexed slot sequence.
//!
//! Unlike [`crate::block::Block`], `BlockArray` has no lock of its own:
//! `spec.md` §5 places block-array growth squarely under the filter's
//! `frontier_lock`, so this type is only ever touched from code already
//! holding that lock (see `crate::state::CacheState::frontier`).

use std::sync::Arc;

use crate::block::Block;

/// Capacity a freshly-allocated block at `index` should have, given the
/// stream's total size and the configured block size `b`: `b` for every
/// block except the last, which is truncated to the stream's tail.
pub fn block_capacity(index: usize, stream_size: u64, b: usize) -> usize {
  let b64 = b as u64;
  let last_block_index = ((stream_size - 1) / b64) as usize;
  if index == last_block_index {
    (((stream_size - 1) % b64) + 1) as usize
  } else {
    b
  }
}

/// Ordered, growable sequence of optional block slots.
#[derive(Default)]
pub struct BlockArray {
  slots: Vec<Option<Arc<Block>>>,
}

impl BlockArray {
  pub fn new() -> Self {
    Self { slots: Vec::new() }
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  /// Grow with empty slots, if necessary, so that `index` is in bounds.
  pub fn ensure_len(&mut self, index: usize) {
    if index >= self.slots.len() {
      self.slots.resize(index + 1, None);
    }
  }

  /// Fetch the block at `index`, if materialized.
  pub fn get(&self, index: usize) -> Option<Arc<Block>> {
    self.slots.get(index).and_then(|slot| slot.clone())
  }

  /// Materialize (or fetch the existing) block at `index`, growing the
  /// array if needed and allocating a new block sized per
  /// [`block_capacity`] if the slot is empty.
  pub fn get_or_allocate(&mut self, index: usize, stream_size: u64, block_size: usize) -> Arc<Block> {
    self.ensure_len(index);
    if self.slots[index].is_none() {
      let capacity = block_capacity(index, stream_size, block_size);
      self.slots[index] = Some(Arc::new(Block::new(capacity)));
    }
    self.slots[index].clone().unwrap()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn block_capacity_truncates_last_block() {
    let b = 100;
    // stream_size = 250 -> blocks of 100, 100, 50
    assert_eq!(block_capacity(0, 250, b), 100);
    assert_eq!(block_capacity(1, 250, b), 100);
    assert_eq!(block_capacity(2, 250, b), 50);
  }

  #[test]
  fn block_capacity_exact_multiple() {
    let b = 100;
    // stream_size = 200 -> two full blocks, no truncated remainder
    assert_eq!(block_capacity(0, 200, b), 100);
    assert_eq!(block_capacity(1, 200, b), 100);
  }

  #[test]
  fn growth_and_allocation() {
    let mut arr = BlockArray::new();
    assert_eq!(arr.len(), 0);
    let blk = arr.get_or_allocate(2, 1000, 100);
    assert_eq!(arr.len(), 3);
    assert_eq!(blk.capacity(), 100);
    assert!(arr.get(0).is_none());
    assert!(arr.get(1).is_none());
    assert!(Arc::ptr_eq(&arr.get(2).unwrap(), &blk));
  }

  #[test]
  fn repeated_allocate_returns_same_block() {
    let mut arr = BlockArray::new();
    let a = arr.get_or_allocate(0, 1000, 100);
    let b = arr.get_or_allocate(0, 1000, 100);
    assert!(Arc::ptr_eq(&a, &b));
  }
}
