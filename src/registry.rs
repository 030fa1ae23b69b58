use std::ptr;

use crate::{
  block::{Block, HEADER_SIZE},
  config::Coalesce,
  error::IntegrityError,
};

/// A snapshot of an allocator's bookkeeping.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
  /// Headers reachable from the registry.
  pub blocks: usize,
  pub free_blocks: usize,
  /// Sum of the capacities of the free blocks.
  pub free_bytes: usize,
  /// Blocks on the tracking list.
  pub live: usize,
  /// Requests the source has granted.
  pub mappings: usize,
  pub mapped_bytes: usize,
}

/// The block registry and the tracking list.
///
/// ```text
///   registry (next):        head ──► A ──► B ──► C ──► D ◄── tail
///                                   used   free  used  used
///
///   tracking (next_alloc):  live ──► D ──► A ──► C
/// ```
///
/// Every header ever carved is on the registry until a free predecessor
/// absorbs it. Only in-use headers are on the tracking list.
pub(crate) struct Registry {
  head: *mut Block,
  tail: *mut Block,
  live: *mut Block,
  mappings: usize,
  mapped_bytes: usize,
}

// Only ever reached through the owning allocator's lock.
unsafe impl Send for Registry {}

impl Registry {
  pub const fn new() -> Self {
    Self {
      head: ptr::null_mut(),
      tail: ptr::null_mut(),
      live: ptr::null_mut(),
      mappings: 0,
      mapped_bytes: 0,
    }
  }

  pub fn live_head(&self) -> *mut Block {
    self.live
  }

  /// First fit: the first free block, in registry order, that can hold
  /// `size` bytes. A free block that is too small on its own absorbs free
  /// successors one at a time, stopping as soon as it fits.
  pub unsafe fn find_free_block(
    &mut self,
    size: usize,
    coalesce: Coalesce,
  ) -> *mut Block {
    unsafe {
      let mut current: *mut Block = self.head;

      while !current.is_null() {
        if (*current).is_free {
          self.absorb_until(current, coalesce, size);

          if (*current).size >= size {
            return current;
          }
        }
        current = (*current).next;
      }

      ptr::null_mut()
    }
  }

  /// Appends a freshly mapped block at the tail.
  pub unsafe fn append(
    &mut self,
    block: *mut Block,
    mapped: usize,
  ) {
    unsafe {
      if self.head.is_null() {
        self.head = block;
      } else {
        (*self.tail).next = block;
      }
      self.tail = block;
    }

    self.mappings += 1;
    self.mapped_bytes += mapped;
  }

  pub unsafe fn track(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      (*block).next_alloc = self.live;
    }
    self.live = block;
  }

  /// Unlinks `block` from the tracking list. `false` if it was not there.
  pub unsafe fn untrack(
    &mut self,
    block: *mut Block,
  ) -> bool {
    unsafe {
      let mut prev: *mut Block = ptr::null_mut();
      let mut current: *mut Block = self.live;

      while !current.is_null() {
        if current == block {
          if prev.is_null() {
            self.live = (*current).next_alloc;
          } else {
            (*prev).next_alloc = (*current).next_alloc;
          }
          // `next_alloc` is left as is: a shutdown walk may be parked on
          // this block and still needs the rest of the chain.
          return true;
        }
        prev = current;
        current = (*current).next_alloc;
      }

      false
    }
  }

  /// Forward coalescing: folds free successors into `block`. Returns how
  /// many headers were spliced out.
  pub unsafe fn absorb_successors(
    &mut self,
    block: *mut Block,
    coalesce: Coalesce,
  ) -> usize {
    unsafe { self.absorb_until(block, coalesce, usize::MAX) }
  }

  /// Like [`absorb_successors`](Self::absorb_successors), but stops once
  /// `block` holds `target` bytes.
  unsafe fn absorb_until(
    &mut self,
    block: *mut Block,
    coalesce: Coalesce,
    target: usize,
  ) -> usize {
    unsafe {
      let mut absorbed = 0;
      let mut successor: *mut Block = (*block).next;

      while (*block).size < target && !successor.is_null() && (*successor).is_free {
        if coalesce == Coalesce::Contiguous && Block::end(block) != successor as usize {
          break;
        }

        (*block).size += HEADER_SIZE + (*successor).size;
        (*block).next = (*successor).next;

        if successor == self.tail {
          self.tail = block;
        }

        successor = (*block).next;
        absorbed += 1;
      }

      absorbed
    }
  }

  pub unsafe fn stats(&self) -> Stats {
    let mut stats = Stats {
      mappings: self.mappings,
      mapped_bytes: self.mapped_bytes,
      ..Stats::default()
    };

    unsafe {
      let mut current: *mut Block = self.head;
      while !current.is_null() {
        stats.blocks += 1;
        if (*current).is_free {
          stats.free_blocks += 1;
          stats.free_bytes += (*current).size;
        }
        current = (*current).next;
      }

      let mut current: *mut Block = self.live;
      while !current.is_null() {
        stats.live += 1;
        current = (*current).next_alloc;
      }
    }

    stats
  }

  /// Walks both lists and checks their invariants. Never allocates.
  pub unsafe fn verify(&self) -> Result<(), IntegrityError> {
    // Every header came from one mapping, so neither list can be longer.
    let limit = self.mappings;

    unsafe {
      let mut steps = 0;
      let mut in_use = 0;
      let mut last: *mut Block = ptr::null_mut();
      let mut current: *mut Block = self.head;

      while !current.is_null() {
        steps += 1;
        if steps > limit {
          return Err(IntegrityError::Cycle {
            list: "registry",
            steps: limit,
          });
        }
        if !(*current).is_free {
          in_use += 1;
        }
        last = current;
        current = (*current).next;
      }

      if self.tail != last {
        return Err(IntegrityError::TailMismatch {
          tail: self.tail as usize,
          last: last as usize,
        });
      }

      let mut tracked = 0;
      let mut current: *mut Block = self.live;

      while !current.is_null() {
        tracked += 1;
        if tracked > limit {
          return Err(IntegrityError::Cycle {
            list: "tracking",
            steps: limit,
          });
        }
        if (*current).is_free {
          return Err(IntegrityError::TrackedFree {
            block: current as usize,
          });
        }
        if !self.contains(current) {
          return Err(IntegrityError::StrayTracked {
            block: current as usize,
          });
        }
        current = (*current).next_alloc;
      }

      let mut current: *mut Block = self.head;
      while !current.is_null() {
        if !(*current).is_free && !self.is_tracked(current) {
          return Err(IntegrityError::UntrackedInUse {
            block: current as usize,
          });
        }
        current = (*current).next;
      }

      if tracked != in_use {
        return Err(IntegrityError::LiveCountMismatch { tracked, in_use });
      }
    }

    Ok(())
  }

  unsafe fn contains(
    &self,
    block: *mut Block,
  ) -> bool {
    unsafe {
      let mut current: *mut Block = self.head;
      while !current.is_null() {
        if current == block {
          return true;
        }
        current = (*current).next;
      }
      false
    }
  }

  unsafe fn is_tracked(
    &self,
    block: *mut Block,
  ) -> bool {
    unsafe {
      let mut current: *mut Block = self.live;
      while !current.is_null() {
        if current == block {
          return true;
        }
        current = (*current).next_alloc;
      }
      false
    }
  }
}
