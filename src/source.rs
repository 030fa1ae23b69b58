//! Backing memory for new blocks.
//!
//! ```text
//!   Mmap:   one anonymous mapping per block, placed wherever the kernel likes
//!
//!           ┌────────┐      ┌────────────┐   ┌─────┐
//!           │ block  │ ...  │   block    │   │block│
//!           └────────┘      └────────────┘   └─────┘
//!
//!   Arena:  one reservation, carved front to back
//!
//!           ┌────────┬────────────┬─────┬──────────────────────┐
//!           │ block  │   block    │block│       unused         │
//!           └────────┴────────────┴─────┴──────────────────────┘
//!
//!   Sbrk:   the program break, bumped per block
//! ```

use std::ptr::{self, NonNull};

use libc::{c_void, intptr_t, sbrk};

use crate::{align::ALIGN, align_to};

/// Something that can hand out fresh read/write memory.
///
/// Called with the allocator's lock held, so implementations never see
/// concurrent calls from the same allocator.
///
/// # Safety
///
/// A returned pointer must be aligned to [`ALIGN`], valid for reads and writes
/// of `len` bytes, and not handed out again (by this source or anything else)
/// for as long as the allocator that owns the source is alive.
pub unsafe trait Source {
  /// Returns `None` when no more memory is available.
  fn map(
    &mut self,
    len: usize,
  ) -> Option<NonNull<u8>>;
}

/// Requests an anonymous, process-private read/write mapping.
fn map_anonymous(len: usize) -> Option<NonNull<u8>> {
  let address = unsafe {
    libc::mmap(
      ptr::null_mut(),
      len,
      libc::PROT_READ | libc::PROT_WRITE,
      libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
      -1,
      0,
    )
  };

  if address == libc::MAP_FAILED {
    return None;
  }

  NonNull::new(address as *mut u8)
}

/// A fresh anonymous mapping for every request. Mappings are never unmapped.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mmap;

unsafe impl Source for Mmap {
  fn map(
    &mut self,
    len: usize,
  ) -> Option<NonNull<u8>> {
    map_anonymous(len)
  }
}

/// A single mapping reserved up front and handed out in order.
///
/// Consecutive blocks are address-contiguous, which makes registry order and
/// address order agree.
#[derive(Debug)]
pub struct Arena {
  base: NonNull<u8>,
  capacity: usize,
  offset: usize,
}

// The arena only hands out disjoint slices of its own reservation.
unsafe impl Send for Arena {}

impl Arena {
  /// Reserves `capacity` bytes. `None` if the mapping is refused.
  pub fn new(capacity: usize) -> Option<Self> {
    let base = map_anonymous(capacity)?;

    Some(Self {
      base,
      capacity,
      offset: 0,
    })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes not yet handed out.
  pub fn remaining(&self) -> usize {
    self.capacity - self.offset
  }
}

unsafe impl Source for Arena {
  fn map(
    &mut self,
    len: usize,
  ) -> Option<NonNull<u8>> {
    let len = len.checked_add(ALIGN - 1)? & !(ALIGN - 1);

    if len > self.remaining() {
      return None;
    }

    let address = unsafe { self.base.add(self.offset) };
    self.offset += len;

    Some(address)
  }
}

/// Grows the program break with `sbrk(2)`, returning `None` on failure.
fn grow_break(increment: usize) -> Option<usize> {
  let increment = intptr_t::try_from(increment).ok()?;

  let address = unsafe { sbrk(increment) };

  if address == usize::MAX as *mut c_void {
    return None;
  }

  Some(address as usize)
}

/// Grows the program break with `sbrk(2)`.
///
/// Only the padding needed to align the current break is requested on top
/// of each block, so consecutive blocks are address-contiguous. The break is
/// shared with anything else in the process that calls `sbrk` (the system
/// allocator included); a block that follows someone else's growth starts
/// after it instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sbrk;

unsafe impl Source for Sbrk {
  fn map(
    &mut self,
    len: usize,
  ) -> Option<NonNull<u8>> {
    let brk = grow_break(0)?;
    let pad = align_to!(brk, ALIGN) - brk;

    let request = len.checked_add(pad)?;
    let address = grow_break(request)?;

    let start = align_to!(address, ALIGN);
    let end = address + request;

    if start + len > end {
      // The break moved between the two calls. Top up, which only helps if
      // nobody moved it again.
      let extra = grow_break(start + len - end)?;
      if extra != end {
        return None;
      }
    }

    NonNull::new(start as *mut u8)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_mmap_is_aligned_and_writable() {
    let mut source = Mmap;

    let address = source.map(4096).unwrap();

    assert_eq!(address.as_ptr() as usize % ALIGN, 0);

    unsafe {
      ptr::write_bytes(address.as_ptr(), 0xAB, 4096);
      assert_eq!(*address.as_ptr().add(4095), 0xAB);
    }
  }

  #[test]
  fn test_arena_is_contiguous() {
    let mut arena = Arena::new(1024).unwrap();

    let first = arena.map(48).unwrap();
    let second = arena.map(64).unwrap();

    assert_eq!(second.as_ptr() as usize, first.as_ptr() as usize + 48);
    assert_eq!(arena.remaining(), 1024 - 48 - 64);
  }

  #[test]
  fn test_arena_rounds_requests() {
    let mut arena = Arena::new(1024).unwrap();

    let first = arena.map(1).unwrap();
    let second = arena.map(1).unwrap();

    assert_eq!(second.as_ptr() as usize - first.as_ptr() as usize, ALIGN);
    assert_eq!(second.as_ptr() as usize % ALIGN, 0);
  }

  #[test]
  fn test_arena_exhaustion() {
    let mut arena = Arena::new(128).unwrap();

    assert!(arena.map(96).is_some());
    assert!(arena.map(64).is_none());
    assert_eq!(arena.remaining(), 32);
    assert!(arena.map(32).is_some());
    assert!(arena.map(1).is_none());
    assert_eq!(arena.capacity(), 128);
  }

  #[test]
  fn test_arena_rejects_overflowing_request() {
    let mut arena = Arena::new(128).unwrap();

    assert!(arena.map(usize::MAX).is_none());
    assert_eq!(arena.remaining(), 128);
  }
}
