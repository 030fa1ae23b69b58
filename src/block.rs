use std::{mem, ptr, ptr::NonNull};

/// Metadata stored immediately before every payload handed out.
///
/// The zero-length `max_align_t` array pads the header to a multiple of the
/// alignment unit, so a payload that starts right after it is aligned too.
#[repr(C)]
pub struct Block {
  /// Usable capacity, excluding the header.
  pub size: usize,
  pub is_free: bool,
  /// Registry link, in insertion order.
  pub next: *mut Block,
  /// Tracking-list link. Only meaningful while the block is in use.
  pub next_alloc: *mut Block,
  _align: [libc::max_align_t; 0],
}

pub const HEADER_SIZE: usize = mem::size_of::<Block>();

impl Block {
  pub fn new(size: usize) -> Self {
    Self {
      size,
      is_free: false,
      next: ptr::null_mut(),
      next_alloc: ptr::null_mut(),
      _align: [],
    }
  }

  /// Writes a fresh in-use header at the start of `address`.
  ///
  /// # Safety
  ///
  /// `address` must be writable for `HEADER_SIZE + size` bytes and aligned to
  /// the alignment unit.
  pub unsafe fn init(
    address: NonNull<u8>,
    size: usize,
  ) -> *mut Block {
    let block = address.as_ptr() as *mut Block;
    unsafe { block.write(Block::new(size)) };
    block
  }

  /// The payload that follows `block`.
  ///
  /// # Safety
  ///
  /// `block` must point to a header written by [`Block::init`].
  pub unsafe fn region(block: *mut Block) -> Region {
    unsafe { Region(NonNull::new_unchecked((block as *mut u8).add(HEADER_SIZE))) }
  }

  /// Address one past the end of the payload, as claimed by `size`.
  ///
  /// # Safety
  ///
  /// `block` must point to a live header.
  pub unsafe fn end(block: *const Block) -> usize {
    unsafe { block as usize + HEADER_SIZE + (*block).size }
  }
}

/// Handle to a payload handed out by an [`Allocator`](crate::Allocator).
///
/// Header and payload are adjacent in memory; that adjacency is only ever
/// computed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region(NonNull<u8>);

impl Region {
  /// Wraps a payload pointer. Returns `None` for null.
  ///
  /// Building a `Region` from a pointer that did not come from an allocator
  /// is harmless on its own; passing it back to one is undefined behaviour.
  pub fn from_ptr(ptr: *mut u8) -> Option<Self> {
    NonNull::new(ptr).map(Region)
  }

  pub fn as_ptr(self) -> *mut u8 {
    self.0.as_ptr()
  }

  pub fn as_non_null(self) -> NonNull<u8> {
    self.0
  }

  pub(crate) fn header(self) -> *mut Block {
    self.0.as_ptr().wrapping_sub(HEADER_SIZE) as *mut Block
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::align::ALIGN;

  #[test]
  fn test_header_is_aligned() {
    assert_eq!(HEADER_SIZE % ALIGN, 0);
    assert_eq!(mem::align_of::<Block>(), ALIGN);
  }

  #[test]
  fn test_region_round_trip() {
    let layout = std::alloc::Layout::from_size_align(HEADER_SIZE + 64, ALIGN).unwrap();

    unsafe {
      let address = NonNull::new(std::alloc::alloc(layout)).unwrap();
      let block = Block::init(address, 64);
      let region = Block::region(block);

      assert_eq!(region.as_ptr() as usize, address.as_ptr() as usize + HEADER_SIZE);
      assert_eq!(region.header(), block);
      assert_eq!((*block).size, 64);
      assert!(!(*block).is_free);
      assert!((*block).next.is_null());
      assert!((*block).next_alloc.is_null());
      assert_eq!(Block::end(block), address.as_ptr() as usize + HEADER_SIZE + 64);

      std::alloc::dealloc(address.as_ptr(), layout);
    }
  }

  #[test]
  fn test_region_from_null() {
    assert!(Region::from_ptr(ptr::null_mut()).is_none());
  }
}
