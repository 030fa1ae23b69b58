use std::{
  alloc::{GlobalAlloc, Layout},
  ptr,
};

use parking_lot::{Mutex, const_mutex};

use crate::{
  align::{ALIGN, align_up},
  block::{Block, HEADER_SIZE, Region},
  config::Config,
  error::{AllocError, IntegrityError},
  registry::{Registry, Stats},
  source::{Mmap, Source},
};

/// How a request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
  Reused,
  Mapped { bytes: usize },
}

/// Everything the lock protects.
struct Heap<S> {
  registry: Registry,
  source: S,
  config: Config,
  reclaimed: bool,
}

impl<S: Source> Heap<S> {
  /// `size` must already be rounded and leave room for the header.
  fn grant(
    &mut self,
    size: usize,
  ) -> Result<(Region, Grant), AllocError> {
    unsafe {
      let free_block = self.registry.find_free_block(size, self.config.coalesce);

      if !free_block.is_null() {
        (*free_block).is_free = false;
        self.registry.track(free_block);

        return Ok((Block::region(free_block), Grant::Reused));
      }

      let total_size = HEADER_SIZE + size;

      let address = self
        .source
        .map(total_size)
        .ok_or(AllocError::OutOfMemory { bytes: total_size })?;

      let block = Block::init(address, size);
      self.registry.append(block, total_size);
      self.registry.track(block);

      Ok((Block::region(block), Grant::Mapped { bytes: total_size }))
    }
  }

  unsafe fn reclaim(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      self.registry.untrack(block);
      (*block).is_free = true;
      self.registry.absorb_successors(block, self.config.coalesce);
    }
  }
}

/// Rounds a request to the alignment unit, making sure the header still fits
/// in `usize` afterwards.
fn rounded(size: usize) -> Result<usize, AllocError> {
  if size == 0 {
    return Err(AllocError::ZeroSize);
  }

  let aligned = align_up(size).ok_or(AllocError::InvalidSize { size })?;

  if aligned > usize::MAX - HEADER_SIZE {
    return Err(AllocError::InvalidSize { size });
  }

  Ok(aligned)
}

fn report(
  operation: &str,
  error: AllocError,
) {
  if error != AllocError::ZeroSize {
    log::warn!("{operation}: {error}");
  }
}

/// A first-fit, forward-coalescing allocator over memory from a [`Source`].
///
/// One lock guards both internal lists; every operation is a single critical
/// section apart from [`resize`](Self::resize), which composes a capacity
/// read, an acquire and a release. Memory is never handed back to the
/// source, not even on drop. Dropping the allocator runs
/// [`shutdown`](Self::shutdown).
pub struct Allocator<S: Source = Mmap> {
  heap: Mutex<Heap<S>>,
}

impl Allocator<Mmap> {
  /// An allocator that maps a fresh anonymous region for every block it
  /// cannot satisfy from its free blocks.
  pub const fn new() -> Self {
    Self::with_source(Mmap, Config::new())
  }
}

impl Default for Allocator<Mmap> {
  fn default() -> Self {
    Self::new()
  }
}

impl<S: Source> Allocator<S> {
  pub const fn with_source(
    source: S,
    config: Config,
  ) -> Self {
    Self {
      heap: const_mutex(Heap {
        registry: Registry::new(),
        source,
        config,
        reclaimed: false,
      }),
    }
  }

  pub fn config(&self) -> Config {
    self.heap.lock().config
  }

  /// Allocates at least `size` bytes aligned to [`ALIGN`].
  ///
  /// Null for a zero-byte request, a size too large to describe, or when the
  /// source is out of memory.
  pub fn acquire(
    &self,
    size: usize,
  ) -> *mut u8 {
    match self.try_acquire(size) {
      Ok(region) => region.as_ptr(),
      Err(error) => {
        report("acquire", error);
        ptr::null_mut()
      }
    }
  }

  pub fn try_acquire(
    &self,
    size: usize,
  ) -> Result<Region, AllocError> {
    let (region, grant) = self.grant(size)?;

    if let Grant::Mapped { bytes } = grant {
      log::debug!("mapped {} bytes for a new block at {:p}", bytes, region.as_ptr());
    }
    log::trace!("acquire({}) -> {:p}", size, region.as_ptr());

    Ok(region)
  }

  /// Allocates `count * element_size` zeroed bytes.
  pub fn zero_acquire(
    &self,
    count: usize,
    element_size: usize,
  ) -> *mut u8 {
    match self.try_zero_acquire(count, element_size) {
      Ok(region) => region.as_ptr(),
      Err(error) => {
        report("zero_acquire", error);
        ptr::null_mut()
      }
    }
  }

  pub fn try_zero_acquire(
    &self,
    count: usize,
    element_size: usize,
  ) -> Result<Region, AllocError> {
    let region = self.zeroed(count, element_size)?;

    log::trace!("zero_acquire({}, {}) -> {:p}", count, element_size, region.as_ptr());

    Ok(region)
  }

  /// Grows `ptr` to at least `new_size` bytes, moving it if it has to.
  ///
  /// A null `ptr` behaves like [`acquire`](Self::acquire). A zero `new_size`
  /// releases `ptr` and returns null. On failure `ptr` is left untouched and
  /// still owned by the caller.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this allocator.
  pub unsafe fn resize(
    &self,
    ptr: *mut u8,
    new_size: usize,
  ) -> *mut u8 {
    match unsafe { self.try_resize(Region::from_ptr(ptr), new_size) } {
      Ok(Some(region)) => region.as_ptr(),
      Ok(None) => ptr::null_mut(),
      Err(error) => {
        report("resize", error);
        ptr::null_mut()
      }
    }
  }

  /// # Safety
  ///
  /// `region`, if any, must be live and come from this allocator.
  pub unsafe fn try_resize(
    &self,
    region: Option<Region>,
    new_size: usize,
  ) -> Result<Option<Region>, AllocError> {
    let resized = unsafe { self.regrow(region, new_size)? };

    log::trace!(
      "resize({:?}, {}) -> {:?}",
      region.map(Region::as_ptr),
      new_size,
      resized.map(Region::as_ptr)
    );

    Ok(resized)
  }

  /// Returns `ptr` to the free blocks. Null is ignored.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this allocator. Double
  /// frees are not detected.
  pub unsafe fn release(
    &self,
    ptr: *mut u8,
  ) {
    if let Some(region) = Region::from_ptr(ptr) {
      unsafe { self.release_region(region) };
    }
  }

  /// # Safety
  ///
  /// See [`release`](Self::release).
  pub unsafe fn release_region(
    &self,
    region: Region,
  ) {
    unsafe { self.reclaim(region) };

    log::trace!("release({:p})", region.as_ptr());
  }

  /// Usable bytes behind `region`. May exceed what was asked for.
  ///
  /// # Safety
  ///
  /// `region` must be live and come from this allocator.
  pub unsafe fn capacity(
    &self,
    region: Region,
  ) -> usize {
    let _heap = self.heap.lock();
    unsafe { (*region.header()).size }
  }

  /// Releases every block still on the tracking list and returns how many
  /// there were.
  ///
  /// Only the first call walks the list; later calls return 0. The lock is
  /// taken per step rather than across the walk, since each release takes it
  /// again. The allocator stays usable afterwards.
  pub fn shutdown(&self) -> usize {
    let mut current: *mut Block = {
      let mut heap = self.heap.lock();
      if heap.reclaimed {
        return 0;
      }
      heap.reclaimed = true;
      heap.registry.live_head()
    };

    let mut released = 0;

    while !current.is_null() {
      let (next, in_use) = {
        let _heap = self.heap.lock();
        unsafe { ((*current).next_alloc, !(*current).is_free) }
      };

      if in_use {
        unsafe { self.reclaim(Block::region(current)) };
        released += 1;
      }

      current = next;
    }

    if released > 0 {
      log::debug!("shutdown released {} outstanding blocks", released);
    }

    released
  }

  pub fn stats(&self) -> Stats {
    let heap = self.heap.lock();
    unsafe { heap.registry.stats() }
  }

  /// Checks the structure of both internal lists.
  pub fn verify(&self) -> Result<(), IntegrityError> {
    let heap = self.heap.lock();
    unsafe { heap.registry.verify() }
  }

  // The helpers below never log, so the `GlobalAlloc` path cannot recurse
  // through a logger that allocates.

  fn grant(
    &self,
    size: usize,
  ) -> Result<(Region, Grant), AllocError> {
    let size = rounded(size)?;
    self.heap.lock().grant(size)
  }

  fn zeroed(
    &self,
    count: usize,
    element_size: usize,
  ) -> Result<Region, AllocError> {
    if count == 0 || element_size == 0 {
      return Err(AllocError::ZeroSize);
    }

    let size = count
      .checked_mul(element_size)
      .ok_or(AllocError::CountOverflow { count, element_size })?;

    let (region, _) = self.grant(size)?;
    unsafe { ptr::write_bytes(region.as_ptr(), 0, size) };

    Ok(region)
  }

  unsafe fn regrow(
    &self,
    region: Option<Region>,
    new_size: usize,
  ) -> Result<Option<Region>, AllocError> {
    let Some(region) = region else {
      return self.grant(new_size).map(|(region, _)| Some(region));
    };

    if new_size == 0 {
      unsafe { self.reclaim(region) };
      return Ok(None);
    }

    let capacity = unsafe { self.capacity(region) };

    if capacity >= new_size {
      return Ok(Some(region));
    }

    let (moved, _) = self.grant(new_size)?;

    unsafe {
      ptr::copy_nonoverlapping(region.as_ptr(), moved.as_ptr(), capacity);
      self.reclaim(region);
    }

    Ok(Some(moved))
  }

  unsafe fn reclaim(
    &self,
    region: Region,
  ) {
    let mut heap = self.heap.lock();
    unsafe { heap.reclaim(region.header()) };
  }
}

impl<S: Source> Drop for Allocator<S> {
  fn drop(&mut self) {
    self.shutdown();
  }
}

unsafe impl<S: Source> GlobalAlloc for Allocator<S> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > ALIGN {
      return ptr::null_mut();
    }

    self
      .grant(layout.size())
      .map_or(ptr::null_mut(), |(region, _)| region.as_ptr())
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > ALIGN {
      return ptr::null_mut();
    }

    self
      .zeroed(layout.size(), 1)
      .map_or(ptr::null_mut(), Region::as_ptr)
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    _layout: Layout,
  ) {
    if let Some(region) = Region::from_ptr(ptr) {
      unsafe { self.reclaim(region) };
    }
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    if layout.align() > ALIGN {
      return ptr::null_mut();
    }

    match unsafe { self.regrow(Region::from_ptr(ptr), new_size) } {
      Ok(Some(region)) => region.as_ptr(),
      _ => ptr::null_mut(),
    }
  }
}
