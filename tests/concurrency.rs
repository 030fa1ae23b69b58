use std::{ptr, slice, thread};

use mapalloc::{Allocator, Arena, Coalesce, Config, Mmap, Source, align::ALIGN};

const THREADS: usize = 8;
const ALLOCS_PER_THREAD: usize = 50;
const ROUNDS: usize = 20;

/// Allocates varying sizes, stamps each block with the thread id, checks the
/// stamps survived everyone else's traffic, then frees evens before odds.
///
/// `stamp_len` caps how much of each block is written.
fn churn<S: Source>(
  allocator: &Allocator<S>,
  thread_id: u8,
  stamp_len: impl Fn(usize) -> usize,
) {
  let mut allocations = [ptr::null_mut::<u8>(); ALLOCS_PER_THREAD];

  for _ in 0..ROUNDS {
    for (i, slot) in allocations.iter_mut().enumerate() {
      let size = (i + 1) * 16;
      let address = allocator.acquire(size);
      assert!(!address.is_null(), "thread {thread_id}: allocation {i} failed");

      unsafe { ptr::write_bytes(address, thread_id, stamp_len(size)) };
      *slot = address;
    }

    for (i, &address) in allocations.iter().enumerate() {
      let bytes = unsafe { slice::from_raw_parts(address, stamp_len((i + 1) * 16)) };
      assert!(bytes.iter().all(|&byte| byte == thread_id));
    }

    for &address in allocations.iter().step_by(2) {
      unsafe { allocator.release(address) };
    }
    for &address in allocations.iter().skip(1).step_by(2) {
      unsafe { allocator.release(address) };
    }
  }
}

fn run_churn<S: Source + Send>(
  allocator: &Allocator<S>,
  stamp_len: fn(usize) -> usize,
) {
  thread::scope(|scope| {
    for thread_id in 1..=THREADS as u8 {
      scope.spawn(move || churn(allocator, thread_id, stamp_len));
    }
  });

  assert_eq!(allocator.verify(), Ok(()));

  let stats = allocator.stats();
  assert_eq!(stats.live, 0);
  assert_eq!(stats.free_blocks, stats.blocks);
}

#[test]
fn test_concurrent_churn_on_arena() {
  let allocator = Allocator::with_source(Arena::new(64 << 20).unwrap(), Config::new());

  run_churn(&allocator, |size| size);
}

#[test]
fn test_concurrent_churn_contiguous_mmap() {
  let allocator = Allocator::with_source(Mmap, Config::new().coalesce(Coalesce::Contiguous));

  run_churn(&allocator, |size| size);
}

#[test]
fn test_concurrent_churn_list_order_mmap() {
  // List-order merging can span separate mappings, so only the part of each
  // block its own mapping is guaranteed to hold gets written.
  let allocator = Allocator::new();

  run_churn(&allocator, |size| size.min(ALIGN));
}

#[repr(C)]
struct Node {
  value: i32,
  left: *mut Node,
  right: *mut Node,
  padding: [u8; 32],
}

fn allocate_tree<S: Source>(
  allocator: &Allocator<S>,
  depth: u32,
  start_value: i32,
) -> *mut Node {
  if depth == 0 {
    return ptr::null_mut();
  }

  let node = allocator.acquire(std::mem::size_of::<Node>()) as *mut Node;
  assert!(!node.is_null());

  unsafe {
    node.write(Node {
      value: start_value,
      left: allocate_tree(allocator, depth - 1, start_value * 2),
      right: allocate_tree(allocator, depth - 1, start_value * 2 + 1),
      padding: [0xAB; 32],
    });
  }

  node
}

unsafe fn sum_tree(node: *const Node) -> i64 {
  if node.is_null() {
    return 0;
  }

  unsafe {
    assert!((*node).padding.iter().all(|&byte| byte == 0xAB));
    (*node).value as i64 + sum_tree((*node).left) + sum_tree((*node).right)
  }
}

#[test]
fn test_concurrent_trees_are_reclaimed_at_shutdown() {
  const DEPTH: u32 = 6;
  const NODES: usize = (1 << DEPTH) - 1;

  let allocator = Allocator::with_source(Arena::new(16 << 20).unwrap(), Config::new());

  thread::scope(|scope| {
    for thread_id in 1..=4 {
      let allocator = &allocator;
      scope.spawn(move || {
        let root = allocate_tree(allocator, DEPTH, thread_id * 1000);
        let expected = allocate_tree_sum(DEPTH, thread_id as i64 * 1000);
        assert_eq!(unsafe { sum_tree(root) }, expected);
      });
    }
  });

  assert_eq!(allocator.stats().live, 4 * NODES);
  assert_eq!(allocator.verify(), Ok(()));

  assert_eq!(allocator.shutdown(), 4 * NODES);
  assert_eq!(allocator.stats().live, 0);
  assert_eq!(allocator.verify(), Ok(()));
}

/// Sum of the values `allocate_tree` assigns, computed without allocating.
fn allocate_tree_sum(
  depth: u32,
  start_value: i64,
) -> i64 {
  if depth == 0 {
    return 0;
  }
  start_value + allocate_tree_sum(depth - 1, start_value * 2) + allocate_tree_sum(depth - 1, start_value * 2 + 1)
}

#[test]
fn test_concurrent_resize_and_zero_acquire() {
  let allocator = Allocator::with_source(Arena::new(32 << 20).unwrap(), Config::new());

  thread::scope(|scope| {
    for thread_id in 1..=4u8 {
      let allocator = &allocator;
      scope.spawn(move || {
        for round in 1..=50usize {
          let zeroed = allocator.zero_acquire(round, 8);
          let bytes = unsafe { slice::from_raw_parts(zeroed, round * 8) };
          assert!(bytes.iter().all(|&byte| byte == 0));

          unsafe {
            ptr::write_bytes(zeroed, thread_id, round * 8);

            let grown = allocator.resize(zeroed, round * 8 + 100);
            assert!(!grown.is_null());

            let bytes = slice::from_raw_parts(grown, round * 8);
            assert!(bytes.iter().all(|&byte| byte == thread_id));

            allocator.release(grown);
          }
        }
      });
    }
  });

  assert_eq!(allocator.stats().live, 0);
  assert_eq!(allocator.verify(), Ok(()));
}
