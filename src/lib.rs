//! # mapalloc - A Mapping-Backed Free-List Allocator
//!
//! This crate provides a thread-safe **first-fit free-list allocator** with
//! malloc/calloc/realloc/free equivalents. New memory comes straight from
//! anonymous virtual-memory mappings (or another [`Source`]); freed blocks are
//! kept for reuse and never returned to the operating system.
//!
//! ## Overview
//!
//! ```text
//!   Block Registry (insertion order, used for first fit and coalescing):
//!
//!   head                                                         tail
//!    │                                                             │
//!    ▼                                                             ▼
//!   ┌──────┬─────────┐   ┌──────┬──────┐   ┌──────┬──────────────┐
//!   │header│ payload │──►│header│ free │──►│header│   payload    │──► null
//!   └──────┴─────────┘   └──────┴──────┘   └──────┴──────────────┘
//!      ▲                                      ▲
//!      │        Tracking List (in-use only)   │
//!      └───────────────── live ◄──────────────┘
//! ```
//!
//! - **acquire** scans the registry for the first free block large enough and
//!   hands it out whole (no splitting). If none fits it maps a new block and
//!   appends it at the tail.
//! - **release** marks the block free and folds any free successors into it
//!   (forward coalescing only).
//! - **shutdown** releases whatever is still on the tracking list. Dropping the
//!   allocator calls it.
//!
//! ## Crate Structure
//!
//! ```text
//!   mapalloc
//!   ├── align      - Alignment unit and rounding macros (align!, align_to!)
//!   ├── allocator  - Allocator: the public operations and GlobalAlloc
//!   ├── block      - Block header and the Region handle
//!   ├── config     - Config and coalescing policy
//!   ├── error      - AllocError, IntegrityError
//!   ├── registry   - Block registry and tracking list (internal)
//!   └── source     - Backing memory: Mmap, Arena, Sbrk
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use mapalloc::Allocator;
//!
//! let allocator = Allocator::new();
//!
//! unsafe {
//!     let ptr = allocator.acquire(4 * 10) as *mut i32;
//!     for i in 0..10 {
//!         *ptr.add(i) = i as i32;
//!     }
//!
//!     let ptr = allocator.resize(ptr as *mut u8, 4 * 20) as *mut i32;
//!     assert_eq!(*ptr.add(9), 9);
//!
//!     allocator.release(ptr as *mut u8);
//! }
//!
//! let zeroed = allocator.zero_acquire(100, 4);
//! assert!(!zeroed.is_null());
//!
//! // Anything still outstanding is released here, or when `allocator` drops.
//! assert_eq!(allocator.shutdown(), 1);
//! ```
//!
//! ## Single Allocation
//!
//! ```text
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: N         │  │  ┌──────────────────────────┐  │
//!   │  │ is_free         │  │  │                          │  │
//!   │  │ next            │  │  │     N bytes usable       │  │
//!   │  │ next_alloc      │  │  │                          │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │   multiple of ALIGN   │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Region handed to the caller
//! ```
//!
//! ## Limitations
//!
//! - **No splitting**: a reused block keeps its full capacity.
//! - **Forward coalescing only**, and by default without checking that merged
//!   blocks are address-contiguous; see [`Coalesce`].
//! - **One lock** per allocator; no size classes or thread caches.
//! - **Unix-only**: requires `libc` (`mmap`, `sbrk`).
//!
//! ## Safety
//!
//! Releasing or resizing a pointer that did not come from the same
//! allocator, or releasing one twice, is undefined behaviour and is not
//! detected.

pub mod align;
mod allocator;
mod block;
mod config;
mod error;
mod registry;
mod source;

pub use allocator::Allocator;
pub use block::{HEADER_SIZE, Region};
pub use config::{Coalesce, Config};
pub use error::{AllocError, IntegrityError};
pub use registry::Stats;
pub use source::{Arena, Mmap, Sbrk, Source};
