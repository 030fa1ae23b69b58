use thiserror::Error;

/// Why a request could not be satisfied.
///
/// The pointer-returning operations report every variant as a null result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  /// A zero-byte request. Not a failure, there is simply nothing to hand out.
  #[error("zero-sized request")]
  ZeroSize,
  #[error("invalid size {size}: rounding or header overhead overflows usize")]
  InvalidSize { size: usize },
  #[error("element count overflow: {count} x {element_size}")]
  CountOverflow { count: usize, element_size: usize },
  #[error("backing memory exhausted while mapping {bytes} bytes")]
  OutOfMemory { bytes: usize },
}

/// A structural defect found by [`Allocator::verify`](crate::Allocator::verify).
///
/// Blocks are reported by header address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IntegrityError {
  #[error("{list} list does not terminate within {steps} steps")]
  Cycle { list: &'static str, steps: usize },
  #[error("tail {tail:#x} is not the last registry block {last:#x}")]
  TailMismatch { tail: usize, last: usize },
  #[error("free block {block:#x} is still on the tracking list")]
  TrackedFree { block: usize },
  #[error("in-use block {block:#x} is missing from the tracking list")]
  UntrackedInUse { block: usize },
  #[error("tracked block {block:#x} is not reachable from the registry")]
  StrayTracked { block: usize },
  #[error("tracking list holds {tracked} blocks but the registry has {in_use} in use")]
  LiveCountMismatch { tracked: usize, in_use: usize },
}
