use std::mem;

/// The alignment unit every payload honours: the platform's maximum scalar
/// alignment (`max_align_t`).
pub const ALIGN: usize = mem::align_of::<libc::max_align_t>();

/// Rounds `value` up to the next multiple of `align`, which must be a power
/// of two. Overflows like ordinary arithmetic; use [`align_up`] when the
/// input comes from a caller.
///
/// # Examples
///
/// ```rust
/// use mapalloc::align_to;
///
/// assert_eq!(align_to!(13, 8), 16);
/// assert_eq!(align_to!(4096, 4096), 4096);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Rounds `value` up to the allocator's alignment unit.
///
/// # Examples
///
/// ```rust
/// use mapalloc::{align, align::ALIGN};
///
/// assert_eq!(align!(1), ALIGN);
/// assert_eq!(align!(ALIGN + 1), 2 * ALIGN);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::align::ALIGN)
  };
}

/// Checked form of [`align!`]: `None` when rounding would leave the `usize`
/// range.
pub const fn align_up(value: usize) -> Option<usize> {
  match value.checked_add(ALIGN - 1) {
    Some(padded) => Some(padded & !(ALIGN - 1)),
    None => None,
  }
}
