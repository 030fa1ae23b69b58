/// When two free blocks that follow each other in the registry are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coalesce {
  /// Merge any free successor in registry order. Blocks from separate
  /// mappings are not checked for address contiguity, so a merged block may
  /// claim capacity it does not own contiguously unless the source hands out
  /// contiguous memory. [`Arena`](crate::Arena) always does;
  /// [`Sbrk`](crate::Sbrk) does as long as nothing else moves the break.
  #[default]
  ListOrder,
  /// Merge a free successor only when its header starts exactly where the
  /// current payload ends.
  Contiguous,
}

/// Construction-time settings for an [`Allocator`](crate::Allocator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
  pub coalesce: Coalesce,
}

impl Config {
  pub const fn new() -> Self {
    Self {
      coalesce: Coalesce::ListOrder,
    }
  }

  pub const fn coalesce(
    mut self,
    coalesce: Coalesce,
  ) -> Self {
    self.coalesce = coalesce;
    self
  }
}
