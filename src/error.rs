use thiserror::Error;

/// Errors surfaced by [`Heap::allocate`](crate::Heap::allocate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  /// The provider could not grow the heap by `requested` bytes.
  #[error("out of memory (requested: {requested} bytes)")]
  OutOfMemory { requested: usize },
}

pub type Result<T> = core::result::Result<T, AllocError>;
