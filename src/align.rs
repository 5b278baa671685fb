use core::mem;

/// Size of a machine word, the granularity of every block size.
pub const WORD_SIZE: usize = mem::size_of::<usize>();

/// Calculates the machine word alignment for the given size.
///
/// # Examples
///
/// ```rust
/// use listalloc::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// assert_eq!(align!(0), 0);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    (($value) + $crate::align::WORD_SIZE - 1) & !($crate::align::WORD_SIZE - 1)
  };
}

/// Same as [`align!`], but returns `None` instead of wrapping when `n` is
/// within one word of `usize::MAX`.
pub const fn checked_align(n: usize) -> Option<usize> {
  match n.checked_add(WORD_SIZE - 1) {
    Some(padded) => Some(padded & !(WORD_SIZE - 1)),
    None => None,
  }
}

pub const fn is_aligned(n: usize) -> bool {
  n & (WORD_SIZE - 1) == 0
}
