//! Sources of raw heap memory.
//!
//! A provider hands out one contiguous region that only ever grows at its
//! top, mirroring the classic program break.

use core::{marker::PhantomData, ptr::{self, NonNull}};

use libc::{
  MAP_ANONYMOUS, MAP_FAILED, MAP_NORESERVE, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, intptr_t, sbrk,
};
use log::{debug, error};

use crate::{align, error::{AllocError, Result}};

/// Grows and shrinks the region backing a [`Heap`](crate::Heap).
pub trait HeapProvider {
  /// Current top of the managed region.
  fn current_boundary(&self) -> *mut u8;

  /// Grows the region by `bytes` and returns the boundary as it was before
  /// the call, i.e. the start of the new space. On failure nothing changes.
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>>;

  /// Moves the boundary back to `to`.
  ///
  /// # Safety
  ///
  /// `to` must be a boundary previously observed on this provider, and no
  /// memory above it may be used afterwards.
  unsafe fn reset(
    &mut self,
    to: *mut u8,
  );
}

/// The process data segment, moved with `sbrk(2)` / `brk(2)`.
pub struct Sbrk {
  _not_send: PhantomData<*mut u8>,
}

impl Sbrk {
  /// Takes over the program break, padding it to word alignment first.
  ///
  /// # Safety
  ///
  /// Nothing else may move the program break while this provider is in use.
  /// Note that the system `malloc` may do so on the main thread.
  pub unsafe fn new() -> Self {
    unsafe {
      let current = sbrk(0) as usize;
      let padding = align!(current) - current;
      if padding != 0 {
        sbrk(padding as intptr_t);
      }
    }

    Self {
      _not_send: PhantomData,
    }
  }
}

impl HeapProvider for Sbrk {
  fn current_boundary(&self) -> *mut u8 {
    unsafe { sbrk(0) as *mut u8 }
  }

  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>> {
    let out_of_memory = AllocError::OutOfMemory { requested: bytes };

    let Ok(increment) = intptr_t::try_from(bytes) else {
      return Err(out_of_memory);
    };

    let address = unsafe { sbrk(increment) };

    if address == usize::MAX as *mut c_void {
      return Err(out_of_memory);
    }

    debug!(
      "Extended program break by {} bytes, new break = {:?}",
      bytes,
      self.current_boundary()
    );

    NonNull::new(address as *mut u8).ok_or(out_of_memory)
  }

  unsafe fn reset(
    &mut self,
    to: *mut u8,
  ) {
    debug!("Resetting program break to {:?}", to);

    if unsafe { libc::brk(to as *mut c_void) } != 0 {
      error!("Could not move program break back to {:?}", to);
    }
  }
}

/// A private anonymous mapping with a movable boundary.
///
/// The whole capacity is reserved up front (without committing swap), which
/// makes the arena usable where no break-style primitive exists and gives
/// every [`Heap`](crate::Heap) its own isolated region.
pub struct Arena {
  base: NonNull<u8>,
  capacity: usize,
  top: usize,
}

impl Arena {
  /// Maps an arena of at least `capacity` bytes, rounded up to whole pages.
  pub fn with_capacity(capacity: usize) -> Result<Self> {
    let page_size = page_size::get();
    let out_of_memory = AllocError::OutOfMemory { requested: capacity };

    let capacity = capacity
      .max(1)
      .checked_next_multiple_of(page_size)
      .ok_or(out_of_memory)?;

    let address = unsafe {
      libc::mmap(
        ptr::null_mut(),
        capacity,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS | MAP_NORESERVE,
        -1,
        0,
      )
    };

    if address == MAP_FAILED {
      error!("Could not map arena of {} bytes", capacity);
      return Err(out_of_memory);
    }

    debug!("Mapped arena of {} bytes at {:?}", capacity, address);

    let base = NonNull::new(address as *mut u8).ok_or(out_of_memory)?;

    Ok(Self {
      base,
      capacity,
      top: 0,
    })
  }

  /// Total bytes the arena can hand out.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes between the boundary and the end of the mapping.
  pub fn remaining(&self) -> usize {
    self.capacity - self.top
  }

  pub fn base(&self) -> NonNull<u8> {
    self.base
  }
}

impl HeapProvider for Arena {
  fn current_boundary(&self) -> *mut u8 {
    self.base.as_ptr().wrapping_add(self.top)
  }

  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>> {
    if bytes > self.remaining() {
      debug!(
        "Arena exhausted: requested {} bytes, {} remaining",
        bytes,
        self.remaining()
      );
      return Err(AllocError::OutOfMemory { requested: bytes });
    }

    // SAFETY: `top <= capacity`, so the offset stays inside the mapping.
    let previous = unsafe { self.base.add(self.top) };
    self.top += bytes;

    Ok(previous)
  }

  unsafe fn reset(
    &mut self,
    to: *mut u8,
  ) {
    let offset = (to as usize).wrapping_sub(self.base.as_ptr() as usize);
    debug_assert!(offset <= self.top, "arena reset above its boundary");

    debug!("Resetting arena boundary from {} to {}", self.top, offset);
    self.top = offset.min(self.top);
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    let code = unsafe { libc::munmap(self.base.as_ptr() as *mut c_void, self.capacity) };

    if code != 0 {
      error!("Could not unmap arena at {:?}", self.base);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_extend_returns_previous_boundary() {
    let mut arena = Arena::with_capacity(4096).unwrap();
    let start = arena.current_boundary();

    let first = arena.extend(64).unwrap();
    assert_eq!(first.as_ptr(), start);
    assert_eq!(arena.current_boundary(), start.wrapping_add(64));

    let second = arena.extend(32).unwrap();
    assert_eq!(second.as_ptr(), start.wrapping_add(64));
    assert_eq!(arena.remaining(), arena.capacity() - 96);
  }

  #[test]
  fn test_arena_capacity_rounds_to_pages() {
    let arena = Arena::with_capacity(1).unwrap();
    assert_eq!(arena.capacity(), page_size::get());
    assert_eq!(arena.base().as_ptr() as usize % page_size::get(), 0);
  }

  #[test]
  fn test_arena_out_of_memory_leaves_boundary() {
    let mut arena = Arena::with_capacity(page_size::get()).unwrap();
    let capacity = arena.capacity();

    arena.extend(capacity - 8).unwrap();
    let boundary = arena.current_boundary();

    assert_eq!(
      arena.extend(16),
      Err(AllocError::OutOfMemory { requested: 16 })
    );
    assert_eq!(arena.current_boundary(), boundary);

    assert!(arena.extend(8).is_ok());
    assert_eq!(arena.remaining(), 0);
  }

  #[test]
  fn test_arena_reset() {
    let mut arena = Arena::with_capacity(4096).unwrap();
    let start = arena.current_boundary();

    arena.extend(128).unwrap();
    unsafe { arena.reset(start) };

    assert_eq!(arena.current_boundary(), start);
    assert_eq!(arena.extend(16).unwrap().as_ptr(), start);
  }

  #[test]
  #[ignore = "moves the real program break"]
  fn test_sbrk_extend() {
    let mut provider = unsafe { Sbrk::new() };
    let start = provider.current_boundary();
    assert_eq!(start as usize % crate::align::WORD_SIZE, 0);

    let address = provider.extend(64).unwrap();
    assert_eq!(address.as_ptr(), start);
    assert!(provider.current_boundary() >= start.wrapping_add(64));

    unsafe { provider.reset(start) };
    assert_eq!(provider.current_boundary(), start);
  }
}
