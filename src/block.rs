use core::{fmt, marker::PhantomData, mem, ptr::NonNull};

use static_assertions::const_assert_eq;

use crate::{align, align::WORD_SIZE};

/// Header stored in front of every payload handed out by the heap.
///
/// ```text
///   ┌──────────────────────┬──────────────────────────────┐
///   │ size | used | next   │        payload (size)        │
///   └──────────────────────┴──────────────────────────────┘
///   ▲                      ▲
///   header_of(payload)     payload_of(header)
/// ```
#[repr(C)]
pub struct Block {
  pub(crate) size: usize,
  pub(crate) used: bool,
  pub(crate) next: Option<NonNull<Block>>,
}

/// Bytes occupied by a [`Block`] header, excluding the payload.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

// payloads are only word aligned if the header is
const_assert_eq!(HEADER_SIZE % WORD_SIZE, 0);

impl Block {
  pub fn new(
    size: usize,
    used: bool,
    next: Option<NonNull<Block>>,
  ) -> Self {
    Self { size, used, next }
  }

  /// Usable payload bytes.
  pub fn size(&self) -> usize {
    self.size
  }

  pub fn is_used(&self) -> bool {
    self.used
  }

  pub fn next(&self) -> Option<NonNull<Block>> {
    self.next
  }
}

impl fmt::Debug for Block {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Block")
      .field("size", &self.size)
      .field("used", &self.used)
      .field("next", &self.next.map(NonNull::as_ptr))
      .finish()
  }
}

/// Bytes to request from the provider for a block with `payload` usable bytes.
pub fn total_size_for(payload: usize) -> usize {
  HEADER_SIZE + align!(payload)
}

/// Payload address of the block whose header starts at `header`.
///
/// # Safety
///
/// `header` must point to a block header inside a provider region, which is
/// always followed by its payload.
pub unsafe fn payload_of(header: NonNull<Block>) -> NonNull<u8> {
  unsafe { header.cast::<u8>().add(HEADER_SIZE) }
}

/// Header of the block owning `payload`. Inverse of [`payload_of`].
///
/// # Safety
///
/// `payload` must have been returned by [`payload_of`], i.e. it must point
/// exactly `HEADER_SIZE` bytes past a block header.
pub unsafe fn header_of(payload: NonNull<u8>) -> NonNull<Block> {
  unsafe { payload.sub(HEADER_SIZE).cast::<Block>() }
}

/// Writes a fresh header at `at`.
///
/// # Safety
///
/// `at` must be word aligned and valid for writes of `HEADER_SIZE` bytes.
pub(crate) unsafe fn write_header(
  at: NonNull<u8>,
  block: Block,
) -> NonNull<Block> {
  let header = at.cast::<Block>();
  unsafe { header.as_ptr().write(block) };
  header
}

/// Walks a block list following `next` links.
pub(crate) struct Blocks<'a> {
  current: Option<NonNull<Block>>,
  _list: PhantomData<&'a Block>,
}

impl<'a> Blocks<'a> {
  /// # Safety
  ///
  /// Every block reachable from `start` must hold an initialized header for
  /// the lifetime `'a`.
  pub(crate) unsafe fn starting_at(start: Option<NonNull<Block>>) -> Self {
    Self {
      current: start,
      _list: PhantomData,
    }
  }
}

impl<'a> Iterator for Blocks<'a> {
  type Item = NonNull<Block>;

  fn next(&mut self) -> Option<Self::Item> {
    let block = self.current?;
    // SAFETY: guaranteed by the caller of `Blocks::starting_at`.
    self.current = unsafe { block.as_ref() }.next;
    Some(block)
  }
}
