use std::{fmt::Write, ptr::NonNull};

use log::{debug, trace, warn};

use crate::{
  align::{checked_align, is_aligned},
  block::{self, Block, Blocks, HEADER_SIZE},
  error::{AllocError, Result},
  provider::HeapProvider,
  search::SearchMode,
};

/// Snapshot of one block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Address of the header.
  pub address: usize,
  pub size: usize,
  pub used: bool,
}

/// Aggregate view of a heap, see [`Heap::stats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
  pub blocks: usize,
  pub used_blocks: usize,
  /// Payload bytes currently handed out.
  pub used_bytes: usize,
  /// Payload bytes sitting in free blocks.
  pub free_bytes: usize,
  /// Everything obtained from the provider, headers included.
  pub heap_bytes: usize,
}

/// An explicit free-list heap on top of a [`HeapProvider`].
///
/// Blocks are kept in a singly linked list in address order. Freed blocks
/// stay in the list and are handed out again by the active [`SearchMode`],
/// split when they are large enough to hold another header.
pub struct Heap<P: HeapProvider> {
  provider: P,
  mode: SearchMode,
  start: Option<NonNull<Block>>,
  top: Option<NonNull<Block>>,
  search_start: Option<NonNull<Block>>,
}

impl<P: HeapProvider> Heap<P> {
  pub fn new(
    provider: P,
    mode: SearchMode,
  ) -> Self {
    Self {
      provider,
      mode,
      start: None,
      top: None,
      search_start: None,
    }
  }

  /// Switches to `mode` and resets the heap, the only way to change the
  /// search policy of a heap session.
  pub fn init(
    &mut self,
    mode: SearchMode,
  ) {
    self.mode = mode;
    self.reset();
  }

  /// Gives every block back to the provider, returning its boundary to the
  /// position it had before the first allocation.
  ///
  /// Every payload handed out before becomes dangling.
  pub fn reset(&mut self) {
    let Some(start) = self.start else {
      return;
    };

    debug!("Resetting heap starting at {:?}", start);

    // SAFETY: `start` is the boundary observed right before the first block
    // was carved, and all blocks are forgotten below.
    unsafe { self.provider.reset(start.as_ptr() as *mut u8) };

    self.start = None;
    self.top = None;
    self.search_start = None;
  }

  /// Allocates at least `size` bytes and returns the word aligned payload.
  ///
  /// A request of zero bytes yields a valid block with an empty payload.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let aligned = checked_align(size).ok_or(AllocError::OutOfMemory { requested: size })?;

    trace!("Allocate {} bytes ({} aligned) using {}", size, aligned, self.mode);

    // SAFETY: the list only contains headers this heap wrote, and the cursor
    // is either unset or one of them.
    let found = unsafe { self.mode.find(self.start, &mut self.search_start, aligned) };

    let block = match found {
      Some(block) => {
        unsafe { self.reuse(block, aligned) };
        block
      }
      None => self.grow(aligned)?,
    };

    // SAFETY: `block` is a header inside the provider region.
    Ok(unsafe { block::payload_of(block) })
  }

  /// Marks the block owning `payload` as free. Blocks are never merged.
  ///
  /// Freeing a block twice is harmless and only logged.
  ///
  /// # Panics
  ///
  /// If `payload` lies outside this heap or is not word aligned.
  ///
  /// # Safety
  ///
  /// `payload` must have been returned by [`Heap::allocate`] on this heap
  /// since the last reset.
  pub unsafe fn free(
    &mut self,
    payload: NonNull<u8>,
  ) {
    let mut header = self.checked_header(payload);
    let block = unsafe { header.as_mut() };

    if !block.used {
      warn!("Freeing already free block at {:?}", header);
    }

    trace!("Free {} bytes at {:?}", block.size, payload);
    block.used = false;
  }

  /// Reads the header of the block owning `payload`.
  ///
  /// # Panics
  ///
  /// If `payload` lies outside this heap or is not word aligned.
  ///
  /// # Safety
  ///
  /// Same contract as [`Heap::free`].
  pub unsafe fn block_info(
    &self,
    payload: NonNull<u8>,
  ) -> BlockInfo {
    let header = self.checked_header(payload);
    info(header)
  }

  /// First block ever carved from the provider, `None` until the first
  /// allocation after construction or a reset.
  pub fn heap_start(&self) -> Option<NonNull<Block>> {
    self.start
  }

  /// Most recently appended block.
  pub fn top(&self) -> Option<NonNull<Block>> {
    self.top
  }

  /// Block the next next-fit search resumes from.
  pub fn search_start(&self) -> Option<NonNull<Block>> {
    self.search_start
  }

  pub fn mode(&self) -> SearchMode {
    self.mode
  }

  pub fn provider(&self) -> &P {
    &self.provider
  }

  /// Blocks in list order, which is also address order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    // SAFETY: the list only contains headers this heap wrote, and they live
    // until the next reset, which needs `&mut self`.
    unsafe { Blocks::starting_at(self.start) }.map(info)
  }

  pub fn stats(&self) -> HeapStats {
    self.blocks().fold(HeapStats::default(), |mut stats, block| {
      stats.blocks += 1;
      stats.heap_bytes += HEADER_SIZE + block.size;

      if block.used {
        stats.used_blocks += 1;
        stats.used_bytes += block.size;
      } else {
        stats.free_bytes += block.size;
      }

      stats
    })
  }

  /// Renders the list as `[[size, used], ...]`, e.g. `[[8, 1], [64, 0]]`.
  pub fn dump(&self) -> String {
    let mut out = String::from("[");

    for (i, block) in self.blocks().enumerate() {
      if i > 0 {
        out.push_str(", ");
      }
      let _ = write!(out, "[{}, {}]", block.size, u8::from(block.used));
    }
    out.push(']');

    debug!("Heap ({}): {}", self.mode, out);
    out
  }

  /// Hands out a free block found by the search, splitting off the tail
  /// when it can hold another header.
  ///
  /// # Safety
  ///
  /// `block` must be a free block of this heap with `size >= aligned`.
  unsafe fn reuse(
    &mut self,
    mut block: NonNull<Block>,
    aligned: usize,
  ) {
    let header = unsafe { block.as_mut() };
    debug_assert!(!header.used && header.size >= aligned);

    let remainder = header.size - aligned;

    if header.size > aligned && remainder >= HEADER_SIZE {
      // SAFETY: the new header lies within the payload of `block`.
      let split = unsafe {
        let at = block::payload_of(block).add(aligned);
        block::write_header(at, Block::new(remainder - HEADER_SIZE, false, header.next))
      };

      trace!(
        "Split {} byte block at {:?} into {} + {} bytes",
        header.size,
        block,
        aligned,
        remainder - HEADER_SIZE
      );

      header.next = Some(split);
      header.size = aligned;

      if self.top == Some(block) {
        self.top = Some(split);
      }
    }

    header.used = true;
  }

  /// Carves a new block for `aligned` payload bytes from the provider and
  /// appends it to the list.
  fn grow(
    &mut self,
    aligned: usize,
  ) -> Result<NonNull<Block>> {
    let total = HEADER_SIZE
      .checked_add(aligned)
      .ok_or(AllocError::OutOfMemory { requested: aligned })?;

    let address = self.provider.extend(total)?;
    debug_assert!(is_aligned(address.as_ptr() as usize));

    // SAFETY: the provider just handed out `total` bytes at `address`.
    let block = unsafe { block::write_header(address, Block::new(aligned, true, None)) };

    match self.top {
      // SAFETY: `top` is the tail header of this heap.
      Some(mut top) => unsafe { top.as_mut().next = Some(block) },
      None => {
        debug!("Heap starts at {:?}", block);
        self.start = Some(block);
        self.search_start = Some(block);
      }
    }
    self.top = Some(block);

    Ok(block)
  }

  fn checked_header(
    &self,
    payload: NonNull<u8>,
  ) -> NonNull<Block> {
    let address = payload.as_ptr() as usize;
    let lowest = self.start.map(|start| start.as_ptr() as usize + HEADER_SIZE);
    let boundary = self.provider.current_boundary() as usize;

    assert!(
      lowest.is_some_and(|lowest| lowest <= address && address <= boundary),
      "pointer {:?} was not allocated by this heap",
      payload
    );
    assert!(is_aligned(address), "pointer {:?} is not word aligned", payload);

    // SAFETY: in range and aligned; the caller promises it is a payload.
    unsafe { block::header_of(payload) }
  }
}

fn info(block: NonNull<Block>) -> BlockInfo {
  let header = unsafe { block.as_ref() };

  BlockInfo {
    address: block.as_ptr() as usize,
    size: header.size,
    used: header.used,
  }
}
