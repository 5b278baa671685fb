//! # listalloc - An Explicit Free-List Heap
//!
//! This crate provides a **free-list allocator** that manages a single
//! growable region, either the process data segment moved with `sbrk(2)` or
//! a pre-mapped arena with a movable boundary.
//!
//! ## Overview
//!
//! Every allocation is a block: a small header followed by the payload. All
//! blocks, used and free, are chained in address order:
//!
//! ```text
//!   Free List:
//!
//!   heap_start                                              top
//!   │                                                        │
//!   ▼                                                        ▼
//!   ┌────┬──────┐   ┌────┬────────────┐   ┌────┬──────┐   ┌────┬──────┐
//!   │ H  │ 8  U │──▶│ H  │ 64  free   │──▶│ H  │ 8  U │──▶│ H  │ 16 U │──▶ null
//!   └────┴──────┘   └────┴────────────┘   └────┴──────┘   └────┴──────┘
//!                                                                      ▲
//!                                                               Heap boundary
//! ```
//!
//! Freed blocks are never merged or returned to the OS. A new request first
//! searches the list for a free block; only when none fits is the heap grown.
//!
//! ## Crate Structure
//!
//! ```text
//!   listalloc
//!   ├── align      - Word alignment (align!, checked_align)
//!   ├── block      - Block header and header/payload conversions
//!   ├── error      - AllocError
//!   ├── heap       - Heap: allocation, splitting, free and reset
//!   ├── provider   - HeapProvider, Sbrk and Arena
//!   └── search     - SearchMode: first, next and best fit
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use listalloc::{Arena, Heap, SearchMode};
//!
//! let arena = Arena::with_capacity(64 * 1024).unwrap();
//! let mut heap = Heap::new(arena, SearchMode::FirstFit);
//!
//! let ptr = heap.allocate(8).unwrap().cast::<u64>();
//!
//! unsafe {
//!     ptr.write(42);
//!     assert_eq!(ptr.read(), 42);
//!
//!     heap.free(ptr.cast());
//! }
//!
//! // first fit finds the freed block before growing the heap
//! assert_eq!(heap.allocate(8).unwrap(), ptr.cast());
//! ```
//!
//! ## Search Modes
//!
//! ```text
//!   request: 16 bytes        free blocks: [64] [16]
//!
//!   FirstFit  ──▶ first free block that fits, from heap_start  ──▶ [64]
//!   NextFit   ──▶ like FirstFit, resuming at the last match     ──▶ depends
//!   BestFit   ──▶ smallest block that fits, exact match wins    ──▶ [16]
//! ```
//!
//! When the chosen block is bigger than needed and the leftover can hold
//! another header, it is split:
//!
//! ```text
//!   Before:  ┌────┬──────────────────────────────────┐
//!            │ H  │ 64 free                          │
//!            └────┴──────────────────────────────────┘
//!
//!   After:   ┌────┬──────────┬────┬──────────────────┐
//!            │ H  │ 16 used  │ H  │ 64-16-H free     │
//!            └────┴──────────┴────┴──────────────────┘
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: a `Heap` is neither `Send` nor `Sync`
//! - **No coalescing**: neighbouring free blocks stay separate
//! - **No shrinking**: memory only goes back to the provider on `reset`
//! - **Word alignment only**: payloads are aligned to `usize`
//! - **Unix-only**: the providers require `libc`
//!
//! ## Safety
//!
//! Payloads are raw memory. Freeing a pointer that was not handed out by the
//! same heap is a contract violation; pointers outside the heap are caught
//! with a panic, anything else is undefined behavior.

pub mod align;
pub mod block;
mod error;
mod heap;
mod provider;
mod search;

pub use block::{Block, HEADER_SIZE};
pub use error::{AllocError, Result};
pub use heap::{BlockInfo, Heap, HeapStats};
pub use provider::{Arena, HeapProvider, Sbrk};
pub use search::{ParseSearchModeError, SearchMode};
