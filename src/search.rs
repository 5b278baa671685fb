use core::{fmt, ptr::NonNull, str::FromStr};

use log::trace;
use thiserror::Error;

use crate::block::{Block, Blocks};

/// Policy used to pick a free block for a new allocation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchMode {
  /// First free block that fits, scanning from the start of the heap.
  #[default]
  FirstFit,
  /// Like first fit, but resumes scanning from the previously found block
  /// and wraps around once.
  NextFit,
  /// Smallest free block that fits; an exact match ends the scan early.
  BestFit,
}

impl fmt::Display for SearchMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.write_str(match self {
      SearchMode::FirstFit => "first-fit",
      SearchMode::NextFit => "next-fit",
      SearchMode::BestFit => "best-fit",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown search mode `{0}` (expected first-fit, next-fit or best-fit)")]
pub struct ParseSearchModeError(String);

impl FromStr for SearchMode {
  type Err = ParseSearchModeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");

    match normalized.as_str() {
      "first" | "first-fit" | "firstfit" => Ok(SearchMode::FirstFit),
      "next" | "next-fit" | "nextfit" => Ok(SearchMode::NextFit),
      "best" | "best-fit" | "bestfit" => Ok(SearchMode::BestFit),
      _ => Err(ParseSearchModeError(s.to_owned())),
    }
  }
}

fn fits(
  block: NonNull<Block>,
  size: usize,
) -> bool {
  let block = unsafe { block.as_ref() };
  !block.used && block.size >= size
}

/// # Safety
///
/// Every block reachable from `start` must hold an initialized header.
pub(crate) unsafe fn first_fit(
  start: Option<NonNull<Block>>,
  size: usize,
) -> Option<NonNull<Block>> {
  unsafe { Blocks::starting_at(start) }.find(|&block| fits(block, size))
}

/// Scans `[cursor, tail]`, then `[start, cursor)`. Moves `cursor` onto the
/// block found.
///
/// # Safety
///
/// Every block reachable from `start` must hold an initialized header and
/// `cursor`, if set, must be one of them.
pub(crate) unsafe fn next_fit(
  start: Option<NonNull<Block>>,
  cursor: &mut Option<NonNull<Block>>,
  size: usize,
) -> Option<NonNull<Block>> {
  let resume = cursor.or(start);

  let found = unsafe { Blocks::starting_at(resume) }
    .find(|&block| fits(block, size))
    .or_else(|| {
      trace!("next fit: wrapping around to the heap start");
      unsafe { Blocks::starting_at(start) }
        .take_while(|&block| Some(block) != resume)
        .find(|&block| fits(block, size))
    });

  if found.is_some() {
    *cursor = found;
  }

  found
}

/// # Safety
///
/// Every block reachable from `start` must hold an initialized header.
pub(crate) unsafe fn best_fit(
  start: Option<NonNull<Block>>,
  size: usize,
) -> Option<NonNull<Block>> {
  let mut best: Option<NonNull<Block>> = None;

  for block in unsafe { Blocks::starting_at(start) } {
    if !fits(block, size) {
      continue;
    }

    let candidate = unsafe { block.as_ref() }.size;
    if candidate == size {
      trace!("best fit: exact match of {} bytes", size);
      return Some(block);
    }

    // strict comparison keeps the lowest address on ties
    if best.is_none_or(|best| candidate < unsafe { best.as_ref() }.size) {
      best = Some(block);
    }
  }

  best
}

impl SearchMode {
  /// Finds a free block of at least `size` bytes under this policy.
  ///
  /// # Safety
  ///
  /// Every block reachable from `start` must hold an initialized header and
  /// `cursor`, if set, must be one of them.
  pub(crate) unsafe fn find(
    self,
    start: Option<NonNull<Block>>,
    cursor: &mut Option<NonNull<Block>>,
    size: usize,
  ) -> Option<NonNull<Block>> {
    let found = unsafe {
      match self {
        SearchMode::FirstFit => first_fit(start, size),
        SearchMode::NextFit => next_fit(start, cursor, size),
        SearchMode::BestFit => best_fit(start, size),
      }
    };

    trace!("{}: search for {} bytes found {:?}", self, size, found);
    found
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::{HEADER_SIZE, write_header};

  /// Lays out blocks of the given `(size, used)` back to back in `storage`.
  fn build_list(
    storage: &mut [usize],
    blocks: &[(usize, bool)],
  ) -> Vec<NonNull<Block>> {
    let base = NonNull::new(storage.as_mut_ptr() as *mut u8).unwrap();
    let mut offsets = Vec::new();
    let mut offset = 0;

    for &(size, _) in blocks {
      offsets.push(offset);
      offset += HEADER_SIZE + size;
    }
    assert!(offset <= storage.len() * size_of::<usize>());

    let mut next = None;
    let mut headers = Vec::new();
    for (&(size, used), &offset) in blocks.iter().zip(&offsets).rev() {
      let header = unsafe { write_header(base.add(offset), Block::new(size, used, next)) };
      headers.push(header);
      next = Some(header);
    }
    headers.reverse();
    headers
  }

  #[test]
  fn test_first_fit_prefers_low_addresses() {
    let mut storage = [0usize; 64];
    let list = build_list(&mut storage, &[(8, true), (16, false), (32, false), (16, false)]);

    unsafe {
      assert_eq!(first_fit(Some(list[0]), 16), Some(list[1]));
      assert_eq!(first_fit(Some(list[0]), 24), Some(list[2]));
      assert_eq!(first_fit(Some(list[0]), 8), Some(list[1]));
      assert_eq!(first_fit(Some(list[0]), 64), None);
      assert_eq!(first_fit(None, 8), None);
    }
  }

  #[test]
  fn test_next_fit_resumes_from_cursor() {
    let mut storage = [0usize; 64];
    let list = build_list(&mut storage, &[(16, false), (8, true), (16, false), (8, true)]);
    let mut cursor = Some(list[1]);

    unsafe {
      assert_eq!(next_fit(Some(list[0]), &mut cursor, 16), Some(list[2]));
      assert_eq!(cursor, Some(list[2]));

      // the found block stays the cursor, so it is found again while free
      assert_eq!(next_fit(Some(list[0]), &mut cursor, 16), Some(list[2]));
    }
  }

  #[test]
  fn test_next_fit_wraps_around() {
    let mut storage = [0usize; 64];
    let list = build_list(&mut storage, &[(16, false), (8, true), (16, true), (8, false)]);
    let mut cursor = Some(list[2]);

    unsafe {
      assert_eq!(next_fit(Some(list[0]), &mut cursor, 16), Some(list[0]));
      assert_eq!(cursor, Some(list[0]));
    }
  }

  #[test]
  fn test_next_fit_miss_keeps_cursor() {
    let mut storage = [0usize; 64];
    let list = build_list(&mut storage, &[(16, false), (8, true), (16, true)]);
    let mut cursor = Some(list[1]);

    unsafe {
      assert_eq!(next_fit(Some(list[0]), &mut cursor, 32), None);
      assert_eq!(cursor, Some(list[1]));
    }
  }

  #[test]
  fn test_next_fit_without_cursor_starts_at_head() {
    let mut storage = [0usize; 64];
    let list = build_list(&mut storage, &[(8, true), (16, false)]);
    let mut cursor = None;

    unsafe {
      assert_eq!(next_fit(Some(list[0]), &mut cursor, 8), Some(list[1]));
      assert_eq!(cursor, Some(list[1]));
    }
  }

  #[test]
  fn test_best_fit_picks_smallest() {
    let mut storage = [0usize; 96];
    let list = build_list(
      &mut storage,
      &[(8, true), (64, false), (8, true), (32, false), (24, false), (24, false)],
    );

    unsafe {
      assert_eq!(best_fit(Some(list[0]), 16), Some(list[4]));
      assert_eq!(best_fit(Some(list[0]), 32), Some(list[3]));
      assert_eq!(best_fit(Some(list[0]), 40), Some(list[1]));
      assert_eq!(best_fit(Some(list[0]), 128), None);
    }
  }

  #[test]
  fn test_best_fit_exact_match() {
    let mut storage = [0usize; 64];
    let list = build_list(&mut storage, &[(8, true), (64, false), (8, true), (16, false)]);

    unsafe {
      assert_eq!(best_fit(Some(list[0]), 16), Some(list[3]));
    }
  }

  #[test]
  fn test_parse_search_mode() {
    assert_eq!("first-fit".parse::<SearchMode>(), Ok(SearchMode::FirstFit));
    assert_eq!("Next_Fit".parse::<SearchMode>(), Ok(SearchMode::NextFit));
    assert_eq!(" best ".parse::<SearchMode>(), Ok(SearchMode::BestFit));
    assert!("worst-fit".parse::<SearchMode>().is_err());

    for mode in [SearchMode::FirstFit, SearchMode::NextFit, SearchMode::BestFit] {
      assert_eq!(mode.to_string().parse::<SearchMode>(), Ok(mode));
    }
  }
}
