//! Walks through reuse, splitting and reset on a live heap.
//!
//! ```text
//! RUST_LOG=trace cargo run --example walkthrough -- best-fit --sbrk --pause
//! ```

use std::{env, io::Read, process};

use listalloc::{AllocError, Arena, Heap, HeapProvider, SearchMode, Sbrk};

struct Options {
  mode: SearchMode,
  sbrk: bool,
  pause: bool,
}

/// Waits for ENTER when `--pause` was given, so the heap can be inspected
/// with `pmap`, `gdb` or `/proc/<pid>/maps` between steps.
fn pause(options: &Options) {
  if options.pause {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

fn print_heap<P: HeapProvider>(
  label: &str,
  heap: &Heap<P>,
) {
  let stats = heap.stats();
  println!(
    "[{}] blocks = {}, boundary = {:?}, {} used / {} free bytes",
    label,
    heap.dump(),
    heap.provider().current_boundary(),
    stats.used_bytes,
    stats.free_bytes,
  );
}

fn fail(err: AllocError) -> ! {
  eprintln!("allocation failed: {}", err);
  process::exit(1);
}

fn run<P: HeapProvider>(
  mut heap: Heap<P>,
  options: &Options,
) -> Heap<P> {
  print_heap("start", &heap);
  pause(options);

  // 1) odd sized requests are rounded up to a machine word
  let small = heap.allocate(3).unwrap_or_else(|err| fail(err));
  let word = heap.allocate(8).unwrap_or_else(|err| fail(err));
  print_heap("3 and 8 bytes", &heap);
  pause(options);

  // 2) a freed block is found again before the heap grows
  unsafe { heap.free(word) };
  let reused = heap.allocate(8).unwrap_or_else(|err| fail(err));
  println!("[reuse] freed block handed out again? {}", reused == word);
  print_heap("reuse", &heap);
  pause(options);

  // 3) a large free block is split
  let large = heap.allocate(256).unwrap_or_else(|err| fail(err));
  heap.allocate(8).unwrap_or_else(|err| fail(err));
  unsafe { heap.free(large) };
  let part = heap.allocate(32).unwrap_or_else(|err| fail(err));
  println!("[split] 32 bytes carved from the 256 byte block? {}", part == large);
  print_heap("split", &heap);
  pause(options);

  unsafe {
    heap.free(small);
    heap.free(reused);
    heap.free(part);
  }
  print_heap("all freed", &heap);

  heap
}

fn main() {
  env_logger::init();

  let mut options = Options {
    mode: SearchMode::default(),
    sbrk: false,
    pause: false,
  };

  for arg in env::args().skip(1) {
    match arg.as_str() {
      "--sbrk" => options.sbrk = true,
      "--pause" => options.pause = true,
      mode => {
        options.mode = mode.parse().unwrap_or_else(|err| {
          eprintln!("{}", err);
          process::exit(2);
        })
      }
    }
  }

  println!("PID = {}, search mode = {}", process::id(), options.mode);

  if options.sbrk {
    // SAFETY: the break is shared with the system allocator, so the heap is
    // never reset here; its blocks are simply left to the OS at exit.
    run(Heap::new(unsafe { Sbrk::new() }, options.mode), &options);
    println!("\nEnd of example, the OS reclaims the program break at exit.");
    return;
  }

  let arena = Arena::with_capacity(1 << 20).unwrap_or_else(|err| fail(err));
  let mut heap = run(Heap::new(arena, options.mode), &options);

  // 4) reset hands everything back to the arena
  heap.reset();
  print_heap("reset", &heap);
}
