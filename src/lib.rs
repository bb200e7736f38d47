//! MapAlloc is a heap allocator built directly on the operating system's
//! anonymous page mappings. It never borrows another allocator: every byte of
//! bookkeeping lives inside the same pages it hands out. Memory comes from:
//!
//! [`mmap`](https://man7.org/linux/man-pages/man2/mmap.2.html) on Unix
//! [`VirtualAlloc`](https://learn.microsoft.com/en-us/windows/win32/api/memoryapi/nf-memoryapi-virtualalloc)
//! on Windows.
//!
//! The internal structure of the allocator looks like this:
//!
//! ```text
//!   Arena (one per class)                Block (one OS mapping)
//!
//!  +----+----+----+-- ... --+       +----------------------------------------+
//!  |    | 50 block slots    | ----> | Region | Region  | Region |   Region   |
//!  +----+----+----+-- ... --+       | (busy) | (free)  | (busy) |   (free)   |
//!                                   +----------------------------------------+
//! ```
//!
//! Blocks come in three sizes, 16 KiB, 1 MiB and 32 MiB, and each size class
//! keeps its own arena of up to 50 blocks. Inside a block, every region
//! starts with a small header (magic sentinel, free flag, payload size and
//! links to its neighbours) and the caller's bytes follow right after it.
//! The regions of a block tile it exactly.
//!
//! The main optimizations which are implemented are:
//! - **Region splitting**: a region bigger than the request donates its tail
//!   as a fresh free region
//! - **Region coalescing**: freed regions are merged with free neighbours,
//!   and a block whose single region is free goes back to the OS
//!
//! How a free region is picked is decided at build time through two mutually
//! exclusive cargo features: `first-fit` (the default) takes the first free
//! region that is big enough, `best-fit` walks everything and takes the
//! tightest one.
//!
//! The main structure is [`MapAlloc`], you can follow the codebase from there.

#[cfg(all(feature = "first-fit", feature = "best-fit"))]
compile_error!("features `first-fit` and `best-fit` are mutually exclusive");

#[cfg(not(any(feature = "first-fit", feature = "best-fit")))]
compile_error!("select a search strategy: enable `first-fit` or `best-fit`");

mod arena;
mod mapalloc;
mod platform;
mod region;
mod stats;
mod utils;

pub use mapalloc::MapAlloc;
pub use stats::AllocStats;
