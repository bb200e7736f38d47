use std::cell::UnsafeCell;
use std::ptr::{self, NonNull};

use log::trace;

use crate::arena::{ArenaSet, BlockClass};
use crate::platform;
use crate::region::{MAGIC_BYTES, REGION_HEADER_SIZE, Region};
use crate::stats::AllocStats;
use crate::utils::align_size;

/// Everything the allocator mutates: the per-class arenas and the counters
/// that describe them. One struct so the counters always travel with the
/// arena mutation they belong to.
struct AllocState {
    arenas: ArenaSet,
    stats: AllocStats,
}

/// The allocator front-end: the four classic heap entry points plus a
/// statistics snapshot. One instance owns its mappings for its whole
/// lifetime and returns them to the OS when dropped.
///
/// The entry points take `&self` and mutate through an [`UnsafeCell`],
/// matching the single-caller contract: the type is deliberately not `Sync`.
/// A multi-threaded host has to put its own lock around the whole instance.
///
/// ```
/// use mapalloc::MapAlloc;
///
/// let allocator = MapAlloc::new();
///
/// let ptr = unsafe { allocator.malloc(64) };
/// assert!(!ptr.is_null());
///
/// unsafe { allocator.free(ptr) };
/// assert_eq!(allocator.stats().frees, 1);
/// ```
pub struct MapAlloc {
    state: UnsafeCell<AllocState>,
}

impl MapAlloc {
    /// Creates an allocator with empty arenas. No memory is mapped until
    /// the first allocation asks for it.
    pub const fn new() -> Self {
        Self {
            state: UnsafeCell::new(AllocState {
                arenas: ArenaSet::new(),
                stats: AllocStats::new(),
            }),
        }
    }

    /// Hands out `size` bytes of payload, aligned to 4 bytes.
    ///
    /// Returns null for a zero `size` and for sizes even the large class
    /// cannot hold, without touching the platform error indicator. Returns
    /// null *and* signals out-of-memory when the OS refuses a mapping or
    /// the chosen class already holds its maximum number of blocks.
    ///
    /// **SAFETY**: the instance must not be re-entered while the call runs;
    /// a single logical caller is assumed.
    pub unsafe fn malloc(&self, size: usize) -> *mut u8 {
        if size == 0 || !BlockClass::Large.fits(size) {
            return ptr::null_mut();
        }

        let state = unsafe { &mut *self.state.get() };
        let size = align_size(size);

        let mut region = match state.arenas.find_free(size) {
            Some(region) => region,
            None => match state.arenas.create_block(size) {
                Some(region) => {
                    state.stats.blocks += 1;
                    region
                }
                None => {
                    trace!("allocation of {size} bytes failed, no memory");
                    platform::signal_no_memory();
                    return ptr::null_mut();
                }
            },
        };

        state.stats.mallocs += 1;
        state.stats.requested += size;

        unsafe {
            region.as_mut().free = false;
            Region::split(region, size);

            Region::payload(region).as_ptr()
        }
    }

    /// Returns a payload obtained from this allocator.
    ///
    /// A null pointer, a pointer whose recovered header carries no magic,
    /// and a second free of the same payload are all silently ignored. The
    /// freed region is merged with free neighbours, and a block left with a
    /// single free region goes back to the OS.
    ///
    /// **SAFETY**: `ptr` must be null or a pointer this allocator handed
    /// out; the bytes right before a foreign `ptr` must at least be
    /// readable for the magic check.
    pub unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        let state = unsafe { &mut *self.state.get() };

        unsafe {
            let region = Region::from_payload(ptr);
            if (*region).magic != MAGIC_BYTES {
                return;
            }
            if (*region).free {
                return;
            }
            (*region).free = true;

            let merged = Region::coalesce(NonNull::new_unchecked(region));
            if state.arenas.delete_block(merged) {
                state.stats.blocks -= 1;
            }
        }

        state.stats.frees += 1;
    }

    /// Hands out `nmemb * size` zeroed payload bytes.
    ///
    /// Returns null when either operand is zero. An overflowing product is
    /// treated as out-of-memory: the indicator is raised and null comes
    /// back.
    ///
    /// **SAFETY**: same contract as [`MapAlloc::malloc`].
    pub unsafe fn calloc(&self, nmemb: usize, size: usize) -> *mut u8 {
        if nmemb == 0 || size == 0 {
            return ptr::null_mut();
        }

        let Some(total) = nmemb.checked_mul(size) else {
            platform::signal_no_memory();
            return ptr::null_mut();
        };

        let ptr = unsafe { self.malloc(total) };
        if !ptr.is_null() {
            unsafe { ptr.write_bytes(0, total) };
        }

        ptr
    }

    /// Resizes a payload to `size` bytes, growing in place through a free
    /// neighbour when one has the room, and falling back to a fresh region
    /// plus a copy otherwise. Shrinking splits the tail off and returns it
    /// to the free pool.
    ///
    /// A null `ptr` behaves like `malloc(size)`; a zero `size` behaves like
    /// `free(ptr)` and returns null; a pointer without magic returns null
    /// with the arenas untouched. The returned pointer only differs from
    /// `ptr` when the payload had to move.
    ///
    /// **SAFETY**: same contract as [`MapAlloc::free`] for `ptr`.
    pub unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        if ptr.is_null() {
            return unsafe { self.malloc(size) };
        }
        if size == 0 {
            unsafe { self.free(ptr) };
            return ptr::null_mut();
        }

        unsafe {
            let mut region = match NonNull::new(Region::from_payload(ptr)) {
                Some(region) if region.as_ref().magic == MAGIC_BYTES => region,
                _ => return ptr::null_mut(),
            };

            let size = align_size(size);
            let old_size = region.as_ref().size;

            if size > old_size {
                if let Some(next) = region.as_ref().next
                    && next.as_ref().free
                    && old_size + next.as_ref().size + REGION_HEADER_SIZE >= size
                {
                    // The right neighbour has the spare room: grow in place,
                    // the payload address does not change.
                    region = Region::merge(region, next);
                    Region::split(region, size);
                } else if let Some(prev) = region.as_ref().prev
                    && prev.as_ref().free
                    && old_size + prev.as_ref().size + REGION_HEADER_SIZE >= size
                {
                    // The left neighbour has the room: the region's base
                    // moves down, so the payload has to move with it. The
                    // two spans can overlap.
                    region = Region::merge(prev, region);
                    ptr::copy(ptr, Region::payload(region).as_ptr(), old_size);
                    Region::split(region, size);
                    region.as_mut().free = false;

                    // The old right neighbour may have been free; the split
                    // residual must not sit next to it unmerged.
                    if let Some(next) = region.as_ref().next
                        && next.as_ref().free
                    {
                        Region::coalesce(next);
                    }
                } else {
                    return self.relocate(ptr, old_size, size);
                }
            } else if size < old_size {
                Region::split(region, size);

                // Chain the residual into a free right neighbour, if any, so
                // consecutive shrinks don't litter the block.
                if let Some(next) = region.as_ref().next
                    && next.as_ref().free
                {
                    Region::coalesce(next);
                }
            }

            let state = &mut *self.state.get();
            state.stats.requested = state.stats.requested.saturating_sub(old_size) + size;

            Region::payload(region).as_ptr()
        }
    }

    /// Grow path of last resort: take a fresh region, move the payload over
    /// and give the old region back. The malloc counter is rolled back so
    /// the resize is not counted as an extra allocation.
    unsafe fn relocate(&self, ptr: *mut u8, old_size: usize, size: usize) -> *mut u8 {
        unsafe {
            let new_ptr = self.malloc(size);
            if new_ptr.is_null() {
                platform::signal_no_memory();
                return ptr::null_mut();
            }

            ptr::copy_nonoverlapping(ptr, new_ptr, old_size);
            self.free(ptr);

            let state = &mut *self.state.get();
            state.stats.mallocs -= 1;
            // The new size was already booked by the inner malloc.
            state.stats.requested = state.stats.requested.saturating_sub(old_size);

            new_ptr
        }
    }

    /// Snapshot of the running counters.
    pub fn stats(&self) -> AllocStats {
        unsafe { (*self.state.get()).stats }
    }
}

impl Default for MapAlloc {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MapAlloc {
    fn drop(&mut self) {
        self.state.get_mut().arenas.release_all();
    }
}
