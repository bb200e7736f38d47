use std::ptr::NonNull;

use log::debug;

use crate::platform;
use crate::region::{REGION_HEADER_SIZE, Region};

/// Block slots per arena. A class never holds more mapped blocks than this,
/// even if the OS would keep serving mappings.
pub(crate) const MAX_BLOCKS: usize = 50;

/// The three mapping sizes blocks come in. Every block is exactly one OS
/// mapping of its class size, carved into regions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum BlockClass {
    Small,
    Medium,
    Large,
}

impl BlockClass {
    /// All classes, ordered by size. Every scan walks them in this order.
    pub(crate) const ALL: [BlockClass; 3] =
        [BlockClass::Small, BlockClass::Medium, BlockClass::Large];

    /// Bytes of one mapped block of this class.
    pub(crate) const fn size(self) -> usize {
        match self {
            BlockClass::Small => 16 * 1024,
            BlockClass::Medium => 1024 * 1024,
            BlockClass::Large => 32 * 1024 * 1024,
        }
    }

    /// Whether a payload of `size` bytes fits in this class next to its
    /// header.
    pub(crate) const fn fits(self, size: usize) -> bool {
        size <= self.size() - REGION_HEADER_SIZE
    }
}

/// The smallest class able to hold `size` payload bytes, or `None` when even
/// the large class cannot.
pub(crate) fn classify(size: usize) -> Option<BlockClass> {
    BlockClass::ALL.into_iter().find(|class| class.fits(size))
}

/// One class worth of blocks. An occupied slot holds the address of the
/// block's first region, which doubles as the mapping base. Insertion takes
/// the first empty slot; order among slots carries no meaning.
pub(crate) struct Arena {
    pub class: BlockClass,
    pub slots: [Option<NonNull<Region>>; MAX_BLOCKS],
}

impl Arena {
    const fn new(class: BlockClass) -> Self {
        Self {
            class,
            slots: [None; MAX_BLOCKS],
        }
    }
}

/// The region manager: one arena per class plus the operations that carve
/// blocks into regions and hand them back.
pub(crate) struct ArenaSet {
    pub arenas: [Arena; 3],
}

impl ArenaSet {
    pub(crate) const fn new() -> Self {
        Self {
            arenas: [
                Arena::new(BlockClass::Small),
                Arena::new(BlockClass::Medium),
                Arena::new(BlockClass::Large),
            ],
        }
    }

    /// Picks a free region with at least `size` payload bytes and flips it
    /// busy before handing it back. Classes are scanned from the smallest
    /// one that could hold the request upward; within a class, blocks in
    /// slot order; within a block, regions from the head.
    ///
    /// The first sufficient region wins.
    #[cfg(feature = "first-fit")]
    pub(crate) fn find_free(&mut self, size: usize) -> Option<NonNull<Region>> {
        for arena in self.arenas.iter().filter(|arena| arena.class.fits(size)) {
            for slot in arena.slots.iter().flatten() {
                let mut current = Some(*slot);

                while let Some(mut region) = current {
                    unsafe {
                        if region.as_ref().free && region.as_ref().size >= size {
                            region.as_mut().free = false;
                            return Some(region);
                        }

                        current = region.as_ref().next;
                    }
                }
            }
        }

        None
    }

    /// Picks the free region whose size lands closest to `size` across every
    /// block of every class that could hold the request, and flips it busy
    /// before handing it back. The earliest candidate wins ties.
    #[cfg(feature = "best-fit")]
    pub(crate) fn find_free(&mut self, size: usize) -> Option<NonNull<Region>> {
        let mut best: Option<NonNull<Region>> = None;

        for arena in self.arenas.iter().filter(|arena| arena.class.fits(size)) {
            for slot in arena.slots.iter().flatten() {
                let mut current = Some(*slot);

                while let Some(region) = current {
                    unsafe {
                        if region.as_ref().free
                            && region.as_ref().size >= size
                            && best.is_none_or(|best| best.as_ref().size > region.as_ref().size)
                        {
                            best = Some(region);
                        }

                        current = region.as_ref().next;
                    }
                }
            }
        }

        if let Some(mut region) = best {
            unsafe { region.as_mut().free = false };
        }

        best
    }

    /// Maps a fresh block sized for `size` and hands back its sole region,
    /// already registered in its class arena.
    ///
    /// Fails when no class can hold `size`, when the OS refuses the mapping,
    /// or when the class table is full. The arenas are left exactly as they
    /// were on any failure.
    pub(crate) fn create_block(&mut self, size: usize) -> Option<NonNull<Region>> {
        let class = classify(size)?;

        let base = unsafe { platform::request_memory(class.size()) }?;
        let region = unsafe { Region::init(base, class.size(), None, None) };

        let arena = &mut self.arenas[class as usize];
        match arena.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                // The block must be reachable from its slot before anyone
                // can see its region.
                *slot = Some(region);
                debug!("mapped {:?} block at {:p}", class, base.as_ptr());
                Some(region)
            }
            None => {
                debug!("{:?} arena table is full, dropping fresh mapping", class);
                unsafe { platform::return_memory(base.as_ptr(), class.size()) };
                None
            }
        }
    }

    /// Releases the block `region` sits in, provided the region is all
    /// that's left of it: a region without neighbours spans its whole block
    /// and sits at the mapping base.
    ///
    /// The slot is cleared before the mapping is returned, so no later scan
    /// can observe a dangling slot. Returns whether a block was released.
    pub(crate) unsafe fn delete_block(&mut self, region: NonNull<Region>) -> bool {
        unsafe {
            if region.as_ref().prev.is_some() || region.as_ref().next.is_some() {
                return false;
            }
        }

        // The slot identifies the block's class, whatever size the region
        // has coalesced to.
        for arena in self.arenas.iter_mut() {
            for slot in arena.slots.iter_mut() {
                if *slot == Some(region) {
                    *slot = None;
                    unsafe { platform::return_memory(region.as_ptr().cast(), arena.class.size()) };
                    debug!("released {:?} block at {:p}", arena.class, region.as_ptr());
                    return true;
                }
            }
        }

        false
    }

    /// Returns every still-mapped block to the OS. Teardown only.
    pub(crate) fn release_all(&mut self) {
        for arena in self.arenas.iter_mut() {
            for slot in arena.slots.iter_mut() {
                if let Some(region) = slot.take() {
                    unsafe { platform::return_memory(region.as_ptr().cast(), arena.class.size()) };
                }
            }
        }
    }
}
