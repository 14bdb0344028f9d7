//! Simulated shared memory region visible to both cores.

use std::sync::atomic::AtomicU32;

use duocore_core::config::SHARED_PM_BLOCK_ADDR;
use duocore_core::pm::SharedPmBlock;
use duocore_hal::MemoryWindow;

/// Address of the first scratch word, right after the PM block's page.
pub const SCRATCH_BASE: usize = SHARED_PM_BLOCK_ADDR + 0x1000;

/// Shared region: the PM block plus a bank of scratch words reachable by
/// masked writes at simulated addresses.
pub struct SharedRam {
    pub pm: SharedPmBlock,
    base: usize,
    words: Box<[AtomicU32]>,
}

impl SharedRam {
    /// Allocate a region for the lifetime of the process.
    pub fn leak(words: usize) -> &'static SharedRam {
        Box::leak(Box::new(SharedRam {
            pm: SharedPmBlock::new(),
            base: SCRATCH_BASE,
            words: (0..words).map(|_| AtomicU32::new(0)).collect(),
        }))
    }

    /// Simulated address of scratch word `index`.
    pub fn address_of(&self, index: usize) -> usize {
        self.base + index * 4
    }

    pub fn word(&self, index: usize) -> Option<&AtomicU32> {
        self.words.get(index)
    }
}

impl MemoryWindow for SharedRam {
    fn word_at(&self, addr: usize) -> Option<&AtomicU32> {
        let offset = addr.checked_sub(self.base)?;
        if offset % 4 != 0 {
            return None;
        }
        self.words.get(offset / 4)
    }
}
