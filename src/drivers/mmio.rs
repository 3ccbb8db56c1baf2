//! Memory-Mapped I/O (MMIO) Register Abstraction
//!
//! Type-safe access to a block of 32-bit hardware registers using
//! tock-registers. Volatile pointer operations stay inside this module.

use core::ptr::NonNull;
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::ReadWrite;

/// A memory-mapped I/O region of 32-bit registers.
///
/// In debug builds every access is bounds checked against the region size.
#[derive(Clone, Copy)]
pub struct MmioRegion {
    /// Base address of the MMIO region
    base: NonNull<u8>,
    /// Size of the MMIO region in bytes
    #[cfg(debug_assertions)]
    size: usize,
}

// SAFETY: MmioRegion only holds the address of device register space, which
// stays mapped for the lifetime of the driver. Concurrent accesses are
// individual volatile loads/stores.
unsafe impl Send for MmioRegion {}
unsafe impl Sync for MmioRegion {}

impl MmioRegion {
    /// Create a region from a mapped base address and its size.
    ///
    /// Returns `None` for a null base.
    ///
    /// # Safety
    ///
    /// `[base, base + size)` must be mapped device register space that stays
    /// valid for the lifetime of the returned region.
    pub unsafe fn new(base: usize, #[allow(unused_variables)] size: usize) -> Option<Self> {
        let base = NonNull::new(base as *mut u8)?;
        Some(Self {
            base,
            #[cfg(debug_assertions)]
            size,
        })
    }

    /// Base address of this region
    #[inline]
    pub fn base(&self) -> usize {
        self.base.as_ptr() as usize
    }

    #[cfg(debug_assertions)]
    #[inline]
    fn check_bounds(&self, offset: usize) {
        assert!(
            offset % 4 == 0 && offset.saturating_add(4) <= self.size,
            "MMIO access out of bounds: offset={:#x}, region_size={:#x}",
            offset,
            self.size
        );
    }

    #[inline]
    fn reg(&self, offset: usize) -> &ReadWrite<u32> {
        #[cfg(debug_assertions)]
        self.check_bounds(offset);

        // SAFETY: the offset is inside the mapped region and 4-byte aligned;
        // ReadWrite<u32> is a transparent wrapper performing volatile access.
        unsafe { &*(self.base.as_ptr().add(offset) as *const ReadWrite<u32>) }
    }

    /// Read a 32-bit register at the given offset.
    #[inline]
    pub fn read32(&self, offset: usize) -> u32 {
        self.reg(offset).get()
    }

    /// Write a 32-bit register at the given offset.
    #[inline]
    pub fn write32(&self, offset: usize, value: u32) {
        self.reg(offset).set(value);
    }
}
