//! Descriptor memory: the HCCA and the fixed ED/TD slot pools
//!
//! One contiguous DMA buffer is carved into the HCCA, then `MAX_ENDPOINT`
//! EDs, then `MAX_TD` TDs. Each pool tracks liveness with one atomic flag per
//! slot, so allocation and release are safe against the interrupt path
//! preempting application code.

use super::descriptors::{
    ED_SIZE, EndpointDescriptor, HCCA_SIZE, Hcca, TD_SIZE, TransferDescriptor,
};
use crate::drivers::usb::controller::{DescriptorKind, UsbError};
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering, fence};
use zerocopy::FromZeros;

/// Number of Endpoint Descriptor slots
pub const MAX_ENDPOINT: usize = 16;

/// Number of Transfer Descriptor slots
pub const MAX_TD: usize = MAX_ENDPOINT * 2;

/// Bytes of DMA memory needed by [`HostMemory`]
pub const DMA_BUFFER_SIZE: usize = HCCA_SIZE + MAX_ENDPOINT * ED_SIZE + MAX_TD * TD_SIZE;

// ============================================================================
// DMA Buffer
// ============================================================================

/// A DMA-capable buffer seen from both sides: the CPU pointer and the bus
/// address the controller uses for the same bytes.
#[derive(Clone, Copy, Debug)]
pub struct DmaBuffer {
    cpu: NonNull<u8>,
    bus: u32,
    len: usize,
}

// SAFETY: the buffer is owned by the driver for its whole lifetime; all
// accesses through it are volatile and slot ownership is arbitrated by the
// atomic pool flags.
unsafe impl Send for DmaBuffer {}
unsafe impl Sync for DmaBuffer {}

impl DmaBuffer {
    /// Describe a DMA buffer
    ///
    /// # Safety
    ///
    /// - `cpu` must be valid for reads and writes of `len` bytes for as long
    ///   as the driver uses it, and not accessed by anything else
    /// - `bus` must be the address at which the controller sees `cpu[0]`
    /// - the memory must be coherent with the controller (or uncached)
    pub unsafe fn new(cpu: *mut u8, bus: u32, len: usize) -> Option<Self> {
        Some(Self {
            cpu: NonNull::new(cpu)?,
            bus,
            len,
        })
    }

    /// Bus address of the first byte
    pub fn bus_address(&self) -> u32 {
        self.bus
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// ============================================================================
// Descriptor Pool
// ============================================================================

/// Fixed-capacity pool of equally sized descriptor slots
///
/// Slots are handed out as bus addresses. The address given to `free` must be
/// one returned by `allocate` on the same pool and not yet freed; anything
/// else is a fatal error.
pub struct DescriptorPool<const N: usize> {
    kind: DescriptorKind,
    cpu_base: NonNull<u8>,
    bus_base: u32,
    slot_size: usize,
    used: [AtomicBool; N],
    in_use: AtomicUsize,
}

// SAFETY: see DmaBuffer; the raw base pointer is only dereferenced for slots
// inside the pool's range.
unsafe impl<const N: usize> Send for DescriptorPool<N> {}
unsafe impl<const N: usize> Sync for DescriptorPool<N> {}

impl<const N: usize> DescriptorPool<N> {
    fn new(kind: DescriptorKind, cpu_base: NonNull<u8>, bus_base: u32, slot_size: usize) -> Self {
        Self {
            kind,
            cpu_base,
            bus_base,
            slot_size,
            used: [const { AtomicBool::new(false) }; N],
            in_use: AtomicUsize::new(0),
        }
    }

    /// Claim the first free slot found by a linear scan
    pub fn allocate(&self) -> Result<u32, UsbError> {
        for (index, flag) in self.used.iter().enumerate() {
            if flag
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                self.in_use.fetch_add(1, Ordering::Relaxed);
                return Ok(self.bus_base + (index * self.slot_size) as u32);
            }
        }

        log::error!("OHCI: could not allocate {} ({} slots in use)", self.kind, N);
        Err(UsbError::AllocationExhausted(self.kind))
    }

    /// Return a slot to the pool
    ///
    /// # Panics
    ///
    /// Panics if `address` is not a slot of this pool or is not allocated.
    pub fn free(&self, address: u32) {
        let Some(index) = self.slot_index(address) else {
            panic!("OHCI: free of {:#x} outside the {} pool", address, self.kind);
        };
        if !self.used[index].swap(false, Ordering::Release) {
            panic!("OHCI: double free of {} slot {} ({:#x})", self.kind, index, address);
        }
        self.in_use.fetch_sub(1, Ordering::Relaxed);
    }

    /// Slot index of `address`, if it is exactly a slot of this pool
    pub fn slot_index(&self, address: u32) -> Option<usize> {
        let offset = address.checked_sub(self.bus_base)? as usize;
        if offset % self.slot_size != 0 {
            return None;
        }
        let index = offset / self.slot_size;
        (index < N).then_some(index)
    }

    /// Whether `address` is a currently allocated slot
    pub fn is_allocated(&self, address: u32) -> bool {
        self.slot_index(address)
            .is_some_and(|index| self.used[index].load(Ordering::Acquire))
    }

    /// Number of slots currently allocated
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Bus address of slot 0
    pub fn base(&self) -> u32 {
        self.bus_base
    }

    fn slot_ptr<T>(&self, address: u32) -> *mut T {
        let Some(index) = self.slot_index(address) else {
            panic!("OHCI: {:#x} is not a {} slot", address, self.kind);
        };
        // SAFETY: index < N, so the slot lies inside the pool's part of the
        // DMA buffer.
        unsafe { self.cpu_base.as_ptr().add(index * self.slot_size) as *mut T }
    }

    fn read<T: Copy>(&self, address: u32) -> T {
        fence(Ordering::SeqCst);
        // SAFETY: slot_ptr yields an in-bounds, slot-aligned pointer and T
        // is the slot's descriptor layout.
        unsafe { ptr::read_volatile(self.slot_ptr::<T>(address)) }
    }

    fn write<T: Copy>(&self, address: u32, value: T) {
        // SAFETY: as in read
        unsafe { ptr::write_volatile(self.slot_ptr::<T>(address), value) };
        fence(Ordering::SeqCst);
    }
}

// ============================================================================
// Host Memory
// ============================================================================

/// The HCCA plus the ED and TD pools, laid out in one DMA buffer
pub struct HostMemory {
    buffer: DmaBuffer,
    eds: DescriptorPool<MAX_ENDPOINT>,
    tds: DescriptorPool<MAX_TD>,
}

impl HostMemory {
    /// Carve `buffer` into HCCA, EDs and TDs and zero the HCCA
    ///
    /// The buffer must hold [`DMA_BUFFER_SIZE`] bytes, and both its CPU
    /// pointer and bus address must be 256-byte aligned.
    pub fn new(buffer: DmaBuffer) -> Result<Self, UsbError> {
        if buffer.len < DMA_BUFFER_SIZE {
            log::error!(
                "OHCI: DMA buffer too small ({} < {} bytes)",
                buffer.len,
                DMA_BUFFER_SIZE
            );
            return Err(UsbError::InvalidParameter);
        }
        let align = core::mem::align_of::<Hcca>();
        if buffer.bus as usize % align != 0 || buffer.cpu.as_ptr() as usize % align != 0 {
            log::error!("OHCI: DMA buffer at bus {:#x} not {}-byte aligned", buffer.bus, align);
            return Err(UsbError::InvalidParameter);
        }
        if buffer.bus.checked_add(DMA_BUFFER_SIZE as u32).is_none() {
            return Err(UsbError::InvalidParameter);
        }

        let ed_offset = HCCA_SIZE;
        let td_offset = HCCA_SIZE + MAX_ENDPOINT * ED_SIZE;

        // SAFETY: both offsets are below DMA_BUFFER_SIZE <= len
        let (ed_cpu, td_cpu) = unsafe {
            (
                NonNull::new_unchecked(buffer.cpu.as_ptr().add(ed_offset)),
                NonNull::new_unchecked(buffer.cpu.as_ptr().add(td_offset)),
            )
        };

        let memory = Self {
            buffer,
            eds: DescriptorPool::new(
                DescriptorKind::Endpoint,
                ed_cpu,
                buffer.bus + ed_offset as u32,
                ED_SIZE,
            ),
            tds: DescriptorPool::new(
                DescriptorKind::Transfer,
                td_cpu,
                buffer.bus + td_offset as u32,
                TD_SIZE,
            ),
        };

        // SAFETY: the HCCA sits at the (256-aligned) start of the buffer
        unsafe { ptr::write_volatile(memory.hcca(), Hcca::new_zeroed()) };
        fence(Ordering::SeqCst);

        log::debug!(
            "OHCI: HCCA at {:#x}, EDs at {:#x}, TDs at {:#x}",
            buffer.bus,
            memory.eds.base(),
            memory.tds.base()
        );
        Ok(memory)
    }

    fn hcca(&self) -> *mut Hcca {
        self.buffer.cpu.as_ptr() as *mut Hcca
    }

    /// Bus address of the HCCA, as programmed into HcHCCA
    pub fn hcca_address(&self) -> u32 {
        self.buffer.bus
    }

    /// Raw HCCA Done Head, including the flag in bit 0
    pub fn done_head(&self) -> u32 {
        fence(Ordering::SeqCst);
        // SAFETY: hcca() points at the live HCCA
        unsafe { ptr::read_volatile(&raw const (*self.hcca()).done_head) }
    }

    /// Reset the HCCA Done Head to zero
    pub fn clear_done_head(&self) {
        // SAFETY: hcca() points at the live HCCA
        unsafe { ptr::write_volatile(&raw mut (*self.hcca()).done_head, 0) };
        fence(Ordering::SeqCst);
    }

    /// Stand in for the controller writing back the done queue
    #[cfg(test)]
    pub(crate) fn write_done_head(&self, value: u32) {
        // SAFETY: hcca() points at the live HCCA
        unsafe { ptr::write_volatile(&raw mut (*self.hcca()).done_head, value) };
        fence(Ordering::SeqCst);
    }

    /// Head of the interrupt ED list (interrupt table slot 0)
    pub fn interrupt_head(&self) -> u32 {
        fence(Ordering::SeqCst);
        // SAFETY: hcca() points at the live HCCA
        unsafe { ptr::read_volatile(&raw const (*self.hcca()).interrupt_table[0]) }
    }

    pub fn set_interrupt_head(&self, address: u32) {
        // SAFETY: hcca() points at the live HCCA
        unsafe { ptr::write_volatile(&raw mut (*self.hcca()).interrupt_table[0], address) };
        fence(Ordering::SeqCst);
    }

    /// Endpoint Descriptor pool
    pub fn eds(&self) -> &DescriptorPool<MAX_ENDPOINT> {
        &self.eds
    }

    /// Transfer Descriptor pool
    pub fn tds(&self) -> &DescriptorPool<MAX_TD> {
        &self.tds
    }

    pub fn allocate_ed(&self) -> Result<u32, UsbError> {
        self.eds.allocate()
    }

    pub fn allocate_td(&self) -> Result<u32, UsbError> {
        self.tds.allocate()
    }

    pub fn free_ed(&self, address: u32) {
        self.eds.free(address)
    }

    pub fn free_td(&self, address: u32) {
        self.tds.free(address)
    }

    pub fn read_ed(&self, address: u32) -> EndpointDescriptor {
        self.eds.read(address)
    }

    pub fn write_ed(&self, address: u32, ed: EndpointDescriptor) {
        self.eds.write(address, ed)
    }

    pub fn read_td(&self, address: u32) -> TransferDescriptor {
        self.tds.read(address)
    }

    pub fn write_td(&self, address: u32, td: TransferDescriptor) {
        self.tds.write(address, td)
    }
}

/// Heap-backed DMA buffer for tests, with a fake bus address
#[cfg(test)]
pub struct TestDmaBuffer {
    storage: std::boxed::Box<TestDmaStorage>,
}

#[cfg(test)]
#[repr(C, align(256))]
struct TestDmaStorage([u8; DMA_BUFFER_SIZE]);

#[cfg(test)]
impl TestDmaBuffer {
    pub const BUS_BASE: u32 = 0x2007_C000;

    pub fn new() -> Self {
        Self {
            storage: std::boxed::Box::new(TestDmaStorage([0xA5; DMA_BUFFER_SIZE])),
        }
    }

    pub fn dma(&mut self) -> DmaBuffer {
        unsafe { DmaBuffer::new(self.storage.0.as_mut_ptr(), Self::BUS_BASE, DMA_BUFFER_SIZE) }
            .unwrap()
    }
}
