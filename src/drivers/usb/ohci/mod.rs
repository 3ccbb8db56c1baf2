//! OHCI (Open Host Controller Interface) Driver
//!
//! This module implements the host side of a USB 1.1 OHCI controller with a
//! single root hub port: descriptor memory, endpoint list control, root hub
//! connect/disconnect monitoring, and done-queue processing.
//!
//! # Layering
//!
//! The platform supplies three things:
//! - an [`OhciRegisters`] backend (usually [`MmioRegisters`])
//! - a [`Clock`] for debounce and polling timeouts
//! - a DMA buffer of [`DMA_BUFFER_SIZE`] bytes, 256-byte aligned
//!
//! Events go upstream through [`HostEventListener`]. The upstream layer owns
//! device enumeration, transfers, and releasing retired TDs.
//!
//! # Bring-up
//!
//! ```ignore
//! let mut host = OhciHost::new(regs, clock, listener, OhciConfig::new());
//! host.mem_init(dma)?;
//! host.init()?;
//! let host: &'static _ = HOST.call_once(|| host);
//! let _binding = host.bind();
//! ```

mod completion;
mod config;
mod descriptors;
mod done_queue;
mod events;
mod irq;
mod lists;
mod memory;
pub mod regs;
mod root_hub;
#[cfg(test)]
pub(crate) mod testing;

pub use self::config::{DebounceMode, OhciConfig};
pub use self::descriptors::{EndpointDescriptor, Hcca, TransferDescriptor};
pub use self::done_queue::{CompletedTd, DoneIter, DoneQueue};
pub use self::irq::{InterruptHandler, IrqBinding, bind, usb_isr};
pub use self::memory::{
    DMA_BUFFER_SIZE, DescriptorPool, DmaBuffer, HostMemory, MAX_ENDPOINT, MAX_TD,
};
pub use self::regs::{MmioRegisters, OHCI_MMIO_SIZE, OhciRegisters, Reg};

use self::events::DeferredEvents;
use self::regs::{HC_COMMAND_STATUS, HC_CONTROL, HC_FM_INTERVAL, HC_INTERRUPT, HC_RH_STATUS};
use crate::drivers::usb::controller::{HostEventListener, UsbError};
use crate::time::{self, Clock, Timeout};
use tock_registers::LocalRegisterCopy;

/// Nominal frame interval (12000 bit times - 1)
const DEFAULT_FRAME_INTERVAL: u32 = 0x2EDF;

/// OHCI host controller driver instance
///
/// All operations take `&self`, so one instance can be shared between the
/// interrupt path and application code once it is placed in a `'static`.
pub struct OhciHost<R, C, L>
where
    R: OhciRegisters,
    C: Clock,
    L: HostEventListener,
{
    regs: R,
    clock: C,
    config: OhciConfig,
    memory: Option<HostMemory>,
    listener: spin::Mutex<L>,
    deferred: DeferredEvents,
}

impl<R, C, L> OhciHost<R, C, L>
where
    R: OhciRegisters,
    C: Clock,
    L: HostEventListener,
{
    pub fn new(regs: R, clock: C, listener: L, config: OhciConfig) -> Self {
        Self {
            regs,
            clock,
            config,
            memory: None,
            listener: spin::Mutex::new(listener),
            deferred: DeferredEvents::new(),
        }
    }

    /// Lay out the HCCA and descriptor pools in `buffer`
    ///
    /// Must run before the interrupt is bound; until then interrupts are
    /// acknowledged and dropped.
    pub fn mem_init(&mut self, buffer: DmaBuffer) -> Result<(), UsbError> {
        if self.memory.is_some() {
            log::warn!("OHCI: descriptor memory already initialized");
            return Err(UsbError::InvalidParameter);
        }
        self.memory = Some(HostMemory::new(buffer)?);
        Ok(())
    }

    /// Descriptor memory, once [`mem_init`](Self::mem_init) has run
    pub fn memory(&self) -> Result<&HostMemory, UsbError> {
        self.memory.as_ref().ok_or(UsbError::NotReady)
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    pub fn config(&self) -> &OhciConfig {
        &self.config
    }

    /// Run `f` with exclusive access to the listener
    ///
    /// An interrupt taken while `f` runs leaves its events pending; they are
    /// re-raised once `f` returns.
    pub fn with_listener<T>(&self, f: impl FnOnce(&mut L) -> T) -> T {
        let result = f(&mut *self.listener.lock());
        self.release_held_causes();
        result
    }

    /// Reset the controller and bring it to the operational state
    ///
    /// Requires descriptor memory. On return the lists are empty and
    /// disabled, WDH, RHSC and UE are enabled, and port power is on.
    pub fn init(&self) -> Result<(), UsbError> {
        let memory = self.memory()?;
        let fm_interval = LocalRegisterCopy::<u32, HC_FM_INTERVAL::Register>::new(
            self.regs.read(Reg::FmInterval),
        );

        if self.control_register().is_set(HC_CONTROL::IR) {
            // Firmware owns the controller; ask for it back
            self.regs
                .write(Reg::CommandStatus, HC_COMMAND_STATUS::OCR::SET.value);
            let timeout = Timeout::from_ms(&self.clock, 500);
            while self.control_register().is_set(HC_CONTROL::IR) && !timeout.is_expired() {
                core::hint::spin_loop();
            }
        }

        self.regs
            .write(Reg::CommandStatus, HC_COMMAND_STATUS::HCR::SET.value);
        let timeout = Timeout::from_ms(&self.clock, self.config.controller_reset_timeout_ms);
        while self.regs.read(Reg::CommandStatus) & HC_COMMAND_STATUS::HCR::SET.value != 0 {
            if timeout.is_expired() {
                log::error!("OHCI: controller reset did not complete");
                return Err(UsbError::Timeout);
            }
            core::hint::spin_loop();
        }

        // Now in UsbSuspend; setup must finish within 2 ms
        self.regs.write(Reg::Hcca, memory.hcca_address());
        self.regs.write(Reg::ControlHeadEd, 0);
        self.regs.write(Reg::BulkHeadEd, 0);

        let mut frame_interval = fm_interval.read(HC_FM_INTERVAL::FI);
        if frame_interval == 0 {
            frame_interval = DEFAULT_FRAME_INTERVAL;
        }
        let max_packet = frame_interval.saturating_sub(210) * 6 / 7;
        let toggle = u32::from(!fm_interval.is_set(HC_FM_INTERVAL::FIT));
        self.regs.write(
            Reg::FmInterval,
            (HC_FM_INTERVAL::FI.val(frame_interval)
                + HC_FM_INTERVAL::FSMPS.val(max_packet)
                + HC_FM_INTERVAL::FIT.val(toggle))
            .value,
        );
        self.regs
            .write(Reg::PeriodicStart, frame_interval * 9 / 10);

        self.regs.write(Reg::InterruptStatus, u32::MAX);
        self.regs.write(
            Reg::InterruptEnable,
            (HC_INTERRUPT::WDH::SET
                + HC_INTERRUPT::RHSC::SET
                + HC_INTERRUPT::UE::SET
                + HC_INTERRUPT::MIE::SET)
                .value,
        );

        self.regs
            .write(Reg::Control, HC_CONTROL::HCFS::Operational.value);

        self.regs
            .write(Reg::RhStatus, HC_RH_STATUS::LPSC::SET.value);
        time::delay_ms(&self.clock, self.config.power_on_delay_ms);

        log::info!("OHCI controller initialized (HCCA at {:#x})", memory.hcca_address());
        Ok(())
    }

    /// Stop list processing and interrupts, then hold the controller in reset
    pub fn shutdown(&self) {
        log::debug!("OHCI shutdown: stopping and resetting controller");

        self.regs
            .write(Reg::InterruptDisable, HC_INTERRUPT::MIE::SET.value);

        let mut control = self.control_register();
        control.modify(
            HC_CONTROL::PLE::CLEAR
                + HC_CONTROL::IE::CLEAR
                + HC_CONTROL::CLE::CLEAR
                + HC_CONTROL::BLE::CLEAR,
        );
        self.regs.write(Reg::Control, control.get());

        self.regs
            .write(Reg::CommandStatus, HC_COMMAND_STATUS::HCR::SET.value);
        time::delay_ms(&self.clock, 2);

        self.regs
            .write(Reg::Control, HC_CONTROL::HCFS::Reset.value);
    }

    fn control_register(&self) -> LocalRegisterCopy<u32, HC_CONTROL::Register> {
        LocalRegisterCopy::new(self.regs.read(Reg::Control))
    }

    pub fn allocate_ed(&self) -> Result<u32, UsbError> {
        self.memory()?.allocate_ed()
    }

    pub fn allocate_td(&self) -> Result<u32, UsbError> {
        self.memory()?.allocate_td()
    }

    /// # Panics
    ///
    /// Panics if `address` was not returned by [`allocate_ed`](Self::allocate_ed)
    /// or was already freed.
    pub fn free_ed(&self, address: u32) {
        match self.memory.as_ref() {
            Some(memory) => memory.free_ed(address),
            None => panic!("OHCI: free of ED {:#x} before memory init", address),
        }
    }

    /// # Panics
    ///
    /// Panics if `address` was not returned by [`allocate_td`](Self::allocate_td)
    /// or was already freed.
    pub fn free_td(&self, address: u32) {
        match self.memory.as_ref() {
            Some(memory) => memory.free_td(address),
            None => panic!("OHCI: free of TD {:#x} before memory init", address),
        }
    }
}
