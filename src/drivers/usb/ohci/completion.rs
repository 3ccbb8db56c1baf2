//! Writeback Done Head servicing

use super::events::HostEvent;
use super::memory::HostMemory;
use super::regs::{DONE_HEAD_ADDR_MASK, HC_INTERRUPT, OhciRegisters, Reg};
use super::OhciHost;
use crate::drivers::usb::controller::HostEventListener;
use crate::time::Clock;

impl<R, C, L> OhciHost<R, C, L>
where
    R: OhciRegisters,
    C: Clock,
    L: HostEventListener,
{
    /// Hand the retired TD chain upstream and acknowledge WDH
    ///
    /// TDs are not freed here; the listener owns that. If the chain cannot be
    /// handed off yet, WDH stays latched so the controller keeps the done head
    /// untouched until it can.
    pub(super) fn service_done_head(&self, memory: &HostMemory) {
        let done_head = memory.done_head() & DONE_HEAD_ADDR_MASK;
        if done_head == 0 {
            log::warn!("OHCI: WDH raised with an empty done head");
        } else {
            log::trace!("OHCI: done head {:#x}", done_head);
        }

        if !self.dispatch_event(memory, HostEvent::TransferCompleted { done_head }, 0) {
            self.hold_causes(HC_INTERRUPT::WDH::SET.value);
            return;
        }

        self.regs
            .write(Reg::InterruptStatus, HC_INTERRUPT::WDH::SET.value);
    }
}
