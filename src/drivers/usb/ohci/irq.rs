//! Interrupt dispatch and the platform interrupt binding
//!
//! The platform vector calls [`usb_isr`], which forwards to whichever host is
//! currently bound. Binding is scoped: dropping the [`IrqBinding`] unbinds the
//! host unless a newer one has replaced it.

use super::OhciHost;
use super::regs::{HC_INTERRUPT, InterruptCauses, OhciRegisters, Reg};
use crate::drivers::usb::controller::HostEventListener;
use crate::time::Clock;
use core::ptr;

/// Something the platform interrupt can be routed to
pub trait InterruptHandler: Sync {
    fn handle_interrupt(&self);
}

/// Host currently receiving the USB interrupt
static ACTIVE_HOST: spin::Mutex<Option<&'static dyn InterruptHandler>> = spin::Mutex::new(None);

/// Route the platform interrupt to `handler`
///
/// A later bind replaces an earlier one.
pub fn bind(handler: &'static dyn InterruptHandler) -> IrqBinding {
    if ACTIVE_HOST.lock().replace(handler).is_some() {
        log::debug!("OHCI: interrupt binding replaced");
    }
    IrqBinding { handler }
}

/// Keeps a host bound to the platform interrupt while alive
#[must_use = "dropping the binding unbinds the host immediately"]
pub struct IrqBinding {
    handler: &'static dyn InterruptHandler,
}

impl IrqBinding {
    /// Whether this binding is still the one receiving interrupts
    pub fn is_active(&self) -> bool {
        ACTIVE_HOST
            .lock()
            .is_some_and(|current| ptr::addr_eq(current, self.handler))
    }
}

impl Drop for IrqBinding {
    fn drop(&mut self) {
        let mut active = ACTIVE_HOST.lock();
        if active.is_some_and(|current| ptr::addr_eq(current, self.handler)) {
            *active = None;
        }
    }
}

/// Platform interrupt entry point
///
/// Does nothing if no host is bound, or if the binding is being changed at
/// the moment the interrupt fires (the controller keeps the line asserted
/// until its causes are acknowledged).
pub fn usb_isr() {
    let handler = match ACTIVE_HOST.try_lock() {
        Some(active) => *active,
        None => return,
    };
    if let Some(handler) = handler {
        handler.handle_interrupt();
    }
}

impl<R, C, L> OhciHost<R, C, L>
where
    R: OhciRegisters,
    C: Clock,
    L: HostEventListener,
{
    /// Service every pending, enabled interrupt cause
    ///
    /// Root hub changes are handled before the done head, so a disconnect
    /// racing with transfer completions reports the retired TDs with the
    /// disconnect instead of as a separate completion.
    pub fn handle_interrupt(&self) {
        let raw = self.regs.interrupt_status().get() & self.regs.read(Reg::InterruptEnable);
        if raw == 0 {
            return;
        }
        let causes = InterruptCauses::new(raw);

        let Some(memory) = self.memory.as_ref() else {
            log::warn!("OHCI: interrupt {:#x} before descriptor memory init", raw);
            self.regs.write(Reg::InterruptStatus, raw);
            return;
        };

        let mut done_head_consumed = false;
        if causes.is_set(HC_INTERRUPT::RHSC) {
            done_head_consumed = self.service_root_hub(memory, causes);
        }
        if causes.is_set(HC_INTERRUPT::WDH) && !done_head_consumed {
            self.service_done_head(memory);
        }
        if causes.is_set(HC_INTERRUPT::UE) {
            log::error!("OHCI: unrecoverable error reported by controller");
            self.regs
                .write(Reg::InterruptStatus, HC_INTERRUPT::UE::SET.value);
        }
    }

    /// Route the platform interrupt to this host
    pub fn bind(&'static self) -> IrqBinding
    where
        R: 'static,
        C: 'static,
        L: 'static,
    {
        bind(self)
    }
}

impl<R, C, L> InterruptHandler for OhciHost<R, C, L>
where
    R: OhciRegisters,
    C: Clock,
    L: HostEventListener,
{
    fn handle_interrupt(&self) {
        OhciHost::handle_interrupt(self)
    }
}
