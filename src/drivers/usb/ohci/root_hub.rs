//! Root hub status change handling and port reset
//!
//! Connection state is not tracked here. Each RHSC interrupt is decoded from
//! the current port status plus whichever change bits are asserted.

use super::events::HostEvent;
use super::memory::HostMemory;
use super::regs::{
    DONE_HEAD_ADDR_MASK, HC_INTERRUPT, HC_RH_PORT_STATUS, HC_RH_STATUS, InterruptCauses,
    OhciRegisters, Reg,
};
use super::OhciHost;
use crate::drivers::usb::controller::{HostEventListener, ROOT_HUB_PORT, UsbError};
use crate::time::{self, Clock, Timeout};
use tock_registers::LocalRegisterCopy;

impl<R, C, L> OhciHost<R, C, L>
where
    R: OhciRegisters,
    C: Clock,
    L: HostEventListener,
{
    /// Handle a Root Hub Status Change interrupt
    ///
    /// Returns `true` if WDH raised in the same interrupt must not be serviced
    /// separately: the disconnect path either consumed it or held it back
    /// together with RHSC.
    pub(super) fn service_root_hub(&self, memory: &HostMemory, causes: InterruptCauses) -> bool {
        let wdh_pending = causes.is_set(HC_INTERRUPT::WDH);
        let mut done_head_consumed = false;

        if self.regs.port_status().is_set(HC_RH_PORT_STATUS::CSC) {
            let rh_status =
                LocalRegisterCopy::<u32, HC_RH_STATUS::Register>::new(self.regs.read(Reg::RhStatus));

            let accepted = if rh_status.is_set(HC_RH_STATUS::DRWE) {
                // With DRWE set a connect status change is a remote wakeup
                log::debug!("OHCI: remote wakeup on port {}", ROOT_HUB_PORT);
                true
            } else if self.regs.port_status().is_set(HC_RH_PORT_STATUS::CCS) {
                self.on_connect(memory)
            } else {
                done_head_consumed = wdh_pending;
                self.on_disconnect(memory, wdh_pending)
            };

            if !accepted {
                // CSC stays latched so the change is decoded again later
                let mut held = HC_INTERRUPT::RHSC::SET.value;
                if done_head_consumed {
                    held |= HC_INTERRUPT::WDH::SET.value;
                }
                self.hold_causes(held);
                return done_head_consumed;
            }

            self.regs
                .write(Reg::RhPortStatus1, HC_RH_PORT_STATUS::CSC::SET.value);
        }

        if self.regs.port_status().is_set(HC_RH_PORT_STATUS::PRSC) {
            self.regs
                .write(Reg::RhPortStatus1, HC_RH_PORT_STATUS::PRSC::SET.value);
        }

        self.regs
            .write(Reg::InterruptStatus, HC_INTERRUPT::RHSC::SET.value);
        done_head_consumed
    }

    fn on_connect(&self, memory: &HostMemory) -> bool {
        match self.config.debounce_mode {
            super::DebounceMode::Inline => {
                time::delay_ms(&self.clock, self.config.connect_debounce_ms);
                self.dispatch_event(memory, HostEvent::Connected, 0)
            }
            super::DebounceMode::Deferred => self.dispatch_event(
                memory,
                HostEvent::Connected,
                self.config.connect_debounce_ms,
            ),
        }
    }

    /// Returns whether the disconnect was handed to the listener
    ///
    /// A WDH pending alongside is acknowledged here only if it was.
    fn on_disconnect(&self, memory: &HostMemory, wdh_pending: bool) -> bool {
        // Without a WDH in this interrupt the done head holds nothing valid
        let done_head = if wdh_pending {
            memory.done_head() & DONE_HEAD_ADDR_MASK
        } else {
            memory.clear_done_head();
            0
        };

        if !self.dispatch_event(
            memory,
            HostEvent::Disconnected { done_head },
            self.config.disconnect_debounce_ms,
        ) {
            return false;
        }

        if wdh_pending {
            // The chain went out with the disconnect; don't report it twice
            memory.clear_done_head();
            self.regs
                .write(Reg::InterruptStatus, HC_INTERRUPT::WDH::SET.value);
        }
        true
    }

    /// Drive a reset on the root hub port
    ///
    /// Sets PRS, waits for the controller to clear it, allows the recovery
    /// interval, then acknowledges PRSC.
    pub fn reset_root_hub(&self) -> Result<(), UsbError> {
        self.regs
            .write(Reg::RhPortStatus1, HC_RH_PORT_STATUS::PRS::SET.value);

        let timeout = Timeout::from_ms(&self.clock, self.config.port_reset_timeout_ms);
        while self.regs.port_status().is_set(HC_RH_PORT_STATUS::PRS) {
            if timeout.is_expired() {
                log::warn!("OHCI: port {} reset did not complete", ROOT_HUB_PORT);
                return Err(UsbError::Timeout);
            }
            core::hint::spin_loop();
        }

        time::delay_ms(&self.clock, self.config.port_reset_recovery_ms);

        self.regs
            .write(Reg::RhPortStatus1, HC_RH_PORT_STATUS::PRSC::SET.value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::drivers::usb::ohci::regs::{HC_INTERRUPT, HC_RH_PORT_STATUS, HC_RH_STATUS, Reg};
    use crate::drivers::usb::ohci::testing::{Notification, TestHost};
    use crate::drivers::usb::ohci::{DebounceMode, OhciConfig};
    use crate::drivers::usb::controller::UsbError;

    const CSC: u32 = 1 << 16;
    const CCS: u32 = 1 << 0;
    const LSDA: u32 = 1 << 9;
    const PRSC: u32 = 1 << 20;
    const RHSC: u32 = 1 << 6;
    const WDH: u32 = 1 << 1;

    #[test]
    fn connect_is_debounced_then_reported_once() {
        let t = TestHost::new(OhciConfig::new());
        t.regs().set(Reg::RhPortStatus1, CSC | CCS | LSDA);
        t.raise(RHSC);

        t.host.handle_interrupt();

        assert_eq!(
            t.notifications(),
            [Notification::Connected {
                hub: 0,
                port: 1,
                low_speed: true
            }]
        );
        assert!(t.clock.peek_ms() >= 150);
        assert_eq!(t.regs().acks(Reg::RhPortStatus1, HC_RH_PORT_STATUS::CSC::SET.value), 1);
        assert_eq!(t.regs().acks(Reg::InterruptStatus, RHSC), 1);
        assert_eq!(t.regs().get(Reg::RhPortStatus1) & CSC, 0);
    }

    #[test]
    fn disconnect_without_done_head_clears_it_first() {
        let t = TestHost::new(OhciConfig::new());
        t.memory().write_done_head(0x2007_C5A1);
        t.regs().set(Reg::RhPortStatus1, CSC);
        t.raise(RHSC);

        t.host.handle_interrupt();

        assert_eq!(
            t.notifications(),
            [Notification::Disconnected {
                hub: 0,
                port: 1,
                driver: None,
                done_head: 0,
                hcca_done_head_at_call: 0,
            }]
        );
        assert!(t.clock.peek_ms() >= 200);
        assert_eq!(t.regs().acks(Reg::InterruptStatus, WDH), 0);
        assert_eq!(t.regs().acks(Reg::RhPortStatus1, CSC), 1);
    }

    #[test]
    fn disconnect_racing_done_head_reports_chain_once() {
        let t = TestHost::new(OhciConfig::new());
        let head = t.retire_chain(2);
        // Bit 0 set: the controller flags other pending interrupts
        t.memory().write_done_head(head | 1);
        t.regs().set(Reg::RhPortStatus1, CSC);
        t.raise(RHSC | WDH);

        t.host.handle_interrupt();

        // Reported with the pre-clear value, before the HCCA was cleared
        assert_eq!(
            t.notifications(),
            [Notification::Disconnected {
                hub: 0,
                port: 1,
                driver: None,
                done_head: head,
                hcca_done_head_at_call: head | 1,
            }]
        );
        assert_eq!(t.memory().done_head(), 0);
        assert_eq!(t.regs().acks(Reg::InterruptStatus, WDH), 1);
        assert_eq!(t.regs().acks(Reg::InterruptStatus, RHSC), 1);
        // The listener released the chain exactly once
        assert_eq!(t.memory().tds().in_use(), 0);
    }

    #[test]
    fn remote_wakeup_takes_no_connect_action() {
        let t = TestHost::new(OhciConfig::new());
        t.regs().set(Reg::RhStatus, HC_RH_STATUS::DRWE::SET.value);
        t.regs().set(Reg::RhPortStatus1, CSC | CCS);
        t.raise(RHSC);

        t.host.handle_interrupt();

        assert!(t.notifications().is_empty());
        assert_eq!(t.regs().acks(Reg::RhPortStatus1, CSC), 1);
        assert_eq!(t.regs().acks(Reg::InterruptStatus, RHSC), 1);
    }

    #[test]
    fn reset_change_is_acknowledged_on_its_own() {
        let t = TestHost::new(OhciConfig::new());
        t.regs().set(Reg::RhPortStatus1, CCS | PRSC);
        t.raise(RHSC);

        t.host.handle_interrupt();

        assert!(t.notifications().is_empty());
        assert_eq!(t.regs().acks(Reg::RhPortStatus1, PRSC), 1);
        assert_eq!(t.regs().acks(Reg::RhPortStatus1, CSC), 0);
        assert_eq!(t.regs().acks(Reg::InterruptStatus, HC_INTERRUPT::RHSC::SET.value), 1);
    }

    #[test]
    fn deferred_connect_waits_for_poll_after_deadline() {
        let t = TestHost::frozen(OhciConfig::deferred());
        t.regs().set(Reg::RhPortStatus1, CSC | CCS);
        t.raise(RHSC);

        t.host.handle_interrupt();

        // The interrupt path acknowledged everything without blocking
        assert_eq!(t.clock.peek_ms(), 0);
        assert_eq!(t.regs().acks(Reg::RhPortStatus1, CSC), 1);
        assert_eq!(t.host.poll_deferred(), 0);

        t.clock.advance_ms(149);
        assert_eq!(t.host.poll_deferred(), 0);
        assert!(t.notifications().is_empty());

        t.clock.advance_ms(1);
        assert_eq!(t.host.poll_deferred(), 1);
        assert_eq!(t.host.poll_deferred(), 0);
        assert_eq!(
            t.notifications(),
            [Notification::Connected {
                hub: 0,
                port: 1,
                low_speed: false
            }]
        );
    }

    #[test]
    fn deferred_connect_samples_speed_after_debounce() {
        let t = TestHost::frozen(OhciConfig::deferred());
        t.regs().set(Reg::RhPortStatus1, CSC | CCS);
        t.raise(RHSC);
        t.host.handle_interrupt();

        // LSDA settles while the debounce runs
        t.regs().assert_bits(Reg::RhPortStatus1, LSDA);
        t.clock.advance_ms(150);
        assert_eq!(t.host.poll_deferred(), 1);

        assert_eq!(
            t.notifications(),
            [Notification::Connected {
                hub: 0,
                port: 1,
                low_speed: true
            }]
        );
    }

    #[test]
    fn disconnect_held_back_keeps_done_head_and_wdh() {
        let t = TestHost::new(OhciConfig::new());
        let head = t.retire_chain(2);
        t.memory().write_done_head(head);
        t.regs().set(Reg::RhPortStatus1, CSC);
        t.raise(RHSC | WDH);

        t.host.with_listener(|_| t.host.handle_interrupt());

        // Nothing acknowledged, and the chain was not reported as a completion
        assert!(t.regs().writes_to(Reg::InterruptStatus).is_empty());
        assert_eq!(t.regs().acks(Reg::RhPortStatus1, CSC), 0);
        assert_eq!(t.memory().done_head(), head);
        assert!(t.notifications().is_empty());

        t.host.handle_interrupt();

        assert_eq!(
            t.notifications(),
            [Notification::Disconnected {
                hub: 0,
                port: 1,
                driver: None,
                done_head: head,
                hcca_done_head_at_call: head,
            }]
        );
        assert_eq!(t.memory().done_head(), 0);
        assert_eq!(t.memory().tds().in_use(), 0);
        assert_eq!(t.regs().get(Reg::InterruptStatus), 0);
    }

    #[test]
    fn deferred_disconnect_keeps_captured_done_head() {
        let t = TestHost::frozen(OhciConfig {
            debounce_mode: DebounceMode::Deferred,
            ..OhciConfig::new()
        });
        let head = t.retire_chain(1);
        t.memory().write_done_head(head);
        t.regs().set(Reg::RhPortStatus1, CSC);
        t.raise(RHSC | WDH);

        t.host.handle_interrupt();

        assert_eq!(t.memory().done_head(), 0);
        assert_eq!(t.regs().acks(Reg::InterruptStatus, WDH), 1);

        t.clock.advance_ms(200);
        assert_eq!(t.host.poll_deferred(), 1);
        assert_eq!(
            t.notifications(),
            [Notification::Disconnected {
                hub: 0,
                port: 1,
                driver: None,
                done_head: head,
                hcca_done_head_at_call: 0,
            }]
        );
    }

    #[test]
    fn port_reset_waits_for_controller_then_acks() {
        let t = TestHost::new(OhciConfig::new());

        assert_eq!(t.host.reset_root_hub(), Ok(()));

        let writes = t.regs().writes_to(Reg::RhPortStatus1);
        assert_eq!(writes, [HC_RH_PORT_STATUS::PRS::SET.value, PRSC]);
        assert_eq!(t.regs().get(Reg::RhPortStatus1) & PRSC, 0);
    }

    #[test]
    fn port_reset_gives_up_after_timeout() {
        let t = TestHost::new(OhciConfig::new());
        t.regs().hold_port_reset();

        assert_eq!(t.host.reset_root_hub(), Err(UsbError::Timeout));
        assert_eq!(t.regs().writes_to(Reg::RhPortStatus1).len(), 1);
    }
}
