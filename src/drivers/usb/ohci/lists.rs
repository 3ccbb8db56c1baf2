//! Endpoint list enable/disable and list head access

use super::OhciHost;
use super::regs::{HC_COMMAND_STATUS, HC_CONTROL, OhciRegisters, Reg};
use crate::drivers::usb::controller::{EndpointType, HostEventListener, UsbError};
use crate::time::Clock;
use tock_registers::fields::FieldValue;

impl<R, C, L> OhciHost<R, C, L>
where
    R: OhciRegisters,
    C: Clock,
    L: HostEventListener,
{
    fn modify_control(&self, field: FieldValue<u32, HC_CONTROL::Register>) {
        let mut control = self.control_register();
        control.modify(field);
        self.regs.write(Reg::Control, control.get());
    }

    /// Start the controller processing the list for `ty`
    ///
    /// Control and bulk lists are also marked filled so the controller picks
    /// up EDs queued before the enable. Isochronous has no list of its own.
    pub fn enable_list(&self, ty: EndpointType) {
        match ty {
            EndpointType::Control => {
                self.regs
                    .write(Reg::CommandStatus, HC_COMMAND_STATUS::CLF::SET.value);
                self.modify_control(HC_CONTROL::CLE::SET);
            }
            EndpointType::Bulk => {
                self.regs
                    .write(Reg::CommandStatus, HC_COMMAND_STATUS::BLF::SET.value);
                self.modify_control(HC_CONTROL::BLE::SET);
            }
            EndpointType::Interrupt => self.modify_control(HC_CONTROL::PLE::SET),
            EndpointType::Isochronous => {}
        }
    }

    /// Stop the controller processing the list for `ty`
    ///
    /// Returns whether the list was enabled. Nothing is written if it was not.
    pub fn disable_list(&self, ty: EndpointType) -> bool {
        let enable = match ty {
            EndpointType::Control => HC_CONTROL::CLE,
            EndpointType::Bulk => HC_CONTROL::BLE,
            EndpointType::Interrupt => HC_CONTROL::PLE,
            EndpointType::Isochronous => return false,
        };

        if !self.control_register().is_set(enable) {
            return false;
        }
        self.modify_control(enable.val(0));
        true
    }

    pub fn control_head_ed(&self) -> u32 {
        self.regs.read(Reg::ControlHeadEd)
    }

    pub fn update_control_head_ed(&self, address: u32) {
        self.regs.write(Reg::ControlHeadEd, address);
    }

    pub fn bulk_head_ed(&self) -> u32 {
        self.regs.read(Reg::BulkHeadEd)
    }

    pub fn update_bulk_head_ed(&self, address: u32) {
        self.regs.write(Reg::BulkHeadEd, address);
    }

    /// Interrupt list head, kept in HCCA interrupt table slot 0
    pub fn interrupt_head_ed(&self) -> Result<u32, UsbError> {
        Ok(self.memory()?.interrupt_head())
    }

    pub fn update_interrupt_head_ed(&self, address: u32) -> Result<(), UsbError> {
        self.memory()?.set_interrupt_head(address);
        Ok(())
    }
}
