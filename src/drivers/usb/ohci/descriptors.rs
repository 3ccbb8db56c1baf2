//! OHCI hardware-visible data structures
//!
//! Layouts are fixed by the controller: the HCCA is 256 bytes on a 256-byte
//! boundary, general EDs and TDs are 16 bytes on 16-byte boundaries.

use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Host Controller Communication Area (256 bytes, 256-byte aligned)
#[repr(C, align(256))]
#[derive(Clone, Copy, FromBytes, Immutable, KnownLayout)]
pub struct Hcca {
    /// Interrupt table (32 entries); slot 0 heads the interrupt ED list
    pub interrupt_table: [u32; 32],
    /// Frame number
    pub frame_number: u16,
    /// Pad
    pub pad1: u16,
    /// Done head
    pub done_head: u32,
    /// Reserved
    pub reserved: [u8; 120],
}

/// HCCA size in bytes
pub const HCCA_SIZE: usize = core::mem::size_of::<Hcca>();

/// Endpoint Descriptor (16 bytes, 16-byte aligned)
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, Immutable, KnownLayout)]
pub struct EndpointDescriptor {
    /// Control
    pub control: u32,
    /// Tail TD pointer
    pub tail_td: u32,
    /// Head TD pointer
    pub head_td: u32,
    /// Next ED pointer
    pub next_ed: u32,
}

/// ED size in bytes
pub const ED_SIZE: usize = core::mem::size_of::<EndpointDescriptor>();

impl EndpointDescriptor {
    pub const CTRL_FA_MASK: u32 = 0x7F; // Function address
    pub const CTRL_EN_SHIFT: u32 = 7; // Endpoint number
    pub const CTRL_EN_MASK: u32 = 0xF << 7;
    pub const CTRL_D_OUT: u32 = 1 << 11;
    pub const CTRL_D_IN: u32 = 2 << 11;
    pub const CTRL_S: u32 = 1 << 13; // Speed (1 = low speed)
    pub const CTRL_K: u32 = 1 << 14; // Skip
    pub const CTRL_F: u32 = 1 << 15; // Format (1 = isochronous)
    pub const CTRL_MPS_SHIFT: u32 = 16;
    pub const CTRL_MPS_MASK: u32 = 0x7FF << 16;

    pub const HEAD_HALTED: u32 = 1 << 0;
    pub const HEAD_TOGGLE: u32 = 1 << 1;
    /// Low bits of the TD pointers that are flags, not address
    pub const PTR_MASK: u32 = !0xF;

    /// Build an ED for `endpoint` of the device at `device_addr`
    ///
    /// `direction_bits` is one of `CTRL_D_OUT`, `CTRL_D_IN`, or 0 to take the
    /// direction from each TD (control endpoints).
    pub fn new(
        device_addr: u8,
        endpoint: u8,
        max_packet: u16,
        low_speed: bool,
        direction_bits: u32,
    ) -> Self {
        let mut control = (device_addr as u32) & Self::CTRL_FA_MASK;
        control |= ((endpoint as u32) << Self::CTRL_EN_SHIFT) & Self::CTRL_EN_MASK;
        control |= ((max_packet as u32) << Self::CTRL_MPS_SHIFT) & Self::CTRL_MPS_MASK;
        control |= direction_bits & (Self::CTRL_D_OUT | Self::CTRL_D_IN);
        if low_speed {
            control |= Self::CTRL_S;
        }

        Self {
            control,
            ..Self::default()
        }
    }

    pub fn is_halted(&self) -> bool {
        (self.head_td & Self::HEAD_HALTED) != 0
    }

    pub fn is_skipped(&self) -> bool {
        (self.control & Self::CTRL_K) != 0
    }

    /// Head and tail point at the same TD
    pub fn is_empty(&self) -> bool {
        (self.head_td & Self::PTR_MASK) == (self.tail_td & Self::PTR_MASK)
    }
}

/// General Transfer Descriptor (16 bytes, 16-byte aligned)
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, Immutable, KnownLayout)]
pub struct TransferDescriptor {
    /// Control
    pub control: u32,
    /// Current Buffer Pointer
    pub cbp: u32,
    /// Next TD
    pub next_td: u32,
    /// Buffer End
    pub be: u32,
}

/// TD size in bytes
pub const TD_SIZE: usize = core::mem::size_of::<TransferDescriptor>();

impl TransferDescriptor {
    pub const CTRL_R: u32 = 1 << 18; // Buffer Rounding
    pub const CTRL_DP_SETUP: u32 = 0 << 19;
    pub const CTRL_DP_OUT: u32 = 1 << 19;
    pub const CTRL_DP_IN: u32 = 2 << 19;
    pub const CTRL_DI_SHIFT: u32 = 21; // Delay Interrupt
    pub const CTRL_DI_NONE: u32 = 7 << 21;
    pub const CTRL_T_DATA0: u32 = 2 << 24;
    pub const CTRL_T_DATA1: u32 = 3 << 24;
    pub const CTRL_CC_SHIFT: u32 = 28; // Condition Code
    pub const CTRL_CC_NOT_ACCESSED: u32 = 0xF << 28;

    pub const CC_NO_ERROR: u32 = 0;
    pub const CC_STALL: u32 = 4;
    pub const CC_DEVICE_NOT_RESPONDING: u32 = 5;
    pub const CC_DATA_UNDERRUN: u32 = 9;
    pub const CC_NOT_ACCESSED: u32 = 14;

    /// Condition code written back by the controller
    pub fn condition_code(&self) -> u32 {
        (self.control >> Self::CTRL_CC_SHIFT) & 0xF
    }

    /// The controller has retired this TD
    pub fn is_complete(&self) -> bool {
        self.condition_code() < Self::CC_NOT_ACCESSED
    }

    pub fn has_error(&self) -> bool {
        let cc = self.condition_code();
        self.is_complete() && cc != Self::CC_NO_ERROR && cc != Self::CC_DATA_UNDERRUN
    }

    /// Address of the next TD with flag bits stripped
    pub fn next(&self) -> u32 {
        self.next_td & EndpointDescriptor::PTR_MASK
    }
}
