//! OHCI Register Definitions using tock-registers
//!
//! Operational register offsets, bitfield layouts, and the [`OhciRegisters`]
//! seam through which the driver touches the register file.

use crate::drivers::mmio::MmioRegion;
use tock_registers::register_bitfields;
use tock_registers::LocalRegisterCopy;

// ============================================================================
// Register Offsets
// ============================================================================

/// OHCI operational registers used by the driver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum Reg {
    /// Revision
    Revision = 0x00,
    /// Control
    Control = 0x04,
    /// Command Status
    CommandStatus = 0x08,
    /// Interrupt Status (write-1-to-clear)
    InterruptStatus = 0x0C,
    /// Interrupt Enable (write-1-to-set)
    InterruptEnable = 0x10,
    /// Interrupt Disable (write-1-to-clear the enable bit)
    InterruptDisable = 0x14,
    /// HCCA physical address
    Hcca = 0x18,
    /// Control Head ED
    ControlHeadEd = 0x20,
    /// Bulk Head ED
    BulkHeadEd = 0x28,
    /// Frame Interval
    FmInterval = 0x34,
    /// Periodic Start
    PeriodicStart = 0x40,
    /// Root Hub Status
    RhStatus = 0x50,
    /// Root Hub Port Status, port 1
    RhPortStatus1 = 0x54,
}

impl Reg {
    /// Byte offset from the operational register base
    #[inline]
    pub const fn offset(self) -> usize {
        self as usize
    }
}

/// Size of the operational register window
pub const OHCI_MMIO_SIZE: usize = 0x100;

// ============================================================================
// Bitfield Definitions
// ============================================================================

register_bitfields! [
    u32,
    /// HcControl (offset 0x04)
    pub HC_CONTROL [
        /// Control/Bulk Service Ratio
        CBSR OFFSET(0) NUMBITS(2) [],
        /// Periodic List Enable
        PLE OFFSET(2) NUMBITS(1) [],
        /// Isochronous Enable
        IE OFFSET(3) NUMBITS(1) [],
        /// Control List Enable
        CLE OFFSET(4) NUMBITS(1) [],
        /// Bulk List Enable
        BLE OFFSET(5) NUMBITS(1) [],
        /// Host Controller Functional State
        HCFS OFFSET(6) NUMBITS(2) [
            Reset = 0,
            Resume = 1,
            Operational = 2,
            Suspend = 3
        ],
        /// Interrupt Routing
        IR OFFSET(8) NUMBITS(1) [],
        /// Remote Wakeup Connected
        RWC OFFSET(9) NUMBITS(1) [],
        /// Remote Wakeup Enable
        RWE OFFSET(10) NUMBITS(1) []
    ],

    /// HcCommandStatus (offset 0x08), write-1-to-set
    pub HC_COMMAND_STATUS [
        /// Host Controller Reset
        HCR OFFSET(0) NUMBITS(1) [],
        /// Control List Filled
        CLF OFFSET(1) NUMBITS(1) [],
        /// Bulk List Filled
        BLF OFFSET(2) NUMBITS(1) [],
        /// Ownership Change Request
        OCR OFFSET(3) NUMBITS(1) [],
        /// Scheduling Overrun Count
        SOC OFFSET(16) NUMBITS(2) []
    ],

    /// HcInterruptStatus / HcInterruptEnable / HcInterruptDisable
    pub HC_INTERRUPT [
        /// Scheduling Overrun
        SO OFFSET(0) NUMBITS(1) [],
        /// Writeback Done Head
        WDH OFFSET(1) NUMBITS(1) [],
        /// Start of Frame
        SF OFFSET(2) NUMBITS(1) [],
        /// Resume Detected
        RD OFFSET(3) NUMBITS(1) [],
        /// Unrecoverable Error
        UE OFFSET(4) NUMBITS(1) [],
        /// Frame Number Overflow
        FNO OFFSET(5) NUMBITS(1) [],
        /// Root Hub Status Change
        RHSC OFFSET(6) NUMBITS(1) [],
        /// Ownership Change
        OC OFFSET(30) NUMBITS(1) [],
        /// Master Interrupt Enable (enable/disable registers only)
        MIE OFFSET(31) NUMBITS(1) []
    ],

    /// HcFmInterval (offset 0x34)
    pub HC_FM_INTERVAL [
        /// Frame Interval
        FI OFFSET(0) NUMBITS(14) [],
        /// Largest Data Packet
        FSMPS OFFSET(16) NUMBITS(15) [],
        /// Frame Interval Toggle
        FIT OFFSET(31) NUMBITS(1) []
    ],

    /// HcRhStatus (offset 0x50)
    pub HC_RH_STATUS [
        /// Local Power Status (read) / Clear Global Power (write)
        LPS OFFSET(0) NUMBITS(1) [],
        /// Over Current Indicator
        OCI OFFSET(1) NUMBITS(1) [],
        /// Device Remote Wakeup Enable
        DRWE OFFSET(15) NUMBITS(1) [],
        /// Local Power Status Change (write: Set Global Power)
        LPSC OFFSET(16) NUMBITS(1) [],
        /// Over Current Indicator Change
        OCIC OFFSET(17) NUMBITS(1) [],
        /// Clear Remote Wakeup Enable
        CRWE OFFSET(31) NUMBITS(1) []
    ],

    /// HcRhPortStatus[n] (offset 0x54 + 4n); change bits are write-1-to-clear
    pub HC_RH_PORT_STATUS [
        /// Current Connect Status
        CCS OFFSET(0) NUMBITS(1) [],
        /// Port Enable Status
        PES OFFSET(1) NUMBITS(1) [],
        /// Port Suspend Status
        PSS OFFSET(2) NUMBITS(1) [],
        /// Port Over Current Indicator
        POCI OFFSET(3) NUMBITS(1) [],
        /// Port Reset Status (write: Set Port Reset)
        PRS OFFSET(4) NUMBITS(1) [],
        /// Port Power Status
        PPS OFFSET(8) NUMBITS(1) [],
        /// Low Speed Device Attached
        LSDA OFFSET(9) NUMBITS(1) [],
        /// Connect Status Change
        CSC OFFSET(16) NUMBITS(1) [],
        /// Port Enable Status Change
        PESC OFFSET(17) NUMBITS(1) [],
        /// Port Suspend Status Change
        PSSC OFFSET(18) NUMBITS(1) [],
        /// Port Over Current Indicator Change
        OCIC OFFSET(19) NUMBITS(1) [],
        /// Port Reset Status Change
        PRSC OFFSET(20) NUMBITS(1) []
    ]
];

/// Decoded snapshot of the interrupt cause bits
pub type InterruptCauses = LocalRegisterCopy<u32, HC_INTERRUPT::Register>;

/// Decoded snapshot of HcRhPortStatus
pub type PortStatus = LocalRegisterCopy<u32, HC_RH_PORT_STATUS::Register>;

/// Mask for the Done Head field: bit 0 flags "other interrupts pending"
pub const DONE_HEAD_ADDR_MASK: u32 = !1;

// ============================================================================
// Register Backend
// ============================================================================

/// Access to the OHCI operational register file
///
/// Implementations must perform each call as a single 32-bit access with no
/// read-modify-write of their own: several registers are write-1-to-clear and
/// a stray write-back would acknowledge unrelated events.
pub trait OhciRegisters: Sync {
    fn read(&self, reg: Reg) -> u32;
    fn write(&self, reg: Reg, value: u32);

    /// Read the interrupt status register
    #[inline]
    fn interrupt_status(&self) -> InterruptCauses {
        InterruptCauses::new(self.read(Reg::InterruptStatus))
    }

    /// Read HcRhPortStatus1
    #[inline]
    fn port_status(&self) -> PortStatus {
        PortStatus::new(self.read(Reg::RhPortStatus1))
    }
}

/// Register backend for a memory-mapped controller
pub struct MmioRegisters {
    mmio: MmioRegion,
}

impl MmioRegisters {
    /// Wrap the operational register window of a controller
    pub fn new(mmio: MmioRegion) -> Self {
        Self { mmio }
    }

    /// Controller revision, BCD encoded (0x10 for OHCI 1.0)
    pub fn revision(&self) -> u8 {
        (self.mmio.read32(Reg::Revision.offset()) & 0xFF) as u8
    }
}

impl OhciRegisters for MmioRegisters {
    #[inline]
    fn read(&self, reg: Reg) -> u32 {
        self.mmio.read32(reg.offset())
    }

    #[inline]
    fn write(&self, reg: Reg, value: u32) {
        self.mmio.write32(reg.offset(), value)
    }
}
