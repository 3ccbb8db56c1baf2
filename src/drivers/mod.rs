//! Hardware drivers for CrabOHCI

pub mod mmio;
pub mod usb;
