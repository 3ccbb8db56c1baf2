//! USB Host Core Types
//!
//! Types shared between the host controller driver and the upstream
//! device-management layer: errors, endpoint types, and the callback
//! interface through which the controller reports attach, detach, and
//! completed transfers.
//!
//! # Architecture
//!
//! The stack is organized in layers:
//! - The host controller driver owns registers, descriptor memory and the
//!   interrupt path
//! - The device-management layer implements [`HostEventListener`] and owns
//!   per-device pipe and transfer state

use super::ohci::DoneQueue;
use core::fmt;

// ============================================================================
// USB Speed
// ============================================================================

/// USB device speed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum UsbSpeed {
    /// Low speed (1.5 Mbps) - USB 1.0
    Low = 1,
    /// Full speed (12 Mbps) - USB 1.1
    Full = 2,
}

impl UsbSpeed {
    /// Create from the OHCI port status LSDA bit
    pub fn from_ohci(is_low_speed: bool) -> Self {
        if is_low_speed {
            UsbSpeed::Low
        } else {
            UsbSpeed::Full
        }
    }
}

// ============================================================================
// USB Endpoint Types
// ============================================================================

/// USB endpoint transfer type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EndpointType {
    /// Control endpoint
    Control = 0,
    /// Isochronous endpoint
    Isochronous = 1,
    /// Bulk endpoint
    Bulk = 2,
    /// Interrupt endpoint
    Interrupt = 3,
}

// ============================================================================
// Errors
// ============================================================================

/// Which descriptor pool an operation concerns
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorKind {
    /// Endpoint Descriptor
    Endpoint,
    /// Transfer Descriptor
    Transfer,
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorKind::Endpoint => f.write_str("ED"),
            DescriptorKind::Transfer => f.write_str("TD"),
        }
    }
}

/// USB host controller error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbError {
    /// Controller not ready (descriptor memory not initialized)
    NotReady,
    /// Operation timed out
    Timeout,
    /// Invalid parameter
    InvalidParameter,
    /// Every slot of the descriptor pool is in use
    AllocationExhausted(DescriptorKind),
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbError::NotReady => f.write_str("controller not ready"),
            UsbError::Timeout => f.write_str("operation timed out"),
            UsbError::InvalidParameter => f.write_str("invalid parameter"),
            UsbError::AllocationExhausted(kind) => write!(f, "{} pool exhausted", kind),
        }
    }
}

impl core::error::Error for UsbError {}

// ============================================================================
// Upstream Interface
// ============================================================================

/// Opaque handle of the class driver bound to a device, owned upstream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverHandle(pub u32);

/// Hub index reported for the controller's own root hub
pub const ROOT_HUB_INDEX: u8 = 0;

/// Root hub port reported to the upstream layer (ports count from 1)
pub const ROOT_HUB_PORT: u8 = 1;

/// Callbacks from the host controller into the device-management layer
///
/// Depending on the debounce mode these run either in interrupt context or
/// from [`OhciHost::poll_deferred`](super::ohci::OhciHost::poll_deferred).
/// They must not block.
pub trait HostEventListener: Send {
    /// A device settled on `port` of hub `hub`
    fn device_connected(&mut self, hub: u8, port: u8, low_speed: bool);

    /// A device left `port` of hub `hub`
    ///
    /// `done` carries the transfers that completed in the same interrupt as
    /// the disconnect; it is empty when none did. The listener owns releasing
    /// those TDs.
    fn device_disconnected(
        &mut self,
        hub: u8,
        port: u8,
        driver: Option<DriverHandle>,
        done: DoneQueue<'_>,
    );

    /// The controller retired the TDs in `done`
    ///
    /// The chain is ordered most recently completed first. The listener walks
    /// it and frees each TD back into the pool.
    fn transfer_completed(&mut self, done: DoneQueue<'_>);
}
