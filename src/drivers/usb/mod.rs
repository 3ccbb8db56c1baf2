//! USB host support
//!
//! # Host Controllers
//! - OHCI (USB 1.1) - Full/Low-speed controller with one root hub port
//!
//! # Architecture
//!
//! The controller driver reports attach, detach and completed transfers
//! through the [`HostEventListener`] trait from the `controller` module; the
//! device-management layer implementing it owns everything above the
//! descriptor level.

pub mod controller;
pub mod ohci;

pub use self::controller::{
    DescriptorKind, DriverHandle, EndpointType, HostEventListener, UsbError, UsbSpeed,
};
