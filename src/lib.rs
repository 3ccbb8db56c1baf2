//! CrabOHCI - host-side driver core for USB 1.1 OHCI controllers
//!
//! This library provides the pieces of an OHCI host stack that sit directly on
//! the controller: descriptor memory, endpoint list control, root hub
//! connect/disconnect handling and done-queue processing. Device enumeration
//! and class drivers live upstream, behind
//! [`HostEventListener`](drivers::usb::HostEventListener).

#![cfg_attr(not(test), no_std)]

pub mod drivers;
pub mod logger;
pub mod time;

pub use drivers::usb::ohci::{OhciConfig, OhciHost};
pub use drivers::usb::{HostEventListener, UsbError};
