//! Test doubles for the OHCI driver: an emulated register file, a recording
//! listener, and a host wired to both.

use super::memory::{HostMemory, TestDmaBuffer};
use super::regs::{OHCI_MMIO_SIZE, OhciRegisters, Reg};
use super::{DoneQueue, OhciConfig, OhciHost};
use crate::drivers::usb::controller::{DriverHandle, HostEventListener};
use crate::drivers::usb::ohci::descriptors::TransferDescriptor;
use crate::time::TestClock;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::boxed::Box;
use std::vec::Vec;

const HCR: u32 = 1 << 0;
const PES: u32 = 1 << 1;
const PRS: u32 = 1 << 4;
const PRSC: u32 = 1 << 20;
/// CSC, PESC, PSSC, OCIC, PRSC
const PORT_CHANGE_BITS: u32 = 0x001F_0000;

/// Register file emulating the side effects the driver relies on
///
/// - HcInterruptStatus and the port change bits are write-1-to-clear
/// - HcInterruptEnable/Disable set and clear the same enable mask
/// - HCR self-clears and PRS completes at once unless held
pub(crate) struct MockRegisters {
    values: [AtomicU32; OHCI_MMIO_SIZE / 4],
    writes: spin::Mutex<Vec<(Reg, u32)>>,
    hold_controller_reset: AtomicBool,
    hold_port_reset: AtomicBool,
}

impl MockRegisters {
    pub(crate) fn new() -> Self {
        Self {
            values: [const { AtomicU32::new(0) }; OHCI_MMIO_SIZE / 4],
            writes: spin::Mutex::new(Vec::new()),
            hold_controller_reset: AtomicBool::new(false),
            hold_port_reset: AtomicBool::new(false),
        }
    }

    fn slot(&self, reg: Reg) -> &AtomicU32 {
        &self.values[reg.offset() / 4]
    }

    /// Set a register as the hardware would, without logging a write
    pub(crate) fn set(&self, reg: Reg, value: u32) {
        self.slot(reg).store(value, Ordering::SeqCst);
    }

    pub(crate) fn get(&self, reg: Reg) -> u32 {
        self.slot(reg).load(Ordering::SeqCst)
    }

    /// Assert bits as the hardware would
    pub(crate) fn assert_bits(&self, reg: Reg, bits: u32) {
        self.slot(reg).fetch_or(bits, Ordering::SeqCst);
    }

    pub(crate) fn writes(&self) -> Vec<(Reg, u32)> {
        self.writes.lock().clone()
    }

    pub(crate) fn writes_to(&self, reg: Reg) -> Vec<u32> {
        self.writes
            .lock()
            .iter()
            .filter(|(r, _)| *r == reg)
            .map(|&(_, value)| value)
            .collect()
    }

    /// Number of writes to `reg` that carried all of `bits`
    pub(crate) fn acks(&self, reg: Reg, bits: u32) -> usize {
        self.writes_to(reg)
            .into_iter()
            .filter(|value| value & bits == bits)
            .count()
    }

    pub(crate) fn clear_log(&self) {
        self.writes.lock().clear();
    }

    pub(crate) fn hold_controller_reset(&self) {
        self.hold_controller_reset.store(true, Ordering::SeqCst);
    }

    pub(crate) fn hold_port_reset(&self) {
        self.hold_port_reset.store(true, Ordering::SeqCst);
    }
}

impl OhciRegisters for MockRegisters {
    fn read(&self, reg: Reg) -> u32 {
        self.get(reg)
    }

    fn write(&self, reg: Reg, value: u32) {
        self.writes.lock().push((reg, value));
        let slot = self.slot(reg);
        match reg {
            Reg::InterruptStatus => {
                slot.fetch_and(!value, Ordering::SeqCst);
            }
            Reg::InterruptEnable => {
                slot.fetch_or(value, Ordering::SeqCst);
            }
            Reg::InterruptDisable => {
                self.slot(Reg::InterruptEnable)
                    .fetch_and(!value, Ordering::SeqCst);
            }
            Reg::CommandStatus => {
                let mut latched = value;
                if !self.hold_controller_reset.load(Ordering::SeqCst) {
                    latched &= !HCR;
                }
                slot.fetch_or(latched, Ordering::SeqCst);
            }
            Reg::RhStatus => {}
            Reg::RhPortStatus1 => {
                slot.fetch_and(!(value & PORT_CHANGE_BITS), Ordering::SeqCst);
                if value & PRS != 0 {
                    if self.hold_port_reset.load(Ordering::SeqCst) {
                        slot.fetch_or(PRS, Ordering::SeqCst);
                    } else {
                        slot.fetch_or(PES | PRSC, Ordering::SeqCst);
                    }
                }
            }
            _ => slot.store(value, Ordering::SeqCst),
        }
    }
}

/// What the listener was told, in order
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Notification {
    Connected {
        hub: u8,
        port: u8,
        low_speed: bool,
    },
    Disconnected {
        hub: u8,
        port: u8,
        driver: Option<DriverHandle>,
        done_head: u32,
        /// HCCA done head as seen from inside the callback
        hcca_done_head_at_call: u32,
    },
    TransferCompleted {
        done_head: u32,
        released: usize,
    },
}

/// Listener that records every callback and releases retired TDs the way an
/// upstream layer would
#[derive(Default)]
pub(crate) struct RecordingListener {
    pub(crate) notifications: Vec<Notification>,
}

impl HostEventListener for RecordingListener {
    fn device_connected(&mut self, hub: u8, port: u8, low_speed: bool) {
        self.notifications.push(Notification::Connected {
            hub,
            port,
            low_speed,
        });
    }

    fn device_disconnected(
        &mut self,
        hub: u8,
        port: u8,
        driver: Option<DriverHandle>,
        done: DoneQueue<'_>,
    ) {
        self.notifications.push(Notification::Disconnected {
            hub,
            port,
            driver,
            done_head: done.head(),
            hcca_done_head_at_call: done.memory().done_head(),
        });
        done.release_all();
    }

    fn transfer_completed(&mut self, done: DoneQueue<'_>) {
        let released = done.release_all();
        self.notifications.push(Notification::TransferCompleted {
            done_head: done.head(),
            released,
        });
    }
}

pub(crate) type MockHost = OhciHost<MockRegisters, &'static TestClock, RecordingListener>;

/// A host on mock registers, a stepping or frozen test clock, and a heap DMA
/// buffer
pub(crate) struct TestHost {
    pub(crate) host: MockHost,
    pub(crate) clock: &'static TestClock,
    buffer: TestDmaBuffer,
}

impl TestHost {
    pub(crate) const HCCA_BUS_ADDRESS: u32 = TestDmaBuffer::BUS_BASE;

    /// Memory initialized; every clock read advances 1 ms
    pub(crate) fn new(config: OhciConfig) -> Self {
        let mut t = Self::with_clock(config, TestClock::stepping(1000));
        t.init_memory().unwrap();
        t
    }

    /// Memory initialized; time only moves through `clock.advance_ms`
    pub(crate) fn frozen(config: OhciConfig) -> Self {
        let mut t = Self::with_clock(config, TestClock::frozen());
        t.init_memory().unwrap();
        t
    }

    pub(crate) fn without_memory(config: OhciConfig) -> Self {
        Self::with_clock(config, TestClock::stepping(1000))
    }

    fn with_clock(config: OhciConfig, clock: TestClock) -> Self {
        let clock: &'static TestClock = Box::leak(Box::new(clock));
        Self {
            host: OhciHost::new(MockRegisters::new(), clock, RecordingListener::default(), config),
            clock,
            buffer: TestDmaBuffer::new(),
        }
    }

    pub(crate) fn init_memory(&mut self) -> Result<(), crate::drivers::usb::UsbError> {
        self.host.mem_init(self.buffer.dma())
    }

    /// Pin the fixture for `'static` uses such as interrupt binding
    pub(crate) fn leak(self) -> &'static TestHost {
        Box::leak(Box::new(self))
    }

    pub(crate) fn regs(&self) -> &MockRegisters {
        self.host.registers()
    }

    pub(crate) fn memory(&self) -> &HostMemory {
        self.host.memory().unwrap()
    }

    /// Assert interrupt causes and make sure they are enabled
    pub(crate) fn raise(&self, causes: u32) {
        self.regs().assert_bits(Reg::InterruptEnable, causes | (1 << 31));
        self.regs().assert_bits(Reg::InterruptStatus, causes);
    }

    /// Retire `count` freshly allocated TDs the way the controller links them
    ///
    /// Returns the head: the most recently retired TD.
    pub(crate) fn retire_chain(&self, count: usize) -> u32 {
        let mut previous = 0;
        for _ in 0..count {
            let address = self.memory().allocate_td().unwrap();
            self.memory().write_td(
                address,
                TransferDescriptor {
                    next_td: previous,
                    ..Default::default()
                },
            );
            previous = address;
        }
        previous
    }

    pub(crate) fn notifications(&self) -> Vec<Notification> {
        self.host
            .with_listener(|listener| listener.notifications.clone())
    }
}
