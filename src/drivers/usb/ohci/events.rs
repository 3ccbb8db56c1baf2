//! Event delivery to the upstream listener
//!
//! Root hub and completion events reach the listener either directly from the
//! interrupt handler (after a busy-wait debounce) or through a lock-free
//! queue drained by [`OhciHost::poll_deferred`] in task context.
//!
//! An event that cannot be handed off (queue full, or the listener locked by
//! the code the interrupt preempted) is not dropped. Its cause is left
//! unacknowledged and masked in HcInterruptEnable, and is unmasked again once
//! task context releases the listener or drains the queue. The controller then
//! raises it again.

use super::OhciHost;
use super::config::DebounceMode;
use super::done_queue::DoneQueue;
use super::memory::HostMemory;
use super::regs::{HC_RH_PORT_STATUS, OhciRegisters, Reg};
use crate::drivers::usb::controller::{
    HostEventListener, ROOT_HUB_INDEX, ROOT_HUB_PORT, UsbSpeed,
};
use crate::time::{self, Clock};
use core::sync::atomic::{AtomicU32, Ordering};
use heapless::mpmc::Q8;

/// Something the listener must hear about
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HostEvent {
    /// Speed is sampled from LSDA when the event is delivered
    Connected,
    Disconnected { done_head: u32 },
    TransferCompleted { done_head: u32 },
}

#[derive(Clone, Copy, Debug)]
struct PendingEvent {
    event: HostEvent,
    due_ms: u64,
}

/// Events recorded in interrupt context, waiting for their debounce deadline
///
/// The interrupt side only enqueues. The task side dequeues and parks the
/// oldest not-yet-due event in `held`, so delivery stays in arrival order.
pub(crate) struct DeferredEvents {
    queue: Q8<PendingEvent>,
    held: spin::Mutex<Option<PendingEvent>>,
    /// Interrupt causes masked until task context makes room
    masked_causes: AtomicU32,
}

impl DeferredEvents {
    pub(crate) const fn new() -> Self {
        Self {
            queue: Q8::new(),
            held: spin::Mutex::new(None),
            masked_causes: AtomicU32::new(0),
        }
    }

    /// Returns `false` if the queue is full
    fn push(&self, event: HostEvent, due_ms: u64) -> bool {
        if self.queue.enqueue(PendingEvent { event, due_ms }).is_err() {
            log::warn!("OHCI: deferred event queue full, holding {:?}", event);
            return false;
        }
        true
    }

    fn pop_due(&self, now_ms: u64) -> Option<HostEvent> {
        let mut held = self.held.lock();
        let next = held.take().or_else(|| self.queue.dequeue())?;
        if next.due_ms <= now_ms {
            Some(next.event)
        } else {
            *held = Some(next);
            None
        }
    }
}

impl<R, C, L> OhciHost<R, C, L>
where
    R: OhciRegisters,
    C: Clock,
    L: HostEventListener,
{
    /// Hand `event` to the listener once `settle_ms` has passed
    ///
    /// Inline mode blocks the caller for `settle_ms`; deferred mode returns
    /// immediately. Returns `false` if the event could not be handed off; the
    /// caller must then leave its cause unacknowledged and call
    /// [`hold_causes`](Self::hold_causes).
    #[must_use]
    pub(super) fn dispatch_event(
        &self,
        memory: &HostMemory,
        event: HostEvent,
        settle_ms: u64,
    ) -> bool {
        match self.config.debounce_mode {
            DebounceMode::Inline => {
                if settle_ms > 0 {
                    time::delay_ms(&self.clock, settle_ms);
                }
                // Interrupt context: never spin on a lock the preempted code
                // may hold
                let Some(mut listener) = self.listener.try_lock() else {
                    log::warn!("OHCI: listener busy, holding {:?}", event);
                    return false;
                };
                self.deliver(memory, event, &mut listener);
                true
            }
            DebounceMode::Deferred => {
                let due_ms = self.clock.now_ms() + settle_ms;
                self.deferred.push(event, due_ms)
            }
        }
    }

    /// Mask `causes` until task context can take more events
    pub(super) fn hold_causes(&self, causes: u32) {
        self.deferred
            .masked_causes
            .fetch_or(causes, Ordering::AcqRel);
        self.regs.write(Reg::InterruptDisable, causes);
    }

    /// Unmask causes held back by [`hold_causes`](Self::hold_causes)
    pub(super) fn release_held_causes(&self) {
        let causes = self.deferred.masked_causes.swap(0, Ordering::AcqRel);
        if causes != 0 {
            log::debug!("OHCI: re-enabling held interrupt causes {:#x}", causes);
            self.regs.write(Reg::InterruptEnable, causes);
        }
    }

    fn deliver(&self, memory: &HostMemory, event: HostEvent, listener: &mut L) {
        match event {
            HostEvent::Connected => {
                let low_speed = self.regs.port_status().is_set(HC_RH_PORT_STATUS::LSDA);
                log::info!(
                    "OHCI: device connected on port {} ({:?} speed)",
                    ROOT_HUB_PORT,
                    UsbSpeed::from_ohci(low_speed)
                );
                listener.device_connected(ROOT_HUB_INDEX, ROOT_HUB_PORT, low_speed);
            }
            HostEvent::Disconnected { done_head } => {
                log::info!("OHCI: device disconnected from port {}", ROOT_HUB_PORT);
                listener.device_disconnected(
                    ROOT_HUB_INDEX,
                    ROOT_HUB_PORT,
                    None,
                    DoneQueue::new(memory, done_head),
                );
            }
            HostEvent::TransferCompleted { done_head } => {
                listener.transfer_completed(DoneQueue::new(memory, done_head));
            }
        }
    }

    /// Deliver every deferred event whose debounce deadline has passed
    ///
    /// Call periodically from task context when the host runs with
    /// [`DebounceMode::Deferred`]. Returns the number of events delivered.
    pub fn poll_deferred(&self) -> usize {
        let Some(memory) = self.memory.as_ref() else {
            return 0;
        };

        let mut delivered = 0;
        {
            let mut listener = self.listener.lock();
            while let Some(event) = self.deferred.pop_due(self.clock.now_ms()) {
                self.deliver(memory, event, &mut listener);
                delivered += 1;
            }
        }
        self.release_held_causes();
        delivered
    }
}
