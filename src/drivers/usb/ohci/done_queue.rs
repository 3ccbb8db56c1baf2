//! Completed-transfer chain handed to the upstream layer
//!
//! When the controller retires TDs it links them through `next_td` and writes
//! the head to HCCA.DoneHead, so the chain runs from the most recently
//! completed TD back to the oldest.

use super::descriptors::TransferDescriptor;
use super::memory::{HostMemory, MAX_TD};

/// One retired TD: its bus address and a snapshot of its contents
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompletedTd {
    pub address: u32,
    pub td: TransferDescriptor,
}

/// Borrowed view of a done-queue chain
#[derive(Clone, Copy)]
pub struct DoneQueue<'a> {
    memory: &'a HostMemory,
    head: u32,
}

impl<'a> DoneQueue<'a> {
    /// `head` must already have the HCCA flag bit masked off
    pub(crate) fn new(memory: &'a HostMemory, head: u32) -> Self {
        Self { memory, head }
    }

    /// Bus address of the most recently completed TD (0 if none)
    pub fn head(&self) -> u32 {
        self.head
    }

    pub fn is_empty(&self) -> bool {
        self.head == 0
    }

    /// Descriptor memory the chain lives in, for freeing TDs
    pub fn memory(&self) -> &'a HostMemory {
        self.memory
    }

    /// Walk the chain, most recently completed first
    ///
    /// Stops at a null link, at a link outside the TD pool, or after
    /// `MAX_TD` entries (a longer chain must contain a cycle).
    pub fn iter(&self) -> DoneIter<'a> {
        DoneIter {
            memory: self.memory,
            next: self.head,
            remaining: MAX_TD,
        }
    }

    /// The chain reversed into the order the controller completed it
    pub fn in_completion_order(&self) -> heapless::Vec<CompletedTd, MAX_TD> {
        let mut ordered: heapless::Vec<CompletedTd, MAX_TD> = self.iter().collect();
        ordered.reverse();
        ordered
    }

    /// Free every TD of the chain back into the pool
    ///
    /// Returns the number of TDs released. A link back to a TD that is no
    /// longer allocated (a corrupted or cyclic chain) ends the walk there.
    pub fn release_all(&self) -> usize {
        let mut released = 0;
        for entry in self.iter() {
            if !self.memory.tds().is_allocated(entry.address) {
                log::error!(
                    "OHCI: done queue revisits free TD {:#x}, stopping release",
                    entry.address
                );
                break;
            }
            self.memory.free_td(entry.address);
            released += 1;
        }
        released
    }
}

impl core::fmt::Debug for DoneQueue<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DoneQueue")
            .field("head", &format_args!("{:#x}", self.head))
            .finish()
    }
}

/// Iterator over a done-queue chain
pub struct DoneIter<'a> {
    memory: &'a HostMemory,
    next: u32,
    remaining: usize,
}

impl Iterator for DoneIter<'_> {
    type Item = CompletedTd;

    fn next(&mut self) -> Option<CompletedTd> {
        if self.next == 0 {
            return None;
        }
        if self.remaining == 0 {
            log::error!("OHCI: done queue longer than {} TDs, stopping walk", MAX_TD);
            self.next = 0;
            return None;
        }
        if self.memory.tds().slot_index(self.next).is_none() {
            log::error!("OHCI: done queue link {:#x} outside TD pool", self.next);
            self.next = 0;
            return None;
        }

        let address = self.next;
        let td = self.memory.read_td(address);
        self.next = td.next();
        self.remaining -= 1;
        Some(CompletedTd { address, td })
    }
}
