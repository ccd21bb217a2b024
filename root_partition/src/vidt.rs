//! # Virtual Interrupt Descriptor Table
//!
//! Pip's replacement for the IDT: one page per partition, 256 entries,
//! each the partition-virtual address of a saved `Context` or zero.
//! A partition only ever writes its own table.

use core::fmt;

use pip::layout::VIDT_ENTRIES;
use pip::VirtualAddress;

/// The entries the root partition gives a meaning to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VidtSlot {
    /// Where a partition is entered by default
    Resume = 0,
    Timer = 32,
    Keyboard = 33,
    /// Where the caller is saved when the root yields to its child
    CallerSave = 48,
    /// Written together with `CallerSave`
    CallerSaveAlt = 49,
}

impl VidtSlot {
    pub const fn index(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for VidtSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.index())
    }
}

/// A partition's VIDT page
#[repr(C, align(4096))]
#[derive(Clone, PartialEq, Eq)]
pub struct Vidt {
    entries: [u32; VIDT_ENTRIES],
}

const _: () = assert!(core::mem::size_of::<Vidt>() == pip::PAGE_SIZE as usize);

impl Vidt {
    pub const fn new() -> Self {
        Self { entries: [0; VIDT_ENTRIES] }
    }

    /// Context address at `index`, `None` when the entry is empty
    pub fn get(&self, index: u8) -> Option<VirtualAddress> {
        match self.entries[index as usize] {
            0 => None,
            raw => Some(VirtualAddress::new(raw)),
        }
    }

    pub fn set(&mut self, index: u8, context: VirtualAddress) {
        self.entries[index as usize] = context.as_u32();
    }

    pub fn slot(&self, slot: VidtSlot) -> Option<VirtualAddress> {
        self.get(slot.index())
    }

    pub fn set_slot(&mut self, slot: VidtSlot, context: VirtualAddress) {
        self.set(slot.index(), context);
    }

    /// Point both caller save slots at `context`
    pub fn set_caller_save(&mut self, context: VirtualAddress) {
        self.set_slot(VidtSlot::CallerSave, context);
        self.set_slot(VidtSlot::CallerSaveAlt, context);
    }

    /// Every non-empty entry with its index
    pub fn populated(&self) -> impl Iterator<Item = (u8, VirtualAddress)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, raw)| **raw != 0)
            .map(|(index, raw)| (index as u8, VirtualAddress::new(*raw)))
    }
}

impl Default for Vidt {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Vidt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.populated()).finish()
    }
}
