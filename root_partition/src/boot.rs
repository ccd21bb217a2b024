//! # Boot Information Validator
//!
//! The first thing the root partition does is read the block the
//! hypervisor left for it. If the magic is wrong nothing else in the block
//! can be trusted, least of all the memory range, so validation happens
//! before any page is allocated.

use core::fmt;
use heapless::String;
use pip::fpinfo::{FpInfo, FPINFO_MAGIC, REVISION_LEN};
use pip::{PhysicalAddress, PAGE_SIZE};

/// Memory handed to the root partition, `[begin, end)`, page aligned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub begin: PhysicalAddress,
    pub end: PhysicalAddress,
}

impl MemoryRange {
    /// Number of whole pages in the range
    pub fn pages(&self) -> u32 {
        (self.end.as_u32() - self.begin.as_u32()) / PAGE_SIZE
    }
}

/// What the root keeps from the boot information block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSummary {
    pub magic: u32,
    pub memory: MemoryRange,
    pub revision: String<REVISION_LEN>,
}

/// Reasons the boot information block is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// Magic number does not match `FPINFO_MAGIC`
    BadMagic(u32),
    /// Memory bounds are not page aligned
    UnalignedRange { begin: u32, end: u32 },
    /// Memory range holds no pages
    EmptyRange { begin: u32, end: u32 },
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::BadMagic(found) => {
                write!(f, "Bad magic number {:#x} (expected {:#x})", found, FPINFO_MAGIC)
            }
            BootError::UnalignedRange { begin, end } => {
                write!(f, "Memory range {:#x}..{:#x} is not page aligned", begin, end)
            }
            BootError::EmptyRange { begin, end } => {
                write!(f, "Memory range {:#x}..{:#x} is empty", begin, end)
            }
        }
    }
}

/// Check the boot information block and extract what the root needs
pub fn validate(info: &FpInfo) -> Result<BootSummary, BootError> {
    if info.magic != FPINFO_MAGIC {
        return Err(BootError::BadMagic(info.magic));
    }

    let begin = PhysicalAddress::new(info.membegin);
    let end = PhysicalAddress::new(info.memend);

    if !begin.is_page_aligned() || !end.is_page_aligned() {
        return Err(BootError::UnalignedRange { begin: info.membegin, end: info.memend });
    }
    if begin >= end {
        return Err(BootError::EmptyRange { begin: info.membegin, end: info.memend });
    }

    Ok(BootSummary {
        magic: info.magic,
        memory: MemoryRange { begin, end },
        revision: decode_revision(info.revision_bytes()),
    })
}

/// Copy the revision, replacing every invalid UTF-8 sequence with `?`
fn decode_revision(bytes: &[u8]) -> String<REVISION_LEN> {
    let mut revision = String::new();
    // Output is never longer than the input, which fits by construction
    for chunk in bytes.utf8_chunks() {
        let _ = revision.push_str(chunk.valid());
        if !chunk.invalid().is_empty() {
            let _ = revision.push('?');
        }
    }
    revision
}

/// Print the boot banner
pub fn report(summary: &BootSummary) {
    crate::serial_println!();
    crate::serial_println!("[boot] Root partition is booting...");
    crate::serial_println!("[boot] BOOTINFO:");
    crate::serial_println!("\tMagic number        = {:#x}", summary.magic);
    crate::serial_println!("\tMemory start        = {}", summary.memory.begin);
    crate::serial_println!("\tMemory end          = {}", summary.memory.end);
    crate::serial_println!("\tPip revision        = {}", summary.revision.as_str());
}
