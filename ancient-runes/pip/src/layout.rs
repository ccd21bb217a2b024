//! # Layout - The Shared Map of Every Partition
//!
//! Pip gives each partition its own address space, but every one of them
//! is drawn from the same template. These addresses are part of the
//! hypervisor contract and are identical in the root and in its children.

use crate::addr::{VirtualAddress, PAGE_SIZE};

/// Page holding the initial stack of a partition
pub const INITIAL_STACK_TOP: VirtualAddress = VirtualAddress::new(0xFFFF_E000);

/// Page holding the partition's VIDT
pub const VIDT_ADDR: VirtualAddress = VirtualAddress::new(0xFFFF_F000);

/// Page holding the boot information block
pub const BOOTINFO_ADDR: VirtualAddress = VirtualAddress::new(0xFFFF_C000);

/// Where the child image is loaded unless configured otherwise
pub const CHILD_LOAD_ADDR: VirtualAddress = VirtualAddress::new(0x0070_0000);

/// One past the last byte of the initial stack page
pub const STACK_END: VirtualAddress = VirtualAddress::new(INITIAL_STACK_TOP.as_u32() + PAGE_SIZE);

/// Number of entries in a VIDT
pub const VIDT_ENTRIES: usize = 256;

const _: () = assert!(INITIAL_STACK_TOP.is_page_aligned());
const _: () = assert!(VIDT_ADDR.is_page_aligned());
const _: () = assert!(BOOTINFO_ADDR.is_page_aligned());
const _: () = assert!(CHILD_LOAD_ADDR.is_page_aligned());
