//! # Hypervisor Interface
//!
//! Everything the root partition asks of Pip goes through the `Hypervisor`
//! trait. On bare metal `PipHypervisor` forwards to libpip; tests swap in
//! an in-memory double that records each call.

use core::fmt;
use core::ptr::NonNull;

use pip::{PhysicalAddress, VirtualAddress};

use crate::allocator::PartitionPages;
use crate::boot::MemoryRange;
use crate::dispatch::YieldRequest;

/// Opaque handle naming a child partition
///
/// On Pip this is the address of the partition's descriptor page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PartitionDescriptor(u32);

impl PartitionDescriptor {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PartitionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// The hypercalls used by the root partition
pub trait Hypervisor {
    /// Hand `range` to the hypervisor's page free list
    fn init_paging(&mut self, range: MemoryRange) -> bool;

    /// Take one free page, `None` when the free list is exhausted
    fn alloc_page(&mut self) -> Option<PhysicalAddress>;

    /// Turn five fresh pages into a child partition
    fn create_partition(&mut self, pages: &PartitionPages) -> bool;

    /// Map one of the caller's pages into `child` at `at`
    fn map_page(
        &mut self,
        page: PhysicalAddress,
        child: PartitionDescriptor,
        at: VirtualAddress,
    ) -> bool;

    /// Transfer execution; returns the raw status once the caller runs again
    fn yield_to(&mut self, request: &YieldRequest) -> u32;

    /// Root-side window onto an allocated page
    fn frame(&mut self, page: PhysicalAddress) -> Option<NonNull<u8>>;
}

/// libpip-backed hypervisor
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub struct PipHypervisor;

#[cfg(all(target_arch = "x86", target_os = "none"))]
impl Hypervisor for PipHypervisor {
    fn init_paging(&mut self, range: MemoryRange) -> bool {
        unsafe {
            pip::calls::ffi::Pip_InitPaging(
                range.begin.as_u32() as *mut core::ffi::c_void,
                range.end.as_u32() as *mut core::ffi::c_void,
            ) != 0
        }
    }

    fn alloc_page(&mut self) -> Option<PhysicalAddress> {
        let page = unsafe { pip::calls::ffi::Pip_AllocPage() };
        if page.is_null() {
            None
        } else {
            Some(PhysicalAddress::new(page as u32))
        }
    }

    fn create_partition(&mut self, pages: &PartitionPages) -> bool {
        unsafe {
            pip::calls::ffi::Pip_CreatePartition(
                pages.descriptor.address().as_u32(),
                pages.page_directory.address().as_u32(),
                pages.shadow1.address().as_u32(),
                pages.shadow2.address().as_u32(),
                pages.config_list.address().as_u32(),
            ) != 0
        }
    }

    fn map_page(
        &mut self,
        page: PhysicalAddress,
        child: PartitionDescriptor,
        at: VirtualAddress,
    ) -> bool {
        unsafe { pip::calls::ffi::Pip_MapPageWrapper(page.as_u32(), child.as_u32(), at.as_u32()) != 0 }
    }

    fn yield_to(&mut self, request: &YieldRequest) -> u32 {
        unsafe {
            pip::calls::ffi::Pip_Yield(
                request.target.as_u32(),
                request.target_vector.index() as u32,
                request.caller_save.index() as u32,
                request.flags_on_yield,
                request.flags_on_wake,
            )
        }
    }

    fn frame(&mut self, page: PhysicalAddress) -> Option<NonNull<u8>> {
        // The root's pages are identity mapped
        NonNull::new(page.as_u32() as *mut u8)
    }
}
