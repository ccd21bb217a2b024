//! # Page Allocator Facade
//!
//! Thin layer over the hypervisor's page free list. Pages come out as
//! `Frame` tokens, which cannot be copied: a frame is either mapped into a
//! child exactly once or folded into a partition, never both.

use core::fmt;
use core::ptr::NonNull;

use pip::{PhysicalAddress, VirtualAddress};

use crate::boot::MemoryRange;
use crate::bootstrap::BootstrapError;
use crate::hypervisor::{Hypervisor, PartitionDescriptor};

/// One page the root may hand to a child
#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
    address: PhysicalAddress,
}

impl Frame {
    /// A page of the root's own image, mapped into the child as code
    pub(crate) fn image_page(address: PhysicalAddress) -> Self {
        debug_assert!(address.is_page_aligned());
        Self { address }
    }

    pub fn address(&self) -> PhysicalAddress {
        self.address
    }
}

/// The five pages consumed by partition creation
#[derive(Debug)]
pub struct PartitionPages {
    pub descriptor: Frame,
    pub page_directory: Frame,
    pub shadow1: Frame,
    pub shadow2: Frame,
    pub config_list: Frame,
}

/// The hypervisor rejected the memory range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingRefused(pub MemoryRange);

impl fmt::Display for PagingRefused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hypervisor refused memory range {}..{}", self.0.begin, self.0.end)
    }
}

/// The hypervisor refused a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRefused;

/// Page allocation and mapping on behalf of the bootstrap
pub struct PageAllocator<'h, H: Hypervisor> {
    hv: &'h mut H,
    handed_out: usize,
}

impl<'h, H: Hypervisor> PageAllocator<'h, H> {
    pub fn new(hv: &'h mut H) -> Self {
        Self { hv, handed_out: 0 }
    }

    /// Give the validated memory range to the hypervisor's free list
    pub fn init(&mut self, range: MemoryRange) -> Result<(), PagingRefused> {
        if self.hv.init_paging(range) {
            crate::serial_println!("[alloc] Free list covers {} pages", range.pages());
            Ok(())
        } else {
            Err(PagingRefused(range))
        }
    }

    /// Take one page
    pub fn allocate_page(&mut self) -> Result<Frame, BootstrapError> {
        let address = self.hv.alloc_page().ok_or(BootstrapError::OutOfPages)?;
        debug_assert!(address.is_page_aligned());
        self.handed_out += 1;
        Ok(Frame { address })
    }

    /// Take the five pages a partition is built from
    pub fn allocate_partition(&mut self) -> Result<PartitionPages, BootstrapError> {
        Ok(PartitionPages {
            descriptor: self.allocate_page()?,
            page_directory: self.allocate_page()?,
            shadow1: self.allocate_page()?,
            shadow2: self.allocate_page()?,
            config_list: self.allocate_page()?,
        })
    }

    /// Build a partition, consuming its pages whether or not it succeeds
    pub fn create_partition(
        &mut self,
        pages: PartitionPages,
    ) -> Result<PartitionDescriptor, BootstrapError> {
        if self.hv.create_partition(&pages) {
            Ok(PartitionDescriptor::from_raw(pages.descriptor.address().as_u32()))
        } else {
            Err(BootstrapError::CreatePartition)
        }
    }

    /// Map `frame` into `child` at `at`
    pub fn map_page(
        &mut self,
        frame: Frame,
        child: PartitionDescriptor,
        at: VirtualAddress,
    ) -> Result<(), MapRefused> {
        if self.hv.map_page(frame.address, child, at) {
            Ok(())
        } else {
            Err(MapRefused)
        }
    }

    /// Root-side view of a page before it is given away
    pub fn window(&mut self, frame: &Frame) -> Option<NonNull<u8>> {
        self.hv.frame(frame.address)
    }

    /// Pages taken from the free list so far
    pub fn handed_out(&self) -> usize {
        self.handed_out
    }
}
