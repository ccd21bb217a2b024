//! # Partition Bootstrap
//!
//! Builds the single child partition: five pages for the partition
//! itself, the code image mapped page by page, a stack page holding the
//! entry context, and a VIDT page pointing at that context.
//!
//! Steps run in a fixed order and the first failure ends the attempt.
//! Nothing is rolled back; pages already given to the hypervisor stay
//! where they are.

use core::fmt;

use pip::layout::{BOOTINFO_ADDR, INITIAL_STACK_TOP, VIDT_ADDR};
use pip::{PhysicalAddress, VirtualAddress, PAGE_SIZE};

use crate::allocator::{Frame, PageAllocator};
use crate::context::{self, Context, CHILD_ENTRY_CONTEXT, CONTEXT_SIZE};
use crate::hypervisor::{Hypervisor, PartitionDescriptor};
use crate::vidt::{Vidt, VidtSlot};

/// The child's code, as it sits in the root's memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeImage {
    pub base: PhysicalAddress,
    pub size: u32,
}

impl CodeImage {
    pub const fn new(base: PhysicalAddress, size: u32) -> Self {
        Self { base, size }
    }

    /// Image bounds from a pair of linker symbols
    pub fn from_bounds(start: PhysicalAddress, end: PhysicalAddress) -> Result<Self, BootstrapError> {
        match end.as_u32().checked_sub(start.as_u32()) {
            Some(size) if size > 0 => Ok(Self { base: start, size }),
            _ => Err(BootstrapError::InvalidImage),
        }
    }

    /// Offset of every page the image touches, a partial last page included
    pub fn page_offsets(&self) -> impl Iterator<Item = u32> {
        (0..self.size).step_by(PAGE_SIZE as usize)
    }

    pub fn page_count(&self) -> u32 {
        self.size.div_ceil(PAGE_SIZE)
    }
}

/// Why a bootstrap attempt stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapError {
    /// The hypervisor refused the five partition pages
    CreatePartition,
    /// A code page could not be mapped
    MapChildPage { offset: u32 },
    MapStackPage,
    MapVidtPage,
    /// The free list ran dry
    OutOfPages,
    /// The image or load address is unusable
    InvalidImage,
}

impl BootstrapError {
    /// Numeric code reported on the console
    pub fn code(&self) -> i32 {
        match self {
            BootstrapError::CreatePartition => -1,
            BootstrapError::MapChildPage { .. } => -2,
            BootstrapError::MapStackPage => -3,
            BootstrapError::MapVidtPage => -4,
            BootstrapError::OutOfPages => -5,
            BootstrapError::InvalidImage => -6,
        }
    }
}

impl fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapError::CreatePartition => write!(f, "Failed to create partition"),
            BootstrapError::MapChildPage { offset } => {
                write!(f, "Failed to map code page at offset {:#x}", offset)
            }
            BootstrapError::MapStackPage => write!(f, "Failed to map stack page"),
            BootstrapError::MapVidtPage => write!(f, "Failed to map VIDT page"),
            BootstrapError::OutOfPages => write!(f, "Out of pages"),
            BootstrapError::InvalidImage => write!(f, "Invalid code image or load address"),
        }?;
        write!(f, " (error {})", self.code())
    }
}

/// Build the child partition and make it ready to enter at `load_address`
pub fn bootstrap<H: Hypervisor>(
    hv: &mut H,
    image: CodeImage,
    load_address: VirtualAddress,
) -> Result<PartitionDescriptor, BootstrapError> {
    check_image(&image, load_address)?;

    let mut alloc = PageAllocator::new(hv);

    let pages = alloc.allocate_partition()?;
    let child = alloc.create_partition(pages)?;
    crate::serial_println!("[bootstrap] Created partition {}", child);

    map_code(&mut alloc, child, &image, load_address)?;

    let stack = alloc.allocate_page()?;
    let window = alloc.window(&stack).ok_or(BootstrapError::MapStackPage)?;
    let entry = Context::child_entry(load_address);
    unsafe {
        let slot = window.add((PAGE_SIZE - CONTEXT_SIZE) as usize).cast::<Context>();
        context::publish(slot, &entry);
    }
    alloc
        .map_page(stack, child, INITIAL_STACK_TOP)
        .map_err(|_| BootstrapError::MapStackPage)?;

    let vidt = alloc.allocate_page()?;
    let window = alloc.window(&vidt).ok_or(BootstrapError::MapVidtPage)?;
    let mut table = Vidt::new();
    table.set_slot(VidtSlot::Resume, CHILD_ENTRY_CONTEXT);
    table.set_caller_save(CHILD_ENTRY_CONTEXT);
    unsafe { window.cast::<Vidt>().write(table) };
    alloc
        .map_page(vidt, child, VIDT_ADDR)
        .map_err(|_| BootstrapError::MapVidtPage)?;

    crate::serial_println!(
        "[bootstrap] Child ready: {} code pages at {}, {} pages used",
        image.page_count(),
        load_address,
        alloc.handed_out()
    );
    Ok(child)
}

/// Pages of the child's address space the bootstrap fills itself
const RESERVED_PAGES: [VirtualAddress; 3] = [BOOTINFO_ADDR, INITIAL_STACK_TOP, VIDT_ADDR];

/// Reject images that cannot be mapped before touching the hypervisor
fn check_image(image: &CodeImage, load_address: VirtualAddress) -> Result<(), BootstrapError> {
    if image.size == 0 {
        return Err(BootstrapError::InvalidImage);
    }
    if !image.base.is_page_aligned() || !load_address.is_page_aligned() {
        return Err(BootstrapError::InvalidImage);
    }
    if load_address.checked_add(image.size).is_none() || image.base.checked_add(image.size).is_none() {
        return Err(BootstrapError::InvalidImage);
    }

    // Code must not share a page with the boot block, stack or VIDT
    let start = load_address.as_u32() as u64;
    let end = start + image.size as u64;
    let overlaps = RESERVED_PAGES.iter().any(|page| {
        let page_start = page.as_u32() as u64;
        start < page_start + PAGE_SIZE as u64 && page_start < end
    });
    if overlaps {
        return Err(BootstrapError::InvalidImage);
    }
    Ok(())
}

fn map_code<H: Hypervisor>(
    alloc: &mut PageAllocator<'_, H>,
    child: PartitionDescriptor,
    image: &CodeImage,
    load_address: VirtualAddress,
) -> Result<(), BootstrapError> {
    for offset in image.page_offsets() {
        // Both sums were range checked by check_image
        let page = Frame::image_page(PhysicalAddress::new(image.base.as_u32() + offset));
        let at = VirtualAddress::new(load_address.as_u32() + offset);
        alloc
            .map_page(page, child, at)
            .map_err(|_| BootstrapError::MapChildPage { offset })?;
    }
    Ok(())
}
