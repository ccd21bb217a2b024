//! Mock Hypervisor - In-memory hypervisor for testing
//!
//! Hands out pages from a small arena standing in for the root's memory,
//! remembers every mapping so tests can look at a child through its own
//! address space, and records each hypercall in order.

use std::collections::{BTreeMap, VecDeque};
use std::ptr::NonNull;
use std::vec::Vec;

use pip::{PhysicalAddress, VirtualAddress, PAGE_SIZE};

use crate::allocator::PartitionPages;
use crate::boot::MemoryRange;
use crate::context::Context;
use crate::dispatch::YieldRequest;
use crate::hypervisor::{Hypervisor, PartitionDescriptor};
use crate::vidt::Vidt;

/// First address of the arena
pub const MOCK_MEMBEGIN: u32 = 0x0100_0000;

/// Pages in the arena
pub const MOCK_PAGES: usize = 16;

#[repr(C, align(4096))]
struct Page([u8; PAGE_SIZE as usize]);

/// One recorded hypercall
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    InitPaging(MemoryRange),
    AllocPage(Option<PhysicalAddress>),
    CreatePartition { descriptor: PhysicalAddress },
    MapPage {
        page: PhysicalAddress,
        child: PartitionDescriptor,
        at: VirtualAddress,
    },
    Yield(YieldRequest),
}

/// Mock hypervisor implementation
///
/// Failure knobs are set up front with the builder methods; every call
/// after that behaves like Pip would for the configured situation.
pub struct MockHypervisor {
    arena: Vec<Page>,
    next_page: usize,
    page_limit: usize,
    refuse_paging: bool,
    fail_create: bool,
    failing_map: Option<VirtualAddress>,
    yield_script: VecDeque<u32>,
    mappings: BTreeMap<(PartitionDescriptor, VirtualAddress), PhysicalAddress>,
    calls: Vec<Call>,
}

impl MockHypervisor {
    pub fn new() -> Self {
        Self {
            arena: (0..MOCK_PAGES).map(|_| Page([0; PAGE_SIZE as usize])).collect(),
            next_page: 0,
            page_limit: MOCK_PAGES,
            refuse_paging: false,
            fail_create: false,
            failing_map: None,
            yield_script: VecDeque::new(),
            mappings: BTreeMap::new(),
            calls: Vec::new(),
        }
    }

    /// Stop handing out pages after `count` allocations
    pub fn exhaust_after(mut self, count: usize) -> Self {
        self.page_limit = count.min(MOCK_PAGES);
        self
    }

    pub fn refuse_paging(mut self) -> Self {
        self.refuse_paging = true;
        self
    }

    pub fn fail_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Refuse any mapping at `at`
    pub fn fail_map_at(mut self, at: VirtualAddress) -> Self {
        self.failing_map = Some(at);
        self
    }

    /// Statuses returned by successive yields
    ///
    /// Running past the end of the script panics, which keeps a looping
    /// dispatcher from hanging a test.
    pub fn with_yields(mut self, statuses: &[u32]) -> Self {
        self.yield_script.extend(statuses.iter().copied());
        self
    }

    /// The arena as a memory range
    pub fn range(&self) -> MemoryRange {
        MemoryRange {
            begin: PhysicalAddress::new(MOCK_MEMBEGIN),
            end: PhysicalAddress::new(MOCK_MEMBEGIN + MOCK_PAGES as u32 * PAGE_SIZE),
        }
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Every mapping request, in order, successful or not
    pub fn map_calls(&self) -> Vec<(PhysicalAddress, VirtualAddress)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::MapPage { page, at, .. } => Some((*page, *at)),
                _ => None,
            })
            .collect()
    }

    pub fn yields(&self) -> Vec<YieldRequest> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Yield(request) => Some(*request),
                _ => None,
            })
            .collect()
    }

    /// Resolve a child-virtual address through the recorded mappings
    pub fn translate(&self, child: PartitionDescriptor, at: VirtualAddress) -> Option<PhysicalAddress> {
        let page = self.mappings.get(&(child, at.page_base()))?;
        page.checked_add(at.page_offset())
    }

    /// Read a context the way the hypervisor would find it in `child`
    pub fn read_context(&self, child: PartitionDescriptor, at: VirtualAddress) -> Option<Context> {
        let phys = self.translate(child, at)?;
        let page = self.page(phys.page_base())?;
        let offset = phys.page_offset() as usize;
        assert!(offset + core::mem::size_of::<Context>() <= PAGE_SIZE as usize);
        Some(unsafe { page.0.as_ptr().add(offset).cast::<Context>().read() })
    }

    /// The VIDT mapped into `child`
    pub fn read_vidt(&self, child: PartitionDescriptor) -> Option<Vidt> {
        let phys = self.translate(child, pip::layout::VIDT_ADDR)?;
        let page = self.page(phys)?;
        Some(unsafe { page.0.as_ptr().cast::<Vidt>().read() })
    }

    fn index_of(&self, page: PhysicalAddress) -> Option<usize> {
        let offset = page.as_u32().checked_sub(MOCK_MEMBEGIN)?;
        let index = (offset / PAGE_SIZE) as usize;
        (page.is_page_aligned() && index < self.arena.len()).then_some(index)
    }

    fn page(&self, page: PhysicalAddress) -> Option<&Page> {
        self.index_of(page).map(|index| &self.arena[index])
    }
}

impl Hypervisor for MockHypervisor {
    fn init_paging(&mut self, range: MemoryRange) -> bool {
        self.calls.push(Call::InitPaging(range));
        !self.refuse_paging
    }

    fn alloc_page(&mut self) -> Option<PhysicalAddress> {
        let page = (self.next_page < self.page_limit).then(|| {
            let address = PhysicalAddress::new(MOCK_MEMBEGIN + self.next_page as u32 * PAGE_SIZE);
            self.next_page += 1;
            address
        });
        self.calls.push(Call::AllocPage(page));
        page
    }

    fn create_partition(&mut self, pages: &PartitionPages) -> bool {
        self.calls.push(Call::CreatePartition {
            descriptor: pages.descriptor.address(),
        });
        !self.fail_create
    }

    fn map_page(&mut self, page: PhysicalAddress, child: PartitionDescriptor, at: VirtualAddress) -> bool {
        self.calls.push(Call::MapPage { page, child, at });
        if self.failing_map == Some(at) {
            return false;
        }
        self.mappings.insert((child, at), page);
        true
    }

    fn yield_to(&mut self, request: &YieldRequest) -> u32 {
        self.calls.push(Call::Yield(*request));
        match self.yield_script.pop_front() {
            Some(status) => status,
            None => panic!("yield script exhausted after {} yields", self.yields().len()),
        }
    }

    fn frame(&mut self, page: PhysicalAddress) -> Option<NonNull<u8>> {
        let index = self.index_of(page)?;
        Some(NonNull::from(&mut self.arena[index].0).cast())
    }
}
