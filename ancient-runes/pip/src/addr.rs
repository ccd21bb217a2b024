//! # Addresses - Two Worlds, Two Maps
//!
//! A page the root partition allocates has two names. The root knows it by
//! its [`PhysicalAddress`] and writes through it directly. The child that
//! receives the page knows it only by the [`VirtualAddress`] it was mapped
//! at. The two are never interchangeable, so they are never convertible.

use core::fmt;

/// Size of one page, the unit of every allocation and mapping
pub const PAGE_SIZE: u32 = 4096;

const PAGE_MASK: u32 = PAGE_SIZE - 1;

/// Root-side address of memory the root partition can write directly
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PhysicalAddress(u32);

/// Address inside a partition's own address space
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualAddress(u32);

macro_rules! address_ops {
    ($name:ident) => {
        impl $name {
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            pub const fn as_u32(self) -> u32 {
                self.0
            }

            pub const fn is_page_aligned(self) -> bool {
                self.0 & PAGE_MASK == 0
            }

            /// The page this address falls in
            pub const fn page_base(self) -> Self {
                Self(self.0 & !PAGE_MASK)
            }

            /// Offset of this address inside its page
            pub const fn page_offset(self) -> u32 {
                self.0 & PAGE_MASK
            }

            /// Add a byte offset, `None` past the end of the 32-bit space
            pub const fn checked_add(self, offset: u32) -> Option<Self> {
                match self.0.checked_add(offset) {
                    Some(raw) => Some(Self(raw)),
                    None => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#010x}", self.0)
            }
        }
    };
}

address_ops!(PhysicalAddress);
address_ops!(VirtualAddress);
