//! # Pip - The Runes of the Protokernel
//!
//! The binary contract between a partition and the Pip hypervisor.
//! Everything in this crate must match the hypervisor bit for bit:
//! the page size, the fixed virtual layout every partition shares,
//! the boot information block, and the hypercall status codes.
//!
//! ## Layout
//! - [`addr`]: physical and virtual page addresses as distinct types
//! - [`layout`]: the well-known virtual addresses of every partition
//! - [`fpinfo`]: the boot information block handed to the root partition
//! - [`calls`]: hypercall status codes and the raw libpip bindings

#![cfg_attr(not(test), no_std)]

pub mod addr;
pub mod calls;
pub mod fpinfo;
pub mod layout;

pub use addr::{PhysicalAddress, VirtualAddress, PAGE_SIZE};
pub use fpinfo::{FpInfo, FPINFO_MAGIC};
