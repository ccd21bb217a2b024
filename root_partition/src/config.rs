//! Launch configuration
//!
//! Everything here is fixed at build time; the root partition has no
//! file system or command line to read settings from.

use pip::layout::CHILD_LOAD_ADDR;
use pip::VirtualAddress;

use crate::vidt::VidtSlot;

/// How the child is loaded and entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Child-virtual address of the first code page
    pub load_address: VirtualAddress,
    /// Root VIDT entry the root is saved into when it yields
    pub caller_save: VidtSlot,
}

impl LaunchConfig {
    pub const fn new() -> Self {
        Self {
            load_address: CHILD_LOAD_ADDR,
            caller_save: VidtSlot::CallerSaveAlt,
        }
    }

    pub const fn with_load_address(mut self, load_address: VirtualAddress) -> Self {
        self.load_address = load_address;
        self
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self::new()
    }
}
