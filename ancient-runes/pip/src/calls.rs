//! # Hypercall Interface for Pip
//!
//! The root partition never touches page tables itself. It asks the
//! hypervisor, through libpip, to hand out pages, build partitions, map
//! pages into them and switch execution between them.
//!
//! ## Calling Convention
//!
//! libpip exposes every hypercall as a plain cdecl function taking and
//! returning 32-bit words. Boolean calls return 0 on failure. `Pip_Yield`
//! returns only when the hypervisor refuses the switch (or when the caller
//! is resumed), with one of the `YIELD_*` status codes below.
//!
//! ## Safety
//!
//! The raw bindings are only linked on bare-metal x86, where libpip is part
//! of the image. Arguments are passed through unchecked; a wrong descriptor
//! or address is reported by the hypervisor, not caught here.

// ============================================================================
// Yield Status Codes
// ============================================================================

/// The caller was resumed normally
pub const YIELD_SUCCESS: u32 = 0;

/// The requested interrupt level is out of range
pub const FAIL_INVALID_INT_LEVEL: u32 = 1;

/// The caller context save index is out of range
pub const FAIL_INVALID_CTX_SAVE_INDEX: u32 = 2;

/// The root partition has no parent to yield to
pub const FAIL_ROOT_CALLER: u32 = 3;

/// The target is not a child of the caller
pub const FAIL_INVALID_CHILD: u32 = 4;

/// The target's VIDT page is not mapped
pub const FAIL_UNAVAILABLE_TARGET_VIDT: u32 = 5;

/// The caller's VIDT page is not mapped
pub const FAIL_UNAVAILABLE_CALLER_VIDT: u32 = 6;

/// The target masks the requested interrupt
pub const FAIL_MASKED_INTERRUPT: u32 = 7;

/// The target's VIDT entry does not reference a usable context
pub const FAIL_UNAVAILABLE_TARGET_CTX: u32 = 8;

/// The caller's context could not be saved at the requested index
pub const FAIL_CALLER_CONTEXT_SAVE: u32 = 9;

// ============================================================================
// Raw Bindings
// ============================================================================

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod ffi {
    use core::ffi::c_void;

    #[allow(non_snake_case)]
    extern "C" {
        /// Hand `[begin, end)` to libpip's page free list
        pub fn Pip_InitPaging(begin: *mut c_void, end: *mut c_void) -> u32;

        /// Take one page from the free list, null when exhausted
        pub fn Pip_AllocPage() -> *mut c_void;

        /// Turn five fresh pages into a child partition
        pub fn Pip_CreatePartition(
            descriptor: u32,
            page_directory: u32,
            shadow1: u32,
            shadow2: u32,
            config_list: u32,
        ) -> u32;

        /// Map one caller page into a child at `destination`
        pub fn Pip_MapPageWrapper(source: u32, partition: u32, destination: u32) -> u32;

        /// Save the caller at `caller_save_index` and resume `callee` at `target_interrupt`
        pub fn Pip_Yield(
            callee: u32,
            target_interrupt: u32,
            caller_save_index: u32,
            flags_on_yield: u32,
            flags_on_wake: u32,
        ) -> u32;
    }
}
