//! # The Fatal Path
//!
//! Nothing the root partition detects can be recovered from: a bad boot
//! block, a partition that cannot be built, or a refused transfer all mean
//! the isolation the system relies on cannot be guaranteed. Every such path
//! ends here: name the cause, print `PANIC`, stop forever.

use core::fmt::Display;

/// Report `cause` on the console and halt forever
pub fn fatal(cause: impl Display) -> ! {
    crate::serial_println!("[fatal] {}", cause);
    crate::serial_println!("PANIC");
    halt()
}

/// Stop executing without returning
///
/// Partitions run unprivileged under Pip, so this spins instead of `hlt`.
pub fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
