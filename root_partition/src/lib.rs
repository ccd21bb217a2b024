//! # Root Partition - Pip's First Partition
//!
//! The root partition is the only code Pip starts on its own. It reads
//! the boot information block, builds one child partition out of pages
//! it asks the hypervisor for, and then spends the rest of its life
//! handing the CPU to that child.
//!
//! ## Layout
//! - [`boot`]: boot information validation
//! - [`allocator`]: page allocation and mapping over the hypervisor
//! - [`bootstrap`]: building the child partition
//! - [`dispatch`]: the root VIDT and transfers to the child
//! - [`launch`]: the whole startup sequence, validate to bootstrap
//!
//! Hardware access and the libpip bindings only exist on bare-metal x86;
//! everything else builds and tests on the host against a mock hypervisor.

#![cfg_attr(not(test), no_std)]

pub mod allocator;
pub mod boot;
pub mod bootstrap;
pub mod config;
pub mod console;
pub mod context;
pub mod dispatch;
pub mod hypervisor;
pub mod launch;
pub mod panic;
pub mod vidt;

#[cfg(test)]
mod mock;

pub use bootstrap::{bootstrap, BootstrapError, CodeImage};
pub use config::LaunchConfig;
pub use dispatch::{Dispatcher, HandlerTable, YieldError};
pub use hypervisor::{Hypervisor, PartitionDescriptor};
pub use launch::{launch, BootResult, LaunchError};
