//! # Launch Sequence
//!
//! Validate the boot block, hand memory to the hypervisor, build the
//! child. The result carries everything the dispatcher needs, so nothing
//! about the child lives in a global.

use core::fmt;

use pip::FpInfo;

use crate::allocator::{PageAllocator, PagingRefused};
use crate::boot::{self, BootError, BootSummary};
use crate::bootstrap::{self, BootstrapError, CodeImage};
use crate::config::LaunchConfig;
use crate::hypervisor::{Hypervisor, PartitionDescriptor};

/// A child partition ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootResult {
    pub child: PartitionDescriptor,
    pub summary: BootSummary,
}

/// Anything that stops the root before the first transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchError {
    Boot(BootError),
    Paging(PagingRefused),
    Bootstrap(BootstrapError),
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchError::Boot(e) => write!(f, "Boot information rejected: {}", e),
            LaunchError::Paging(e) => write!(f, "Paging initialization failed: {}", e),
            LaunchError::Bootstrap(e) => write!(f, "Child bootstrap failed: {}", e),
        }
    }
}

impl From<BootError> for LaunchError {
    fn from(e: BootError) -> Self {
        LaunchError::Boot(e)
    }
}

impl From<PagingRefused> for LaunchError {
    fn from(e: PagingRefused) -> Self {
        LaunchError::Paging(e)
    }
}

impl From<BootstrapError> for LaunchError {
    fn from(e: BootstrapError) -> Self {
        LaunchError::Bootstrap(e)
    }
}

/// Bring up the child described by `image`
pub fn launch<H: Hypervisor>(
    hv: &mut H,
    info: &FpInfo,
    config: &LaunchConfig,
    image: CodeImage,
) -> Result<BootResult, LaunchError> {
    let summary = boot::validate(info)?;
    boot::report(&summary);
    crate::serial_println!(
        "\tChild image         = {}..{} ({} bytes)",
        image.base,
        image.base.as_u32().wrapping_add(image.size),
        image.size
    );

    PageAllocator::new(hv).init(summary.memory)?;

    let child = bootstrap::bootstrap(hv, image, config.load_address)?;

    Ok(BootResult { child, summary })
}
