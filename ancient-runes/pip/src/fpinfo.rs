//! # First Partition Information
//!
//! The block Pip hands to the root partition at boot. The root reads it
//! once, checks the magic, and takes the usable memory range from it.

/// Magic number identifying a valid boot information block
pub const FPINFO_MAGIC: u32 = 0xDEAD_CAFE;

/// Capacity of the revision string, NUL terminator included
pub const REVISION_LEN: usize = 64;

/// Boot information block, as laid out by the hypervisor
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpInfo {
    pub magic: u32,
    /// First byte of memory available to the root partition
    pub membegin: u32,
    /// One past the last byte of memory available to the root partition
    pub memend: u32,
    /// NUL-terminated hypervisor revision
    pub revision: [u8; REVISION_LEN],
}

impl FpInfo {
    /// Build a block the way the hypervisor would (used by tests and tools)
    pub fn new(magic: u32, membegin: u32, memend: u32, revision: &str) -> Self {
        let mut raw = [0u8; REVISION_LEN];
        let len = revision.len().min(REVISION_LEN - 1);
        raw[..len].copy_from_slice(&revision.as_bytes()[..len]);

        Self {
            magic,
            membegin,
            memend,
            revision: raw,
        }
    }

    /// Revision bytes up to the first NUL, or all of them if unterminated
    pub fn revision_bytes(&self) -> &[u8] {
        let end = self
            .revision
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(REVISION_LEN);
        &self.revision[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(core::mem::size_of::<FpInfo>(), 12 + REVISION_LEN);
        assert_eq!(core::mem::offset_of!(FpInfo, revision), 12);
    }

    #[test]
    fn test_revision_stops_at_nul() {
        let info = FpInfo::new(FPINFO_MAGIC, 0, 0, "v1.2-rc");
        assert_eq!(info.revision_bytes(), b"v1.2-rc");
    }

    #[test]
    fn test_unterminated_revision() {
        let mut info = FpInfo::new(FPINFO_MAGIC, 0, 0, "");
        info.revision = [b'x'; REVISION_LEN];
        assert_eq!(info.revision_bytes().len(), REVISION_LEN);
    }

    #[test]
    fn test_long_revision_is_truncated() {
        let long = "r".repeat(100);
        let info = FpInfo::new(FPINFO_MAGIC, 0, 0, &long);
        assert_eq!(info.revision_bytes().len(), REVISION_LEN - 1);
    }
}
