//! # Context-Transfer Dispatcher
//!
//! Once the child exists the root has one job left: give it the CPU.
//! The dispatcher fills the root's own VIDT so that Pip knows where to
//! save the root and where to deliver its interrupts, then yields to the
//! child for as long as the hypervisor keeps bringing it back.
//!
//! Every refused transfer is fatal. There is nothing else to run.

use core::fmt;

use pip::calls::*;
use pip::VirtualAddress;

use crate::context::ROOT_SETUP_CONTEXT;
use crate::hypervisor::{Hypervisor, PartitionDescriptor};
use crate::launch::BootResult;
use crate::vidt::{Vidt, VidtSlot};

/// Arguments of one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YieldRequest {
    pub target: PartitionDescriptor,
    /// Entry of the target's VIDT to resume
    pub target_vector: VidtSlot,
    /// Entry of the caller's VIDT to save into
    pub caller_save: VidtSlot,
    pub flags_on_yield: u32,
    pub flags_on_wake: u32,
}

impl YieldRequest {
    /// Resume `target` at its default entry, saving the caller in `caller_save`
    pub fn resume(target: PartitionDescriptor, caller_save: VidtSlot) -> Self {
        Self {
            target,
            target_vector: VidtSlot::Resume,
            caller_save,
            flags_on_yield: 0,
            flags_on_wake: 0,
        }
    }
}

/// The caller was scheduled again after a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resumed;

/// Why the hypervisor refused a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldError {
    InvalidInterruptLevel,
    InvalidSaveIndex,
    /// The root has no parent to yield to
    RootCaller,
    InvalidChild,
    TargetVidtUnavailable,
    CallerVidtUnavailable,
    InterruptsMasked,
    TargetContextUnavailable,
    CallerContextSave,
    /// A status this root does not know about
    Unexpected(u32),
}

impl YieldError {
    /// Decode a raw `Pip_Yield` status
    pub fn from_status(status: u32) -> Result<Resumed, YieldError> {
        Err(match status {
            YIELD_SUCCESS => return Ok(Resumed),
            FAIL_INVALID_INT_LEVEL => YieldError::InvalidInterruptLevel,
            FAIL_INVALID_CTX_SAVE_INDEX => YieldError::InvalidSaveIndex,
            FAIL_ROOT_CALLER => YieldError::RootCaller,
            FAIL_INVALID_CHILD => YieldError::InvalidChild,
            FAIL_UNAVAILABLE_TARGET_VIDT => YieldError::TargetVidtUnavailable,
            FAIL_UNAVAILABLE_CALLER_VIDT => YieldError::CallerVidtUnavailable,
            FAIL_MASKED_INTERRUPT => YieldError::InterruptsMasked,
            FAIL_UNAVAILABLE_TARGET_CTX => YieldError::TargetContextUnavailable,
            FAIL_CALLER_CONTEXT_SAVE => YieldError::CallerContextSave,
            other => YieldError::Unexpected(other),
        })
    }
}

impl fmt::Display for YieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YieldError::InvalidInterruptLevel => write!(f, "Yield failed: invalid interrupt level"),
            YieldError::InvalidSaveIndex => write!(f, "Yield failed: invalid context save index"),
            YieldError::RootCaller => write!(f, "Yield failed: root partition has no parent"),
            YieldError::InvalidChild => write!(f, "Yield failed: target is not a child"),
            YieldError::TargetVidtUnavailable => write!(f, "Yield failed: target VIDT unavailable"),
            YieldError::CallerVidtUnavailable => write!(f, "Yield failed: caller VIDT unavailable"),
            YieldError::InterruptsMasked => write!(f, "Yield failed: interrupt masked by target"),
            YieldError::TargetContextUnavailable => {
                write!(f, "Yield failed: target context unavailable")
            }
            YieldError::CallerContextSave => write!(f, "Yield failed: caller context could not be saved"),
            YieldError::Unexpected(status) => write!(f, "Yield failed: unexpected yield status {:#x}", status),
        }
    }
}

/// Perform one transfer and decode its outcome
pub fn yield_to<H: Hypervisor>(hv: &mut H, request: &YieldRequest) -> Result<Resumed, YieldError> {
    YieldError::from_status(hv.yield_to(request))
}

/// Keep resuming `child` until a transfer is refused
pub fn resume_child<H: Hypervisor>(
    hv: &mut H,
    child: PartitionDescriptor,
    save: VidtSlot,
) -> YieldError {
    let request = YieldRequest::resume(child, save);
    loop {
        if let Err(e) = yield_to(hv, &request) {
            return e;
        }
    }
}

/// Where the root's handler contexts live, in the root's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerTable {
    pub timer: VirtualAddress,
    pub keyboard: VirtualAddress,
}

/// Owns the root's VIDT and its transfers to the child
pub struct Dispatcher<'a, H: Hypervisor> {
    hv: &'a mut H,
    vidt: &'a mut Vidt,
    child: PartitionDescriptor,
}

impl<'a, H: Hypervisor> Dispatcher<'a, H> {
    pub fn new(hv: &'a mut H, vidt: &'a mut Vidt, boot: &BootResult) -> Self {
        Self {
            hv,
            vidt,
            child: boot.child,
        }
    }

    /// Prepare the root VIDT; must run before the first transfer
    pub fn install(&mut self, handlers: &HandlerTable) {
        self.vidt.set_caller_save(ROOT_SETUP_CONTEXT);
        self.register(VidtSlot::Timer, handlers.timer);
        self.register(VidtSlot::Keyboard, handlers.keyboard);
        crate::serial_println!(
            "[dispatch] Root VIDT ready: save {}, timer {}, keyboard {}",
            ROOT_SETUP_CONTEXT,
            handlers.timer,
            handlers.keyboard
        );
    }

    /// Point `slot` of the root VIDT at a handler context
    pub fn register(&mut self, slot: VidtSlot, context: VirtualAddress) {
        self.vidt.set_slot(slot, context);
    }

    /// One transfer to the child
    pub fn transfer(&mut self, save: VidtSlot) -> Result<Resumed, YieldError> {
        yield_to(&mut *self.hv, &YieldRequest::resume(self.child, save))
    }

    /// Transfer to the child until the hypervisor refuses
    pub fn run(&mut self, save: VidtSlot) -> YieldError {
        crate::serial_println!("[dispatch] Yielding to child {}", self.child);
        loop {
            if let Err(e) = self.transfer(save) {
                return e;
            }
        }
    }

    pub fn vidt(&self) -> &Vidt {
        self.vidt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_zero_is_resumed() {
        assert_eq!(YieldError::from_status(0), Ok(Resumed));
    }

    #[test]
    fn test_known_statuses() {
        let expected = [
            YieldError::InvalidInterruptLevel,
            YieldError::InvalidSaveIndex,
            YieldError::RootCaller,
            YieldError::InvalidChild,
            YieldError::TargetVidtUnavailable,
            YieldError::CallerVidtUnavailable,
            YieldError::InterruptsMasked,
            YieldError::TargetContextUnavailable,
            YieldError::CallerContextSave,
        ];
        for (status, error) in (1u32..).zip(expected) {
            assert_eq!(YieldError::from_status(status), Err(error));
        }
    }

    #[test]
    fn test_unknown_status_is_unexpected() {
        let err = YieldError::from_status(0xFF).unwrap_err();
        assert_eq!(err, YieldError::Unexpected(0xFF));
        let msg = format!("{}", err);
        assert!(msg.contains("unexpected"));
        assert!(msg.contains("0xff"));
    }

    #[test]
    fn test_resume_request_defaults() {
        let child = PartitionDescriptor::from_raw(0x0020_0000);
        let request = YieldRequest::resume(child, VidtSlot::CallerSaveAlt);
        assert_eq!(request.target_vector, VidtSlot::Resume);
        assert_eq!(request.caller_save.index(), 49);
        assert_eq!(request.flags_on_yield, 0);
        assert_eq!(request.flags_on_wake, 0);
    }
}
