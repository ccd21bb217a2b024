//! # Saved Execution Context
//!
//! The block Pip restores registers from when it enters a partition, and
//! saves them into when it leaves one. A VIDT entry points at one of these.
//!
//! The hypervisor may look at a context as soon as its address is in a
//! VIDT, so a context is never written in place with ordinary stores:
//! `publish` clears `valid`, writes every other word, and sets `valid`
//! last, all through volatile accesses.

use core::ptr::NonNull;

use bitflags::bitflags;
use pip::layout::{BOOTINFO_ADDR, INITIAL_STACK_TOP, STACK_END};
use pip::VirtualAddress;
use volatile::{map_field, VolatilePtr};

/// Size of a context in bytes
pub const CONTEXT_SIZE: u32 = 64;

/// Number of 32-bit words in a context
pub const CONTEXT_WORDS: usize = (CONTEXT_SIZE / 4) as usize;

/// Word index of `valid`
pub const VALID_WORD: usize = 11;

/// Virtual address of the child's entry context: the top of its stack page
pub const CHILD_ENTRY_CONTEXT: VirtualAddress = VirtualAddress::new(STACK_END.as_u32() - CONTEXT_SIZE);

/// Virtual address of the root's own resumable context
pub const ROOT_SETUP_CONTEXT: VirtualAddress = VirtualAddress::new(INITIAL_STACK_TOP.as_u32() - CONTEXT_SIZE);

bitflags! {
    /// The EFLAGS bits a new context cares about
    pub struct EFlags: u32 {
        /// Always reads as one
        const RESERVED_1       = 1 << 1;
        const INTERRUPT_ENABLE = 1 << 9;
        /// Flags a fresh context starts with
        const ENTRY            = Self::RESERVED_1.bits | Self::INTERRUPT_ENABLE.bits;
    }
}

/// General purpose registers in `pushad` order
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushadRegs {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
}

/// A saved execution context, as laid out by Pip
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    pub eip: u32,
    /// Hypervisor-private, passed through untouched
    pub pipflags: u32,
    pub eflags: u32,
    pub regs: PushadRegs,
    /// 1 once every other field holds its final value
    pub valid: u32,
    pub nfu: [u32; 4],
}

const _: () = assert!(core::mem::size_of::<Context>() == CONTEXT_SIZE as usize);

/// One word store of `publish`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldWrite {
    pub word: usize,
    pub value: u32,
}

impl Context {
    /// An all-zero, invalid context
    pub const fn empty() -> Self {
        Self {
            eip: 0,
            pipflags: 0,
            eflags: 0,
            regs: PushadRegs {
                edi: 0,
                esi: 0,
                ebp: 0,
                esp: 0,
                ebx: 0,
                edx: 0,
                ecx: 0,
                eax: 0,
            },
            valid: 0,
            nfu: [0; 4],
        }
    }

    /// A context entering at `eip` whose frame ends at `frame_top`
    ///
    /// The context itself occupies the top `CONTEXT_SIZE` bytes of the
    /// frame, so the stack pointer starts just below it.
    pub fn new(eip: VirtualAddress, frame_top: u32) -> Self {
        let mut ctx = Self::empty();
        ctx.eip = eip.as_u32();
        ctx.eflags = EFlags::ENTRY.bits();
        ctx.regs.ebp = frame_top;
        ctx.regs.esp = frame_top - CONTEXT_SIZE;
        ctx.valid = 1;
        ctx
    }

    /// The first context of a child loaded at `load_address`
    pub fn child_entry(load_address: VirtualAddress) -> Self {
        Self::new(load_address, STACK_END.as_u32()).with_ebx(BOOTINFO_ADDR.as_u32())
    }

    /// A root handler context running on its own stack
    ///
    /// `argument` arrives in `ebx`, which is how the handler learns which
    /// partition it serves.
    pub fn handler(entry: u32, stack_top: u32, argument: u32) -> Self {
        let mut ctx = Self::empty();
        ctx.eip = entry;
        ctx.eflags = EFlags::ENTRY.bits();
        ctx.regs.ebp = stack_top;
        ctx.regs.esp = stack_top;
        ctx.regs.ebx = argument;
        ctx.valid = 1;
        ctx
    }

    pub fn with_ebx(mut self, ebx: u32) -> Self {
        self.regs.ebx = ebx;
        self
    }

    /// The context as the hypervisor sees it, word by word
    pub fn to_words(&self) -> [u32; CONTEXT_WORDS] {
        let r = &self.regs;
        [
            self.eip,
            self.pipflags,
            self.eflags,
            r.edi,
            r.esi,
            r.ebp,
            r.esp,
            r.ebx,
            r.edx,
            r.ecx,
            r.eax,
            self.valid,
            self.nfu[0],
            self.nfu[1],
            self.nfu[2],
            self.nfu[3],
        ]
    }

    /// The stores `publish` performs, in order
    ///
    /// `valid` is cleared first and set last; every other word is written
    /// exactly once in between.
    pub fn write_sequence(&self) -> impl Iterator<Item = FieldWrite> {
        let words = self.to_words();
        let body = (0..CONTEXT_WORDS)
            .filter(|&word| word != VALID_WORD)
            .map(move |word| FieldWrite {
                word,
                value: words[word],
            });

        core::iter::once(FieldWrite { word: VALID_WORD, value: 0 })
            .chain(body)
            .chain(core::iter::once(FieldWrite { word: VALID_WORD, value: 1 }))
    }
}

/// Write `ctx` to `dst` so that it only becomes valid once complete
///
/// # Safety
/// `dst` must point to `CONTEXT_SIZE` writable, 4-byte aligned bytes.
pub unsafe fn publish(dst: NonNull<Context>, ctx: &Context) {
    let base = dst.cast::<u32>();
    for store in ctx.write_sequence() {
        unsafe { VolatilePtr::new(base.add(store.word)).write(store.value) };
    }
}

/// Read a context the hypervisor may be writing
///
/// # Safety
/// `src` must point to a readable, aligned `Context`.
pub unsafe fn snapshot(src: NonNull<Context>) -> Context {
    unsafe { VolatilePtr::new(src).read() }
}

/// Whether the context at `src` is marked valid
///
/// # Safety
/// Same as `snapshot`.
pub unsafe fn is_published(src: NonNull<Context>) -> bool {
    let ctx = unsafe { VolatilePtr::new(src) };
    map_field!(ctx.valid).read() == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use pip::PAGE_SIZE;

    #[test]
    fn test_layout() {
        assert_eq!(core::mem::offset_of!(Context, eip), 0);
        assert_eq!(core::mem::offset_of!(Context, eflags), 8);
        assert_eq!(core::mem::offset_of!(Context, regs), 12);
        assert_eq!(core::mem::offset_of!(Context, valid), VALID_WORD * 4);
        assert_eq!(core::mem::offset_of!(Context, nfu), 48);
    }

    #[test]
    fn test_entry_flags() {
        assert_eq!(EFlags::ENTRY.bits(), 0x202);
    }

    #[test]
    fn test_child_entry_context() {
        let ctx = Context::child_entry(VirtualAddress::new(0x0070_0000));
        assert_eq!(ctx.eip, 0x0070_0000);
        assert_eq!(ctx.pipflags, 0);
        assert_eq!(ctx.eflags, 0x202);
        assert_eq!(ctx.regs.ebp, INITIAL_STACK_TOP.as_u32() + PAGE_SIZE);
        assert_eq!(ctx.regs.esp, ctx.regs.ebp - CONTEXT_SIZE);
        assert_eq!(ctx.regs.ebx, BOOTINFO_ADDR.as_u32());
        assert_eq!(ctx.regs.eax, 0);
        assert_eq!(ctx.nfu, [0; 4]);
        assert_eq!(ctx.valid, 1);
        assert!(EFlags::from_bits_truncate(ctx.eflags).contains(EFlags::INTERRUPT_ENABLE));
    }

    #[test]
    fn test_entry_esp_is_context_address() {
        let ctx = Context::child_entry(VirtualAddress::new(0x0070_0000));
        assert_eq!(ctx.regs.esp, CHILD_ENTRY_CONTEXT.as_u32());
        assert_eq!(CHILD_ENTRY_CONTEXT.as_u32(), 0xFFFF_EFC0);
        assert_eq!(ROOT_SETUP_CONTEXT.as_u32(), 0xFFFF_DFC0);
    }

    #[test]
    fn test_valid_cleared_first_and_set_last() {
        let ctx = Context::child_entry(VirtualAddress::new(0x0070_0000));
        let writes: Vec<FieldWrite> = ctx.write_sequence().collect();

        assert_eq!(writes.len(), CONTEXT_WORDS + 1);
        assert_eq!(writes[0], FieldWrite { word: VALID_WORD, value: 0 });
        assert_eq!(writes[writes.len() - 1], FieldWrite { word: VALID_WORD, value: 1 });
        assert!(writes[1..writes.len() - 1].iter().all(|w| w.word != VALID_WORD));
    }

    #[test]
    fn test_valid_never_seen_during_field_writes() {
        // Replay the stores against a recording image
        let ctx = Context::child_entry(VirtualAddress::new(0x0070_0000));
        let mut image = [0xFFFF_FFFFu32; CONTEXT_WORDS];
        image[VALID_WORD] = 1;

        let mut writes = ctx.write_sequence();
        let first = writes.next().unwrap();
        image[first.word] = first.value;

        for store in writes {
            if store.word != VALID_WORD {
                assert_eq!(image[VALID_WORD], 0, "valid set while writing word {}", store.word);
            }
            image[store.word] = store.value;
        }
        assert_eq!(image, ctx.to_words());
    }

    #[test]
    fn test_publish_and_snapshot() {
        let mut slot = Context::empty();
        slot.valid = 1;
        slot.eip = 0xDEAD;
        let ctx = Context::child_entry(VirtualAddress::new(0x0070_0000));
        let dst = NonNull::from(&mut slot);

        unsafe {
            publish(dst, &ctx);
            assert_eq!(snapshot(dst), ctx);
            assert!(is_published(dst));
        }
    }

    #[test]
    fn test_deterministic_image() {
        let a = Context::child_entry(VirtualAddress::new(0x0070_0000));
        let b = Context::child_entry(VirtualAddress::new(0x0070_0000));
        assert_eq!(a.to_words(), b.to_words());
    }

    #[test]
    fn test_handler_context() {
        let ctx = Context::handler(0x0040_1000, 0x0050_0000, 0x0030_0000);
        assert_eq!(ctx.eip, 0x0040_1000);
        assert_eq!(ctx.regs.esp, 0x0050_0000);
        assert_eq!(ctx.regs.ebx, 0x0030_0000);
        assert_eq!(ctx.eflags, 0x202);
        assert_eq!(ctx.valid, 1);
    }
}
