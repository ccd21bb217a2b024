#![no_std]
#![no_main]

//! # Root Partition Binary
//!
//! Entered by Pip with the boot information block as the only argument.
//! The child image is linked into this binary between
//! `_minimal_addr_start` and `_minimal_addr_end`.

use core::cell::UnsafeCell;
use core::ptr::NonNull;

use pip::layout::VIDT_ADDR;
use pip::{FpInfo, PhysicalAddress, VirtualAddress};

use root_partition::context::{self, Context};
use root_partition::dispatch::resume_child;
use root_partition::hypervisor::PipHypervisor;
use root_partition::panic::{fatal, halt};
use root_partition::vidt::{Vidt, VidtSlot};
use root_partition::{console, launch, CodeImage, Dispatcher, HandlerTable, LaunchConfig, PartitionDescriptor};

#[macro_use]
extern crate root_partition;

extern "C" {
    static _minimal_addr_start: u8;
    static _minimal_addr_end: u8;
}

/// Stack size of each interrupt handler
const HANDLER_STACK_SIZE: usize = 4096;

/// Stack and saved context of one handler
#[repr(C, align(16))]
struct HandlerFrame {
    stack: [u8; HANDLER_STACK_SIZE],
    context: Context,
}

struct HandlerSlot(UnsafeCell<HandlerFrame>);

// Written once before the first yield, then only read by the hypervisor
unsafe impl Sync for HandlerSlot {}

impl HandlerSlot {
    const fn new() -> Self {
        Self(UnsafeCell::new(HandlerFrame {
            stack: [0; HANDLER_STACK_SIZE],
            context: Context::empty(),
        }))
    }

    /// Publish the handler context and return its address
    fn prepare(&self, entry: unsafe extern "C" fn() -> !, child: PartitionDescriptor) -> VirtualAddress {
        let frame = self.0.get();
        unsafe {
            let stack_top = (*frame).stack.as_ptr().add(HANDLER_STACK_SIZE) as u32;
            let slot = NonNull::new_unchecked(core::ptr::addr_of_mut!((*frame).context));
            context::publish(slot, &Context::handler(entry as usize as u32, stack_top, child.as_u32()));
            VirtualAddress::new(slot.as_ptr() as u32)
        }
    }
}

static TIMER: HandlerSlot = HandlerSlot::new();
static KEYBOARD: HandlerSlot = HandlerSlot::new();

/// Root partition entry point
#[no_mangle]
pub extern "C" fn main(info: &'static FpInfo) -> ! {
    console::init();

    let bounds = unsafe {
        CodeImage::from_bounds(
            PhysicalAddress::new(core::ptr::addr_of!(_minimal_addr_start) as u32),
            PhysicalAddress::new(core::ptr::addr_of!(_minimal_addr_end) as u32),
        )
    };
    let image = match bounds {
        Ok(image) => image,
        Err(e) => fatal(e),
    };

    let config = LaunchConfig::default();
    let mut hv = PipHypervisor;

    let boot = match launch(&mut hv, info, &config, image) {
        Ok(boot) => boot,
        Err(e) => fatal(e),
    };

    let handlers = HandlerTable {
        timer: TIMER.prepare(timer_entry, boot.child),
        keyboard: KEYBOARD.prepare(keyboard_entry, boot.child),
    };

    let vidt = unsafe { &mut *(VIDT_ADDR.as_u32() as *mut Vidt) };
    let mut dispatcher = Dispatcher::new(&mut hv, vidt, &boot);
    dispatcher.install(&handlers);

    #[cfg(feature = "dump_vidt")]
    dump_vidt(dispatcher.vidt());

    let err = dispatcher.run(config.caller_save);
    fatal(err)
}

// Pip enters a handler with the descriptor in ebx and no return address.

#[unsafe(naked)]
unsafe extern "C" fn timer_entry() -> ! {
    core::arch::naked_asm!(
        "push ebx",
        "call {handler}",
        "ud2",
        handler = sym timer_handler,
    )
}

#[unsafe(naked)]
unsafe extern "C" fn keyboard_entry() -> ! {
    core::arch::naked_asm!(
        "push ebx",
        "call {handler}",
        "ud2",
        handler = sym keyboard_handler,
    )
}

/// Timer: give the CPU straight back to the child
extern "C" fn timer_handler(child: u32) -> ! {
    let err = resume_child(&mut PipHypervisor, PartitionDescriptor::from_raw(child), VidtSlot::Timer);
    fatal(err)
}

/// Keyboard: not handled, stop here
extern "C" fn keyboard_handler(_child: u32) -> ! {
    serial_println!("[dispatch] Keyboard interrupt, halting");
    halt()
}

#[cfg(feature = "dump_vidt")]
fn dump_vidt(vidt: &Vidt) {
    serial_println!("Root VIDT:");
    for (index, address) in vidt.populated() {
        let Some(ptr) = NonNull::new(address.as_u32() as *mut Context) else {
            continue;
        };
        let valid = unsafe { context::is_published(ptr) };
        let ctx = unsafe { context::snapshot(ptr) };
        serial_println!(
            "\t[{:3}] {} valid={} eip={:#010x} pipflags={:#x} eflags={:#x} esp={:#010x} ebx={:#010x}",
            index,
            address,
            valid,
            ctx.eip,
            ctx.pipflags,
            ctx.eflags,
            ctx.regs.esp,
            ctx.regs.ebx
        );
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    // Whoever held the console will never release it
    unsafe { console::force_unlock() };
    fatal(info)
}
