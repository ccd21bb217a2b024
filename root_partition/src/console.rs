//! Serial Console (COM1)
//!
//! The only output the root partition has. Every diagnostic line goes
//! through `serial_print!` / `serial_println!`, which serialize writers on
//! a spinlock so that a handler and the main path never interleave bytes.

use core::fmt;
use spin::Mutex;

/// COM1 base port
const COM1: u16 = 0x3F8;

/// Serial port registers (offsets from base)
const DATA: u16 = 0;          // Data register (DLAB=0)
const INT_ENABLE: u16 = 1;    // Interrupt Enable (DLAB=0)
const FIFO_CTRL: u16 = 2;     // FIFO Control
const LINE_CTRL: u16 = 3;     // Line Control
const MODEM_CTRL: u16 = 4;    // Modem Control
const LINE_STATUS: u16 = 5;   // Line Status
const DIVISOR_LSB: u16 = 0;   // Divisor Latch LSB (DLAB=1)
const DIVISOR_MSB: u16 = 1;   // Divisor Latch MSB (DLAB=1)

/// Transmit holding register empty
const LINE_STATUS_THR_EMPTY: u8 = 0x20;

/// Serial port instance
pub struct SerialPort {
    base: u16,
}

impl SerialPort {
    /// Create a new serial port instance (doesn't initialize hardware)
    pub const fn new(base: u16) -> Self {
        Self { base }
    }

    /// Initialize the serial port
    ///
    /// Sets up 115200 baud, 8N1 (8 data bits, no parity, 1 stop bit)
    pub fn init(&mut self) {
        // Disable interrupts, the root never reads from the port
        port::write(self.base + INT_ENABLE, 0x00);

        // DLAB on, divisor 1 (115200 baud)
        port::write(self.base + LINE_CTRL, 0x80);
        port::write(self.base + DIVISOR_LSB, 0x01);
        port::write(self.base + DIVISOR_MSB, 0x00);

        // 8N1, DLAB off
        port::write(self.base + LINE_CTRL, 0x03);

        // Enable FIFO, clear buffers, 14-byte threshold
        port::write(self.base + FIFO_CTRL, 0xC7);

        // DTR, RTS, OUT2
        port::write(self.base + MODEM_CTRL, 0x0B);
    }

    /// Write a byte, waiting for the transmitter
    pub fn write_byte(&mut self, byte: u8) {
        while port::read(self.base + LINE_STATUS) & LINE_STATUS_THR_EMPTY == 0 {}

        port::write(self.base + DATA, byte);
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod port {
    use core::arch::asm;

    pub fn write(port: u16, value: u8) {
        unsafe {
            asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
        }
    }

    pub fn read(port: u16) -> u8 {
        let value: u8;
        unsafe {
            asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
        }
        value
    }
}

// Hosted builds have no UART. Tests mirror the transmitted bytes to stderr.
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
mod port {
    pub fn write(port: u16, value: u8) {
        #[cfg(test)]
        if port == super::COM1 + super::DATA {
            std::eprint!("{}", value as char);
        }
        #[cfg(not(test))]
        let _ = (port, value);
    }

    pub fn read(_port: u16) -> u8 {
        super::LINE_STATUS_THR_EMPTY
    }
}

/// Global serial port instance
static SERIAL1: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1));

/// Initialize the serial port (call once during boot)
pub fn init() {
    SERIAL1.lock().init();
}

/// Macro for serial output (like print!)
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::console::_print(format_args!($($arg)*))
    };
}

/// Macro for serial output with newline (like println!)
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}

/// Internal print function for macro
#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    // SerialPort::write_str never fails
    let _ = SERIAL1.lock().write_fmt(args);
}

/// Release the console lock unconditionally
///
/// # Safety
/// Only for the fatal path: the holder will never run again.
pub unsafe fn force_unlock() {
    SERIAL1.force_unlock();
}
