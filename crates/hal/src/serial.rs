//! Serial port (COM1 UART 16550) driver — the kernel's byte sink.
//!
//! Polled operation only; the UART's own interrupts stay masked. Until
//! [`init`] has programmed the port every write is dropped and every read
//! returns 0, so code that logs before bring-up (or on a hosted build)
//! is harmless.

use core::fmt;
use spin::Mutex;

use crate::port::{inb, outb};

/// COM1 base port address
const COM1_PORT: u16 = 0x3F8;

/// Serial port driver for COM1
pub struct Serial {
    initialized: bool,
}

impl Serial {
    const fn new() -> Self {
        Self { initialized: false }
    }

    /// Program the UART: 115200 baud, 8 data bits, no parity, one stop
    /// bit, FIFOs enabled.
    fn init(&mut self) {
        unsafe {
            // Mask all UART interrupts; we poll the line status register.
            outb(COM1_PORT + 1, 0x00);

            // Enable DLAB and set the baud divisor to 1 (115200 baud).
            outb(COM1_PORT + 3, 0x80);
            outb(COM1_PORT + 0, 0x01);
            outb(COM1_PORT + 1, 0x00);

            // 8N1, DLAB cleared.
            outb(COM1_PORT + 3, 0x03);

            // Enable FIFOs, clear them, 14-byte receive threshold.
            outb(COM1_PORT + 2, 0xC7);

            // DTR | RTS | OUT2.
            outb(COM1_PORT + 4, 0x0B);
        }
        self.initialized = true;
    }

    /// Transmit holding register empty (LSR bit 5)?
    fn transmit_ready() -> bool {
        unsafe { inb(COM1_PORT + 5) & 0x20 != 0 }
    }

    /// Received data available (LSR bit 0)?
    fn receive_ready() -> bool {
        unsafe { inb(COM1_PORT + 5) & 0x01 != 0 }
    }

    /// Write a byte, spinning until the transmitter can take it.
    pub fn write_byte(&self, byte: u8) {
        if !self.initialized {
            return;
        }
        while !Self::transmit_ready() {
            core::hint::spin_loop();
        }
        unsafe {
            outb(COM1_PORT, byte);
        }
    }

    /// Blocking read of one byte.
    pub fn read_byte(&self) -> u8 {
        if !self.initialized {
            return 0;
        }
        while !Self::receive_ready() {
            core::hint::spin_loop();
        }
        unsafe { inb(COM1_PORT) }
    }

    /// Write a string byte by byte.
    pub fn write_str(&self, s: &str) {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
    }
}

impl fmt::Write for Serial {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Serial::write_str(self, s);
        Ok(())
    }
}

/// Global serial port instance (COM1)
static SERIAL: Mutex<Serial> = Mutex::new(Serial::new());

/// Initialize the global serial port.
pub fn init() {
    SERIAL.lock().init();
}

/// Write a single byte to the serial port.
pub fn write_byte(byte: u8) {
    SERIAL.lock().write_byte(byte);
}

/// Write a string to the serial port.
pub fn write_str(s: &str) {
    SERIAL.lock().write_str(s);
}

/// Write formatted arguments to the serial port.
pub fn write_fmt(args: fmt::Arguments) {
    use fmt::Write;
    let _ = SERIAL.lock().write_fmt(args);
}

/// Blocking read of one byte from the serial port.
pub fn read_byte() -> u8 {
    SERIAL.lock().read_byte()
}
