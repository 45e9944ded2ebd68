//! NS16550A UART with 32-bit register stride.

use core::fmt;

use super::Registers;

const QUEUE: usize = 0;
const IER: usize = 1;
const FCR: usize = 2;
const LCR: usize = 3;
const LSR: usize = 5;
// Divisor latch, visible while LCR.DLAB is set.
const DLL: usize = 0;
const DLM: usize = 1;

const LSR_DATA_READY: u32 = 0x01;
const LSR_TX_EMPTY: u32 = 0x20;

const LCR_DLAB: u32 = 0x80;
const LCR_8N1: u32 = 0x03;
/// FIFO on, both FIFOs cleared, 14-byte receive threshold.
const FCR_ENABLE_CLEAR_14: u32 = 0xC7;

pub struct Uart16550<R> {
    regs: R,
}

impl<R: Registers> Uart16550<R> {
    /// Wrap a device without touching it.
    pub const fn new(regs: R) -> Self {
        Self { regs }
    }

    /// Interrupts off, divisor latched, 8N1, FIFOs enabled and cleared.
    pub fn configure(&self, divisor: u16) {
        self.regs.write(IER, 0x00);
        self.regs.write(LCR, LCR_DLAB);
        self.regs.write(DLL, u32::from(divisor & 0xff));
        self.regs.write(DLM, u32::from(divisor >> 8));
        self.regs.write(LCR, LCR_8N1);
        self.regs.write(FCR, FCR_ENABLE_CLEAR_14);
    }

    /// Blocks until the transmit holding register is empty.
    pub fn put_byte(&self, byte: u8) {
        while self.regs.read(LSR) & LSR_TX_EMPTY == 0 {
            core::hint::spin_loop();
        }
        self.regs.write(QUEUE, u32::from(byte));
    }

    /// Blocks until a byte has been received.
    pub fn get_byte(&self) -> u8 {
        while self.regs.read(LSR) & LSR_DATA_READY == 0 {
            core::hint::spin_loop();
        }
        self.regs.read(QUEUE) as u8
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }
}

impl<R: Registers> fmt::Write for Uart16550<R> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.put_byte(byte);
        }
        Ok(())
    }
}
