//! Byte console on a memory-mapped NS16550A, and a `log` sink on top of it.
//!
//! The console is discovered once with [`init`]. Output written before
//! that, or on a machine whose description has no matching node, goes to
//! the UART at [`scan::FALLBACK_BASE`], which is used as the firmware left
//! it.

use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

pub mod fdt;
pub mod scan;
pub mod uart16550;

use self::scan::{ConsoleNode, HardwareDescription, UartScan};
use self::uart16550::Uart16550;

/// 32-bit device registers addressed by index.
pub trait Registers {
    fn read(&self, index: usize) -> u32;
    fn write(&self, index: usize, value: u32);
}

/// Registers at `base + 4 * index`.
#[derive(Debug, Clone, Copy)]
pub struct MmioRegisters {
    base: usize,
}

impl MmioRegisters {
    /// # Safety
    ///
    /// `base` must map a device whose registers are 32-bit words, for as
    /// long as the value is used.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    fn reg(&self, index: usize) -> *mut u32 {
        (self.base as *mut u32).wrapping_add(index)
    }
}

impl Registers for MmioRegisters {
    fn read(&self, index: usize) -> u32 {
        // SAFETY: `new` requires `base` to map the device.
        unsafe { core::ptr::read_volatile(self.reg(index)) }
    }

    fn write(&self, index: usize, value: u32) {
        // SAFETY: as above.
        unsafe { core::ptr::write_volatile(self.reg(index), value) }
    }
}

static CONSOLE: Mutex<Option<Uart16550<MmioRegisters>>> = Mutex::new(None);

fn fallback() -> Uart16550<MmioRegisters> {
    // SAFETY: the fallback address is the console of the boards this image
    // targets when their description omits it.
    Uart16550::new(unsafe { MmioRegisters::new(ConsoleNode::fallback().base) })
}

/// The first `ns16550a` node of `description`, if any.
pub fn discover(description: &dyn HardwareDescription) -> Option<ConsoleNode> {
    let mut scan = UartScan::default();
    description.walk(&mut scan);
    scan.found()
}

/// Locate the console in `description` and configure it. Without a match
/// the fallback UART is selected and left unconfigured.
pub fn init(description: &dyn HardwareDescription) -> Option<ConsoleNode> {
    let found = discover(description);

    let uart = match found {
        Some(node) => {
            // SAFETY: the node was described as an ns16550a at this address.
            let uart = Uart16550::new(unsafe { MmioRegisters::new(node.base) });
            uart.configure(node.divisor());
            uart
        }
        None => fallback(),
    };
    *CONSOLE.lock() = Some(uart);

    match found {
        Some(node) => log::info!(
            "console ns16550a at {:#x}, divisor {:#x}",
            node.base,
            node.divisor()
        ),
        None => log::info!("no ns16550a described, console at {:#x}", ConsoleNode::fallback().base),
    }
    found
}

/// Blocking write of one byte to the console.
pub fn put_byte(byte: u8) {
    CONSOLE.lock().get_or_insert_with(fallback).put_byte(byte);
}

/// Blocking read of one byte from the console.
pub fn get_byte() -> u8 {
    CONSOLE.lock().get_or_insert_with(fallback).get_byte()
}

/// `fmt::Write` handle on the global console.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleWriter;

impl Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut console = CONSOLE.lock();
        let uart = console.get_or_insert_with(fallback);
        for byte in s.bytes() {
            uart.put_byte(byte);
        }
        Ok(())
    }
}

/// Write `args` without waiting on the console lock. While the lock is
/// held (a panic inside a console write) the fallback UART is used.
pub fn write_unlocked(args: fmt::Arguments<'_>) -> fmt::Result {
    write_through(&CONSOLE, fallback, args)
}

fn write_through<R: Registers>(
    console: &Mutex<Option<Uart16550<R>>>,
    fallback: impl FnOnce() -> Uart16550<R>,
    args: fmt::Arguments<'_>,
) -> fmt::Result {
    match console.try_lock() {
        Some(mut console) => console.get_or_insert_with(fallback).write_fmt(args),
        None => fallback().write_fmt(args),
    }
}

/// `log` sink emitting `[LEVEL target] message` lines on the console.
pub struct ConsoleLogger {
    level: LevelFilter,
}

impl ConsoleLogger {
    pub const fn new(level: LevelFilter) -> Self {
        Self { level }
    }
}

static LOGGER: ConsoleLogger =
    ConsoleLogger::new(if cfg!(debug_assertions) { LevelFilter::Debug } else { LevelFilter::Info });

/// Install the console logger. Later calls are ignored.
pub fn init_logger() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LOGGER.level);
    }
}

/// One log line, newline included.
pub fn write_record(out: &mut impl Write, record: &Record<'_>) -> fmt::Result {
    writeln!(out, "[{} {}] {}", record.level(), record.target(), record.args())
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            let _ = write_record(&mut ConsoleWriter, record);
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use log::Level;

    #[test]
    fn record_layout() {
        let mut out = String::new();
        write_record(
            &mut out,
            &Record::builder()
                .level(Level::Warn)
                .target("opcost::calibrate")
                .args(format_args!("instrs {} cycles {}", 10, 12))
                .build(),
        )
        .unwrap();
        assert_eq!(out, "[WARN opcost::calibrate] instrs 10 cycles 12\n");
    }

    #[test]
    fn logger_filters_by_level() {
        let logger = ConsoleLogger::new(LevelFilter::Info);
        assert!(logger.enabled(&Metadata::builder().level(Level::Error).build()));
        assert!(!logger.enabled(&Metadata::builder().level(Level::Debug).build()));
    }

    #[derive(Clone, Default)]
    struct Tape {
        out: Rc<RefCell<Vec<u8>>>,
    }

    impl Registers for Tape {
        fn read(&self, _index: usize) -> u32 {
            0x20
        }

        fn write(&self, index: usize, value: u32) {
            if index == 0 {
                self.out.borrow_mut().push(value as u8);
            }
        }
    }

    #[test]
    fn held_console_lock_falls_back() {
        let installed = Tape::default();
        let spare = Tape::default();
        let console = Mutex::new(Some(Uart16550::new(installed.clone())));
        let spare_uart = || Uart16550::new(spare.clone());

        write_through(&console, spare_uart, format_args!("a")).unwrap();
        let held = console.lock();
        write_through(&console, spare_uart, format_args!("b")).unwrap();
        drop(held);

        assert_eq!(*installed.out.borrow(), b"a");
        assert_eq!(*spare.out.borrow(), b"b");
    }

    #[test]
    fn mmio_stride_is_one_word() {
        // SAFETY: only addresses are computed, nothing is accessed.
        let regs = unsafe { MmioRegisters::new(0x1000) };
        assert_eq!(regs.reg(5) as usize, 0x1014);
    }
}
