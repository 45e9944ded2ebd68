//! Symbols the bare-metal bootstrap calls: `console_init` with the device
//! tree it booted with, then `main` on the boot hart only, or
//! `thread_entry` on every hart. `console_put_byte` / `console_get_byte`
//! back the bootstrap's own character I/O.

use core::fmt::Write;
use core::num::NonZeroUsize;
use core::panic::PanicInfo;

use spin::{Mutex, Once};

use crate::config::{BenchConfig, UNROLL};
use crate::console::fdt::FlattenedTree;
use crate::console::{self, ConsoleWriter};
use crate::coordinator::Coordinator;
use crate::error::Error;
use crate::NativeBackend;

extern "C" {
    /// Provided by the bootstrap; ends the whole program.
    fn exit(code: i32) -> !;
}

static SINK: Mutex<ConsoleWriter> = Mutex::new(ConsoleWriter);
static COORDINATOR: Once<Coordinator<'static, ConsoleWriter>> = Once::new();

fn native_backend() -> Result<NativeBackend, Error> {
    // SAFETY: bare-metal images run in M-mode / ring 0.
    unsafe { NativeBackend::new() }
}

/// Find and configure the console described by the blob at `fdt`. A zero
/// or unreadable address leaves the fallback console in place.
#[no_mangle]
pub extern "C" fn console_init(fdt: usize) {
    if fdt == 0 {
        return;
    }
    // SAFETY: the bootstrap passes the device tree it was booted with,
    // which stays mapped for the life of the image.
    match unsafe { FlattenedTree::from_raw(fdt) } {
        Ok(tree) => {
            console::init(&tree);
        }
        Err(err) => log::warn!("device tree at {:#x}: {}", fdt, err),
    }
}

#[no_mangle]
pub extern "C" fn console_put_byte(byte: u8) -> i32 {
    console::put_byte(byte);
    0
}

#[no_mangle]
pub extern "C" fn console_get_byte() -> i32 {
    i32::from(console::get_byte())
}

fn park() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

/// Single-thread run: one calibrated measurement, one line.
#[no_mangle]
pub extern "C" fn main() -> i32 {
    console::init_logger();
    let config = BenchConfig::BUILD;
    let spec = config.loop_spec::<UNROLL>();

    let result = native_backend().and_then(|core| crate::measure_calibrated(&core, &spec));
    let mut out = ConsoleWriter;
    match result {
        Ok(m) => {
            let _ = writeln!(out, "{}", config.format.line(spec.operation(), m));
            0
        }
        Err(err) => {
            log::error!("{}: {}", spec.operation().kind(), err);
            let _ = writeln!(out, "error\t{}", err);
            1
        }
    }
}

/// Multi-thread run. Harts `0..min(nc, OPCOST_THREADS)` measure and meet
/// at the barrier; the rest park until the leader exits.
#[no_mangle]
pub extern "C" fn thread_entry(cid: i32, nc: i32) -> ! {
    let config = BenchConfig::BUILD;
    let reported = usize::try_from(nc).unwrap_or(1).max(1);
    let participants = reported.min(config.threads.get());
    let id = match usize::try_from(cid) {
        Ok(id) if id < participants => id,
        _ => park(),
    };
    if id == 0 {
        console::init_logger();
    }

    let coordinator = COORDINATOR.call_once(|| {
        Coordinator::new(NonZeroUsize::new(participants).unwrap_or(NonZeroUsize::MIN), &SINK, config.format)
    });
    let context = match coordinator.context(id) {
        Ok(context) => context,
        Err(_) => park(),
    };

    let spec = config.loop_spec::<UNROLL>();
    let outcome = match native_backend() {
        Ok(core) => coordinator.run(context, &core, &spec),
        Err(err) => coordinator.abandon(context, &spec, err),
    };

    if outcome.leader {
        let code = if outcome.measurement.is_ok() { 0 } else { 1 };
        // SAFETY: every participant has reported and passed the barrier.
        unsafe { exit(code) }
    }
    park()
}

#[panic_handler]
fn panic(info: &PanicInfo<'_>) -> ! {
    let _ = console::write_unlocked(format_args!("panic: {}\n", info));
    // SAFETY: nothing can continue after a panic.
    unsafe { exit(2) }
}
