//! Intel backend on the architectural fixed-function counters:
//! IA32_FIXED_CTR0 counts retired instructions, IA32_FIXED_CTR1 unhalted
//! core cycles. Both are read with `rdpmc`.

use core::arch::asm;
use core::hint::black_box;

use x86::perfcnt::intel::Counter;

use crate::error::Error;
use crate::operation::OperationHandle;
use crate::{Backend, CounterControl, CounterSource};

pub mod global_ctrl;
mod kernels;

pub use self::global_ctrl::PerfCounterControler;

const INSTRUCTIONS_INDEX: u8 = 0;
const CYCLES_INDEX: u8 = 1;
const COUNTERS: [Counter; 2] = [Counter::Fixed(INSTRUCTIONS_INDEX), Counter::Fixed(CYCLES_INDEX)];

#[derive(Clone, Copy)]
pub struct Kernel {
    body: kernels::Body,
    op1: u64,
    op2: u64,
}

/// Resolve `operation` to its x86_64 kernel.
pub fn resolve(operation: &OperationHandle) -> Result<Kernel, Error> {
    let body = match operation.payload() {
        Some(kind) => kernels::payload(kind).ok_or(Error::UnsupportedOperation(kind))?,
        None => kernels::empty(operation.class()),
    };
    let (op1, op2) = operation.operands();
    Ok(Kernel { body, op1, op2 })
}

/// The fixed counters of the logical processor the caller runs on.
/// Counting stops when the value is dropped.
pub struct IntelCore {
    controler: PerfCounterControler,
}

impl IntelCore {
    /// Probe the PMU, claim fixed counters 0 and 1, reset and start them.
    ///
    /// # Safety
    ///
    /// Ring 0 only: the counters are programmed through MSRs.
    pub unsafe fn new() -> Result<Self, Error> {
        let controler = PerfCounterControler::probe();
        controler.require_fixed(2)?;
        for index in [INSTRUCTIONS_INDEX, CYCLES_INDEX] {
            if controler.check_in_use(Counter::Fixed(index)) {
                return Err(Error::CounterInUse(index));
            }
        }
        log::debug!(
            "architectural PMU v{}: {} fixed counters, {} bits",
            controler.get_version_identifier(),
            controler.get_number_fixed_function_counter(),
            controler.get_bit_width_fixed_counter()
        );

        let core = Self { controler };
        core.restart()?;
        Ok(core)
    }

    pub fn controler(&self) -> &PerfCounterControler {
        &self.controler
    }

    #[inline(always)]
    fn read_fixed_pmc_ctr(&self, index: u8) -> u64 {
        let rcx = u64::from(index) | (1 << 30);
        let rax: u64;
        let rdx: u64;
        // `rdpmc` is not serializing: fence it on both sides so it cannot
        // drift into the region it brackets.
        // SAFETY: `new` enabled user and kernel counting of this counter.
        unsafe {
            asm!(
                "lfence",
                "rdpmc",
                "lfence",
                in("rcx") rcx,
                out("rax") rax,
                out("rdx") rdx,
                options(nostack),
            );
        }
        (rax & 0xffff_ffff) | (rdx << 32)
    }
}

impl CounterSource for IntelCore {
    #[inline(always)]
    fn sample_cycles(&self) -> u64 {
        self.read_fixed_pmc_ctr(CYCLES_INDEX)
    }

    #[inline(always)]
    fn sample_instructions(&self) -> u64 {
        self.read_fixed_pmc_ctr(INSTRUCTIONS_INDEX)
    }
}

impl CounterControl for IntelCore {
    fn reset(&self) -> Result<(), Error> {
        for counter in COUNTERS {
            // SAFETY: ring 0 is a precondition of `new`.
            unsafe { self.controler.reset_counter(counter) }
        }
        Ok(())
    }

    fn start(&self) -> Result<(), Error> {
        for counter in COUNTERS {
            // SAFETY: as above.
            unsafe { self.controler.enable_counter(counter) }
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), Error> {
        for counter in COUNTERS {
            // SAFETY: as above.
            unsafe { self.controler.disable_counter(counter) }
        }
        Ok(())
    }
}

impl Drop for IntelCore {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl Backend for IntelCore {
    type Counters = Self;
    type Kernel = Kernel;

    fn counters(&self) -> &Self {
        self
    }

    fn kernel(&self, operation: &OperationHandle) -> Result<Kernel, Error> {
        resolve(operation)
    }

    #[inline(always)]
    fn invoke(&self, kernel: &Kernel) {
        (black_box(kernel.body))(kernel.op1, kernel.op2);
    }

    /// `lfence` does not let later instructions start until every earlier
    /// one has completed locally.
    #[inline(always)]
    fn fence(&self) {
        // SAFETY: ordering only.
        unsafe { asm!("lfence", options(nostack)) }
    }
}
