//! RV64 backend: `mcycle` / `minstret` counters and hand-written kernels.
//!
//! Runs in M-mode. Counting is gated through `mcountinhibit`, which cores
//! without it treat as a no-op write.

use core::arch::asm;
use core::hint::black_box;

use ::riscv::register::{mcycle, minstret};

use crate::error::Error;
use crate::operation::OperationHandle;
use crate::{Backend, CounterControl, CounterSource};

mod kernels;

/// `mcountinhibit` bits for CY and IR.
const INHIBIT_CY_IR: usize = 0b101;

/// A resolved operation: the body plus its operand pair.
#[derive(Clone, Copy)]
pub struct Kernel {
    body: kernels::Body,
    op1: u64,
    op2: u64,
}

/// The hart the caller is running on.
#[derive(Debug)]
pub struct RiscvCore {
    _hart: (),
}

impl RiscvCore {
    /// Zero `mcycle` / `minstret` and clear their inhibit bits.
    ///
    /// # Safety
    ///
    /// M-mode only: the counters are written through machine CSRs.
    pub unsafe fn new() -> Result<Self, Error> {
        let core = Self { _hart: () };
        core.restart()?;
        Ok(core)
    }
}

impl CounterSource for RiscvCore {
    #[inline(always)]
    fn sample_cycles(&self) -> u64 {
        mcycle::read() as u64
    }

    #[inline(always)]
    fn sample_instructions(&self) -> u64 {
        minstret::read() as u64
    }
}

impl CounterControl for RiscvCore {
    fn reset(&self) -> Result<(), Error> {
        // SAFETY: M-mode counter CSRs are writable by the running hart.
        unsafe { asm!("csrw mcycle, zero", "csrw minstret, zero", options(nomem, nostack)) }
        Ok(())
    }

    fn start(&self) -> Result<(), Error> {
        // SAFETY: as above. 0x320 is mcountinhibit.
        unsafe { asm!("csrc 0x320, {bits}", bits = in(reg) INHIBIT_CY_IR, options(nomem, nostack)) }
        Ok(())
    }

    fn stop(&self) -> Result<(), Error> {
        // SAFETY: as above.
        unsafe { asm!("csrs 0x320, {bits}", bits = in(reg) INHIBIT_CY_IR, options(nomem, nostack)) }
        Ok(())
    }
}

impl Backend for RiscvCore {
    type Counters = Self;
    type Kernel = Kernel;

    fn counters(&self) -> &Self {
        self
    }

    fn kernel(&self, operation: &OperationHandle) -> Result<Kernel, Error> {
        let body = match operation.payload() {
            Some(kind) => kernels::payload(kind),
            None => kernels::empty(operation.class()),
        };
        let body = body.ok_or(Error::UnsupportedOperation(operation.kind()))?;
        let (op1, op2) = operation.operands();
        Ok(Kernel { body, op1, op2 })
    }

    #[inline(always)]
    fn invoke(&self, kernel: &Kernel) {
        (black_box(kernel.body))(kernel.op1, kernel.op2);
    }

    #[inline(always)]
    fn fence(&self) {
        // SAFETY: ordering only.
        unsafe { asm!("fence", options(nostack)) }
    }
}
