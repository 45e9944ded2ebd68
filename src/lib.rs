//! Calibrated per-operation cost measurement for bare-metal targets.
//!
//! A tight loop of fixed trip count runs one operation per body; an
//! otherwise identical loop with an empty body is run first, and its
//! cycle and retired-instruction deltas are subtracted from the measured
//! loop. What remains is the operation's own cost.
//!
//! The loop skeleton ([`region`]) is generic over a [`Backend`], which
//! supplies the counters, turns an [`OperationHandle`] into an executable
//! kernel and provides the iteration fence. Backends exist for RV64
//! (`mcycle`/`minstret`), Intel fixed-function counters, and a
//! deterministic simulated core used for host testing.

#![cfg_attr(not(test), no_std)]

pub mod calibrate;
pub mod config;
pub mod console;
pub mod coordinator;
pub mod counter;
pub mod error;
pub mod operation;
pub mod region;
pub mod report;
pub mod shape;
pub mod sim;
pub mod sweep;

#[cfg(target_arch = "riscv64")]
pub mod riscv;
#[cfg(target_arch = "x86_64")]
pub mod x86_intel;

#[cfg(target_os = "none")]
mod entry;

pub use crate::calibrate::{calibrate, measure, measure_calibrated};
pub use crate::counter::{CounterSnapshot, Measurement, RegionSample};
pub use crate::error::{ConfigError, DescriptionError, Error, ParseError};
pub use crate::operation::{OpClass, OpKind, OperationHandle};
pub use crate::shape::{FencePolicy, LoopSpec};

/// Backend used by the bare-metal entry points on this architecture.
#[cfg(target_arch = "riscv64")]
pub type NativeBackend = crate::riscv::RiscvCore;
#[cfg(target_arch = "x86_64")]
pub type NativeBackend = crate::x86_intel::IntelCore;

/// Read side of a cycle / retired-instruction counter pair.
///
/// Implementations must not be movable across the surrounding code by the
/// optimizer: a sample taken before a timed region has to stay before it.
pub trait CounterSource {
    fn sample_cycles(&self) -> u64;

    fn sample_instructions(&self) -> u64;

    #[inline(always)]
    fn sample(&self) -> CounterSnapshot {
        let cycles = self.sample_cycles();
        let instructions = self.sample_instructions();
        CounterSnapshot { cycles, instructions }
    }
}

/// Abstract trait to control performance counters.
pub trait CounterControl {
    /// Reset the counters to zero.
    fn reset(&self) -> Result<(), Error>;

    /// Start counting.
    fn start(&self) -> Result<(), Error>;

    /// Stop counting.
    fn stop(&self) -> Result<(), Error>;

    /// Zero the counters and make sure they run, whatever state the
    /// firmware left them in.
    fn restart(&self) -> Result<(), Error> {
        self.reset()?;
        self.start()
    }
}

/// Executor of the timed loop skeleton on one hardware thread.
pub trait Backend {
    type Counters: CounterSource;

    /// Executable form of an operation, resolved before a region starts.
    type Kernel;

    fn counters(&self) -> &Self::Counters;

    /// Resolve `operation` (or its empty variant) to a kernel.
    fn kernel(&self, operation: &OperationHandle) -> Result<Self::Kernel, Error>;

    /// Execute one instance of the kernel.
    fn invoke(&self, kernel: &Self::Kernel);

    /// Wait until every earlier instruction has completed.
    fn fence(&self);

    /// Called once per loop-control increment and bound check. Hardware
    /// backends pay for loop control in the loop itself; backends that
    /// model cost charge it here.
    #[inline(always)]
    fn loop_control(&self) {}
}
