//! Simulated core for running the harness without counter hardware.
//!
//! The model is a single-issue, in-order pipeline with fully pipelined
//! functional units: every instruction issues in one cycle, a payload's
//! result becomes available `latency` cycles after issue, and a fence
//! stalls until every outstanding result is available. Counter reads are
//! instructions too, and an optional scripted jitter is added to cycle
//! samples to reproduce measurement noise deterministically.

use core::cell::Cell;

use crate::error::Error;
use crate::operation::{OpKind, OperationHandle};
use crate::{Backend, CounterControl, CounterSource};

const OP_COUNT: usize = OpKind::ALL.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cost {
    pub instructions: u64,
    pub cycles: u64,
}

impl Cost {
    pub const fn new(instructions: u64, cycles: u64) -> Self {
        Self { instructions, cycles }
    }
}

/// Fixed costs of the loop skeleton plus per-operation result latencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostModel {
    /// Kernel call and return around every body instance.
    pub call: Cost,
    pub loop_control: Cost,
    pub fence: Cost,
    pub counter_read: Cost,
    latencies: [u64; OP_COUNT],
}

impl CostModel {
    /// Latencies in the range of a small in-order RV64 core with an
    /// iterative divider.
    pub const fn in_order() -> Self {
        let mut latencies = [1; OP_COUNT];
        let mut index = 0;
        while index < OP_COUNT {
            let kind = OpKind::ALL[index];
            latencies[kind as usize] = match kind {
                OpKind::Mul | OpKind::Mulh | OpKind::Mulhsu | OpKind::Mulhu => 4,
                OpKind::Div | OpKind::Divu | OpKind::Rem | OpKind::Remu => 34,
                OpKind::FaddS | OpKind::FsubS | OpKind::FmulS => 4,
                OpKind::FaddD | OpKind::FsubD => 4,
                OpKind::FmulD => 5,
                OpKind::FdivS => 20,
                OpKind::FdivD => 34,
                OpKind::FsgnjS | OpKind::FsgnjnS | OpKind::FsgnjxS | OpKind::FminS | OpKind::FmaxS => 2,
                OpKind::FsgnjD | OpKind::FsgnjnD | OpKind::FsgnjxD | OpKind::FminD | OpKind::FmaxD => 2,
                _ => 1,
            };
            index += 1;
        }

        Self {
            call: Cost::new(2, 3),
            loop_control: Cost::new(2, 2),
            fence: Cost::new(1, 1),
            counter_read: Cost::new(1, 1),
            latencies,
        }
    }

    /// Override the result latency of one operation. Zero is clamped to one.
    pub const fn with_latency(mut self, kind: OpKind, cycles: u64) -> Self {
        self.latencies[kind as usize] = if cycles == 0 { 1 } else { cycles };
        self
    }

    pub const fn latency(&self, kind: OpKind) -> u64 {
        self.latencies[kind as usize]
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::in_order()
    }
}

/// Kernel of the simulated core: the payload latency, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimKernel {
    latency: Option<u64>,
}

/// One simulated hardware thread. Not `Sync`: its counters are thread-local.
pub struct SimulatedCore {
    model: CostModel,
    cycle: Cell<u64>,
    retired: Cell<u64>,
    ready_at: Cell<u64>,
    running: Cell<bool>,
    jitter: &'static [i64],
    jitter_at: Cell<usize>,
}

impl SimulatedCore {
    pub fn new(model: CostModel) -> Self {
        Self {
            model,
            cycle: Cell::new(0),
            retired: Cell::new(0),
            ready_at: Cell::new(0),
            running: Cell::new(true),
            jitter: &[],
            jitter_at: Cell::new(0),
        }
    }

    /// Add `pattern[n % len]` to the n-th cycle sample.
    pub fn with_jitter(mut self, pattern: &'static [i64]) -> Self {
        self.jitter = pattern;
        self
    }

    pub fn model(&self) -> &CostModel {
        &self.model
    }

    fn retire(&self, cost: Cost) {
        if self.running.get() {
            self.cycle.set(self.cycle.get() + cost.cycles);
            self.retired.set(self.retired.get() + cost.instructions);
        }
    }

    fn next_jitter(&self) -> i64 {
        if self.jitter.is_empty() {
            return 0;
        }
        let at = self.jitter_at.get();
        self.jitter_at.set(at.wrapping_add(1));
        self.jitter[at % self.jitter.len()]
    }
}

impl CounterSource for SimulatedCore {
    fn sample_cycles(&self) -> u64 {
        let value = self.cycle.get().saturating_add_signed(self.next_jitter());
        self.retire(self.model.counter_read);
        value
    }

    fn sample_instructions(&self) -> u64 {
        let value = self.retired.get();
        self.retire(self.model.counter_read);
        value
    }
}

impl CounterControl for SimulatedCore {
    fn reset(&self) -> Result<(), Error> {
        self.cycle.set(0);
        self.retired.set(0);
        self.ready_at.set(0);
        Ok(())
    }

    fn start(&self) -> Result<(), Error> {
        self.running.set(true);
        Ok(())
    }

    fn stop(&self) -> Result<(), Error> {
        self.running.set(false);
        Ok(())
    }
}

impl Backend for SimulatedCore {
    type Counters = Self;
    type Kernel = SimKernel;

    fn counters(&self) -> &Self {
        self
    }

    fn kernel(&self, operation: &OperationHandle) -> Result<SimKernel, Error> {
        Ok(SimKernel { latency: operation.payload().map(|kind| self.model.latency(kind)) })
    }

    fn invoke(&self, kernel: &SimKernel) {
        self.retire(self.model.call);
        if let Some(latency) = kernel.latency {
            let issued = self.cycle.get();
            self.retire(Cost::new(1, 1));
            if self.running.get() {
                self.ready_at.set(self.ready_at.get().max(issued + latency));
            }
        }
    }

    fn fence(&self) {
        if self.running.get() {
            self.cycle.set(self.cycle.get().max(self.ready_at.get()));
        }
        self.retire(self.model.fence);
    }

    fn loop_control(&self) {
        self.retire(self.model.loop_control);
    }
}
