//! Timed region runner: the loop skeleton every measurement goes through.

use core::hint::black_box;
use core::sync::atomic::{compiler_fence, Ordering};

use crate::counter::RegionSample;
use crate::error::Error;
use crate::shape::{FencePolicy, LoopSpec};
use crate::{Backend, CounterSource};

/// Execute `spec` once and return the counter snapshots bracketing it.
///
/// The kernel is resolved and the fence policy dispatched before the
/// first sample, so the only code between the two samples is the body,
/// the optional fence and loop control. The body runs exactly
/// `trip_count * UNROLL` times.
pub fn run<B, const UNROLL: usize>(backend: &B, spec: &LoopSpec<UNROLL>) -> Result<RegionSample, Error>
where
    B: Backend + ?Sized,
{
    let kernel = backend.kernel(spec.operation())?;
    let limit = black_box(spec.trip_count().get());

    let sample = match spec.fence() {
        FencePolicy::Latency => timed::<B, _, UNROLL>(backend, &kernel, limit, |b| b.fence()),
        FencePolicy::Throughput => timed::<B, _, UNROLL>(backend, &kernel, limit, |_| {}),
    };
    Ok(sample)
}

#[inline(always)]
fn timed<B, S, const UNROLL: usize>(backend: &B, kernel: &B::Kernel, limit: u32, separate: S) -> RegionSample
where
    B: Backend + ?Sized,
    S: Fn(&B),
{
    let counters = backend.counters();
    let mut iteration: u32 = 0;

    compiler_fence(Ordering::SeqCst);
    let before = counters.sample();
    compiler_fence(Ordering::SeqCst);

    // limit >= 1, so test at the bottom.
    loop {
        for _ in 0..UNROLL {
            backend.invoke(kernel);
        }
        separate(backend);
        backend.loop_control();
        iteration += 1;
        if iteration >= limit {
            break;
        }
    }

    compiler_fence(Ordering::SeqCst);
    let after = counters.sample();
    compiler_fence(Ordering::SeqCst);

    // Drain outside the window so the next region starts idle.
    backend.fence();

    RegionSample { before, after }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;
    use core::num::NonZeroU32;

    use super::*;
    use crate::operation::{OpKind, OperationHandle};

    #[derive(Default)]
    struct Tally {
        invokes: Cell<u64>,
        payloads: Cell<u64>,
        fences: Cell<u64>,
        steps: Cell<u64>,
        samples: Cell<u64>,
    }

    impl CounterSource for Tally {
        fn sample_cycles(&self) -> u64 {
            self.samples.set(self.samples.get() + 1);
            self.invokes.get() + self.fences.get()
        }

        fn sample_instructions(&self) -> u64 {
            self.payloads.get()
        }
    }

    impl Backend for Tally {
        type Counters = Self;
        type Kernel = Option<OpKind>;

        fn counters(&self) -> &Self {
            self
        }

        fn kernel(&self, operation: &OperationHandle) -> Result<Option<OpKind>, Error> {
            match operation.payload() {
                Some(OpKind::FdivD) => Err(Error::UnsupportedOperation(OpKind::FdivD)),
                payload => Ok(payload),
            }
        }

        fn invoke(&self, kernel: &Option<OpKind>) {
            self.invokes.set(self.invokes.get() + 1);
            if kernel.is_some() {
                self.payloads.set(self.payloads.get() + 1);
            }
        }

        fn fence(&self) {
            self.fences.set(self.fences.get() + 1);
        }

        fn loop_control(&self) {
            self.steps.set(self.steps.get() + 1);
        }
    }

    fn spec<const U: usize>(trips: u32, fence: FencePolicy, kind: OpKind) -> LoopSpec<U> {
        LoopSpec::new(NonZeroU32::new(trips).unwrap(), fence, OperationHandle::new(kind, 1, 2))
    }

    #[test]
    fn latency_loop_fences_every_iteration() {
        let tally = Tally::default();
        let sample = run(&tally, &spec::<3>(7, FencePolicy::Latency, OpKind::Add)).unwrap();
        assert_eq!(tally.invokes.get(), 21);
        // One per iteration plus the drain after the last sample.
        assert_eq!(tally.fences.get(), 8);
        assert_eq!(tally.steps.get(), 7);
        assert_eq!(tally.samples.get(), 2);
        assert_eq!(sample.delta().instructions, 21);
        assert_eq!(sample.delta().cycles, 28);
    }

    #[test]
    fn throughput_loop_drains_only_after_sampling() {
        let tally = Tally::default();
        let sample = run(&tally, &spec::<1>(10, FencePolicy::Throughput, OpKind::Mul)).unwrap();
        assert_eq!(tally.invokes.get(), 10);
        assert_eq!(tally.steps.get(), 10);
        assert_eq!(tally.fences.get(), 1);
        assert_eq!(sample.delta().cycles, 10);
    }

    #[test]
    fn single_trip_runs_body_once() {
        let tally = Tally::default();
        run(&tally, &spec::<1>(1, FencePolicy::Throughput, OpKind::Xor)).unwrap();
        assert_eq!(tally.invokes.get(), 1);
    }

    #[test]
    fn empty_operation_runs_loop_without_payload() {
        let tally = Tally::default();
        let baseline = spec::<2>(5, FencePolicy::Latency, OpKind::Div).calibration();
        let sample = run(&tally, &baseline).unwrap();
        assert_eq!(tally.invokes.get(), 10);
        assert_eq!(sample.delta().instructions, 0);
    }

    #[test]
    fn unsupported_kernel_fails_before_sampling() {
        let tally = Tally::default();
        let err = run(&tally, &spec::<1>(10, FencePolicy::Latency, OpKind::FdivD)).unwrap_err();
        assert_eq!(err, Error::UnsupportedOperation(OpKind::FdivD));
        assert_eq!(tally.samples.get(), 0);
        assert_eq!(tally.invokes.get(), 0);
    }
}
