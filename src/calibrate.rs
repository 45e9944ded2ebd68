//! Baseline calibration and baseline-corrected measurement.

use crate::counter::Measurement;
use crate::error::Error;
use crate::region;
use crate::shape::LoopSpec;
use crate::Backend;

/// Cost of `spec`'s loop with the empty operation in place of the payload.
///
/// The baseline depends on the loop shape only, so it is taken fresh for
/// every measurement instead of being reused across shapes.
pub fn calibrate<B, const UNROLL: usize>(backend: &B, spec: &LoopSpec<UNROLL>) -> Result<Measurement, Error>
where
    B: Backend + ?Sized,
{
    let baseline = region::run(backend, &spec.calibration())?.delta();
    log::debug!(
        "baseline trips={} unroll={} fence={}: instrs {} cycles {}",
        spec.trip_count(),
        UNROLL,
        spec.fence(),
        baseline.instructions,
        baseline.cycles
    );
    Ok(baseline)
}

/// Run `spec` once and subtract `baseline` from its raw delta.
pub fn measure<B, const UNROLL: usize>(
    backend: &B,
    spec: &LoopSpec<UNROLL>,
    baseline: Measurement,
) -> Result<Measurement, Error>
where
    B: Backend + ?Sized,
{
    let raw = region::run(backend, spec)?.delta();
    let corrected = raw - baseline;

    log::debug!(
        "{} raw: instrs {} cycles {}, corrected: instrs {} cycles {}",
        spec.operation().kind(),
        raw.instructions,
        raw.cycles,
        corrected.instructions,
        corrected.cycles
    );
    if !corrected.is_consistent() {
        log::warn!(
            "{}: corrected instruction count {} is negative, baseline shape differs from the measured loop",
            spec.operation().kind(),
            corrected.instructions
        );
    }
    Ok(corrected)
}

/// Fresh calibration followed by one corrected measurement.
pub fn measure_calibrated<B, const UNROLL: usize>(backend: &B, spec: &LoopSpec<UNROLL>) -> Result<Measurement, Error>
where
    B: Backend + ?Sized,
{
    let baseline = calibrate(backend, spec)?;
    measure(backend, spec, baseline)
}

#[cfg(test)]
mod tests {
    use core::num::NonZeroU32;

    use super::*;
    use crate::operation::{OpKind, OperationHandle};
    use crate::shape::FencePolicy;
    use crate::sim::{CostModel, SimulatedCore};

    fn spec<const U: usize>(trips: u32, fence: FencePolicy, kind: OpKind) -> LoopSpec<U> {
        LoopSpec::new(NonZeroU32::new(trips).unwrap(), fence, OperationHandle::new(kind, 0x1, 0x2))
    }

    #[test]
    fn add_costs_one_instruction_per_trip() {
        let core = SimulatedCore::new(CostModel::in_order());
        let m = measure_calibrated(&core, &spec::<1>(10, FencePolicy::Throughput, OpKind::Add)).unwrap();
        assert_eq!(m, Measurement::new(10, 10));
    }

    #[test]
    fn latency_mode_exposes_result_latency() {
        let core = SimulatedCore::new(CostModel::in_order());
        let m = measure_calibrated(&core, &spec::<1>(10, FencePolicy::Latency, OpKind::FdivD)).unwrap();
        assert_eq!(m.instructions, 10);
        assert_eq!(m.cycles, 340);
    }

    #[test]
    fn baseline_against_itself_is_zero() {
        let core = SimulatedCore::new(CostModel::in_order());
        let shape = spec::<2>(16, FencePolicy::Latency, OpKind::Mul);
        let baseline = calibrate(&core, &shape).unwrap();
        let again = measure(&core, &shape.calibration(), baseline).unwrap();
        assert_eq!(again, Measurement::ZERO);
    }

    #[test]
    fn unrolled_body_multiplies_instructions() {
        let core = SimulatedCore::new(CostModel::in_order());
        let m = measure_calibrated(&core, &spec::<4>(10, FencePolicy::Throughput, OpKind::Sub)).unwrap();
        assert_eq!(m.instructions, 40);
    }

    #[test]
    fn mismatched_baseline_shows_negative_instructions() {
        let core = SimulatedCore::new(CostModel::in_order());
        let long = calibrate(&core, &spec::<1>(100, FencePolicy::Throughput, OpKind::Add)).unwrap();
        let m = measure(&core, &spec::<1>(10, FencePolicy::Throughput, OpKind::Add), long).unwrap();
        assert!(!m.is_consistent());
    }
}
