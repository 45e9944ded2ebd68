//! Idle-latency sweep: the idle operation replicated K = 1..=12 times per
//! fenced iteration, several calibrated trials per K.
//!
//! Each point should report `trip_count * K` instructions; the cycle
//! column shows how many back-to-back dependent instructions the core
//! needs before the loop overhead stops hiding them.

use core::num::NonZeroU32;

use crate::calibrate::measure_calibrated;
use crate::error::Error;
use crate::operation::OperationHandle;
use crate::report::Summary;
use crate::shape::{FencePolicy, LoopSpec};
use crate::Backend;

pub const MAX_UNROLL: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPoint {
    pub unroll: usize,
    pub summary: Summary,
}

/// `trials` fresh calibrated measurements of K idle operations per trip.
pub fn idle_point<B, const K: usize>(
    backend: &B,
    trip_count: NonZeroU32,
    trials: NonZeroU32,
) -> Result<SweepPoint, Error>
where
    B: Backend + ?Sized,
{
    let spec: LoopSpec<K> = LoopSpec::new(trip_count, FencePolicy::Latency, OperationHandle::idle());

    let mut summary = Summary::first(measure_calibrated(backend, &spec)?);
    for _ in 1..trials.get() {
        summary.observe(measure_calibrated(backend, &spec)?);
    }

    log::debug!(
        "idle x{}: instrs {}..{} cycles {}..{} over {} trials",
        K,
        summary.min.instructions,
        summary.max.instructions,
        summary.min.cycles,
        summary.max.cycles,
        summary.trials
    );
    Ok(SweepPoint { unroll: K, summary })
}

macro_rules! sweep {
    ($backend:expr, $trips:expr, $trials:expr; $($k:literal)+) => {
        [ $( idle_point::<_, $k>($backend, $trips, $trials)?, )+ ]
    };
}

/// Points for K = 1 through [`MAX_UNROLL`], in order.
pub fn idle_sweep<B>(
    backend: &B,
    trip_count: NonZeroU32,
    trials: NonZeroU32,
) -> Result<[SweepPoint; MAX_UNROLL], Error>
where
    B: Backend + ?Sized,
{
    Ok(sweep!(backend, trip_count, trials; 1 2 3 4 5 6 7 8 9 10 11 12))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{CostModel, SimulatedCore};

    #[test]
    fn every_point_retires_trip_count_times_k() {
        let core = SimulatedCore::new(CostModel::in_order());
        let trips = NonZeroU32::new(10).unwrap();
        let points = idle_sweep(&core, trips, NonZeroU32::new(3).unwrap()).unwrap();

        for (index, point) in points.iter().enumerate() {
            let k = index + 1;
            assert_eq!(point.unroll, k);
            assert_eq!(point.summary.trials, 3);
            assert_eq!(point.summary.min.instructions, 10 * k as i64);
            assert_eq!(point.summary.instruction_spread(), 0);
        }
    }

    #[test]
    fn idle_is_single_cycle_on_the_in_order_model() {
        let core = SimulatedCore::new(CostModel::in_order());
        let point = idle_point::<_, 4>(&core, NonZeroU32::new(8).unwrap(), NonZeroU32::MIN).unwrap();
        assert_eq!(point.summary.min.cycles, 32);
        assert_eq!(point.summary.max.cycles, 32);
    }
}
