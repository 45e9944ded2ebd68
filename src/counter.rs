//! Counter snapshots and the signed measurements derived from them.
//!
//! Deltas are taken over a 32-bit window: the difference between two
//! snapshots is computed modulo 2^32, so a single wrap of the low word is
//! absorbed but regions longer than 2^32 events are not representable.

use core::ops::Sub;

/// Cycle and retired-instruction counters read at one instant.
///
/// Two snapshots are only comparable when taken on the same hardware
/// thread without an intervening migration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub cycles: u64,
    pub instructions: u64,
}

impl CounterSnapshot {
    pub const fn new(cycles: u64, instructions: u64) -> Self {
        Self { cycles, instructions }
    }

    /// Events elapsed between `self` and the `later` snapshot.
    pub fn delta_to(&self, later: &CounterSnapshot) -> Measurement {
        Measurement {
            cycles: window(self.cycles, later.cycles),
            instructions: window(self.instructions, later.instructions),
        }
    }
}

#[inline]
fn window(before: u64, after: u64) -> i64 {
    i64::from(after.wrapping_sub(before) as u32)
}

/// Signed cycle/instruction pair.
///
/// Raw region deltas are never negative. Corrected measurements (raw minus
/// baseline) may carry a small negative cycle count on hardware that
/// overlaps the loop with the payload; that is valid output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Measurement {
    pub cycles: i64,
    pub instructions: i64,
}

impl Measurement {
    pub const ZERO: Measurement = Measurement { cycles: 0, instructions: 0 };

    pub const fn new(cycles: i64, instructions: i64) -> Self {
        Self { cycles, instructions }
    }

    /// Retired instructions can only be over-counted by noise, never
    /// under-counted, so a corrected count below zero means the baseline
    /// and the measured loop did not share a shape.
    pub const fn is_consistent(&self) -> bool {
        self.instructions >= 0
    }

    /// Average cycles per retired instruction, `None` when nothing retired.
    pub fn cycles_per_instruction(&self) -> Option<f64> {
        if self.instructions == 0 {
            None
        } else {
            Some(self.cycles as f64 / self.instructions as f64)
        }
    }
}

impl Sub for Measurement {
    type Output = Measurement;

    fn sub(self, baseline: Measurement) -> Measurement {
        Measurement {
            cycles: self.cycles.wrapping_sub(baseline.cycles),
            instructions: self.instructions.wrapping_sub(baseline.instructions),
        }
    }
}

/// The pair of snapshots bracketing one timed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSample {
    pub before: CounterSnapshot,
    pub after: CounterSnapshot,
}

impl RegionSample {
    pub fn delta(&self) -> Measurement {
        self.before.delta_to(&self.after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn delta_is_after_minus_before() {
        let region = RegionSample {
            before: CounterSnapshot::new(1_000, 400),
            after: CounterSnapshot::new(1_250, 432),
        };
        assert_eq!(region.delta(), Measurement::new(250, 32));
    }

    #[test]
    fn delta_absorbs_low_word_wrap() {
        let before = CounterSnapshot::new(0xffff_fff0, 0x1_ffff_fffe);
        let after = CounterSnapshot::new(0x1_0000_0010, 0x2_0000_0003);
        assert_eq!(before.delta_to(&after), Measurement::new(0x20, 5));
    }

    #[test]
    fn corrected_cycles_may_go_negative() {
        let corrected = Measurement::new(40, 12) - Measurement::new(43, 2);
        assert_eq!(corrected, Measurement::new(-3, 10));
        assert!(corrected.is_consistent());
    }

    #[test]
    fn cycles_per_instruction_needs_retired_work() {
        assert_eq!(Measurement::ZERO.cycles_per_instruction(), None);
        assert_eq!(Measurement::new(30, 10).cycles_per_instruction(), Some(3.0));
    }

    proptest! {
        #[test]
        fn baseline_minus_itself_is_zero(cycles in 0i64..1 << 32, instructions in 0i64..1 << 32) {
            let baseline = Measurement::new(cycles, instructions);
            prop_assert_eq!(baseline - baseline, Measurement::ZERO);
        }

        #[test]
        fn delta_within_window_is_exact(start in any::<u64>(), span in 0u64..u32::MAX as u64) {
            let before = CounterSnapshot::new(start, start);
            let after = CounterSnapshot::new(start.wrapping_add(span), start.wrapping_add(span));
            let delta = before.delta_to(&after);
            prop_assert_eq!(delta.cycles, span as i64);
            prop_assert_eq!(delta.instructions, span as i64);
        }
    }
}
