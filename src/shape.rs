//! Loop-shape policies.

use core::fmt;
use core::num::NonZeroU32;
use core::str::FromStr;

use crate::error::ConfigError;
use crate::operation::{eq_ignore_ascii_case, OperationHandle};

/// Whether consecutive iterations are separated by a completion fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FencePolicy {
    /// Fence after every body: iterations execute strictly one after
    /// another, exposing the operation's dependent-chain latency.
    Latency,
    /// No fence: independent iterations may overlap in the pipeline,
    /// exposing the sustained issue rate.
    Throughput,
}

impl FencePolicy {
    pub const fn from_name(name: &str) -> Option<FencePolicy> {
        if eq_ignore_ascii_case(name.as_bytes(), b"latency") {
            Some(FencePolicy::Latency)
        } else if eq_ignore_ascii_case(name.as_bytes(), b"throughput") {
            Some(FencePolicy::Throughput)
        } else {
            None
        }
    }

    pub const fn fences_each_iteration(self) -> bool {
        matches!(self, FencePolicy::Latency)
    }
}

impl fmt::Display for FencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FencePolicy::Latency => f.write_str("latency"),
            FencePolicy::Throughput => f.write_str("throughput"),
        }
    }
}

impl FromStr for FencePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FencePolicy::from_name(s.trim()).ok_or(ConfigError::UnknownFencePolicy)
    }
}

/// Shape of one timed loop.
///
/// `UNROLL` copies of the body run per loop-control step. It is part of
/// the type so that a baseline derived with [`LoopSpec::calibration`] can
/// never differ from the measured loop in body replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSpec<const UNROLL: usize = 1> {
    trip_count: NonZeroU32,
    fence: FencePolicy,
    operation: OperationHandle,
}

impl<const UNROLL: usize> LoopSpec<UNROLL> {
    const NONZERO_UNROLL: () = assert!(UNROLL >= 1, "unroll factor must be at least 1");

    pub const fn new(trip_count: NonZeroU32, fence: FencePolicy, operation: OperationHandle) -> Self {
        let () = Self::NONZERO_UNROLL;
        Self { trip_count, fence, operation }
    }

    pub const fn trip_count(&self) -> NonZeroU32 {
        self.trip_count
    }

    pub const fn fence(&self) -> FencePolicy {
        self.fence
    }

    pub const fn operation(&self) -> &OperationHandle {
        &self.operation
    }

    pub const fn unroll(&self) -> usize {
        UNROLL
    }

    /// Body executions per region: trip count times the unroll factor.
    pub const fn body_executions(&self) -> u64 {
        self.trip_count.get() as u64 * UNROLL as u64
    }

    /// Same trip count, fence policy and unroll factor, with the empty
    /// operation in place of the payload.
    pub const fn calibration(&self) -> Self {
        Self { operation: self.operation.as_empty(), ..*self }
    }

    pub const fn with_operation(&self, operation: OperationHandle) -> Self {
        Self { operation, ..*self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OpKind;

    fn ten() -> NonZeroU32 {
        NonZeroU32::new(10).unwrap()
    }

    #[test]
    fn calibration_keeps_the_loop_shape() {
        let spec: LoopSpec<4> =
            LoopSpec::new(ten(), FencePolicy::Latency, OperationHandle::new(OpKind::Mul, 3, 5));
        let baseline = spec.calibration();
        assert_eq!(baseline.trip_count(), spec.trip_count());
        assert_eq!(baseline.fence(), FencePolicy::Latency);
        assert_eq!(baseline.unroll(), 4);
        assert!(baseline.operation().is_empty());
        assert_eq!(baseline.operation().operands(), (3, 5));
        assert_eq!(spec.body_executions(), 40);
    }

    #[test]
    fn fence_policy_names() {
        assert_eq!("Latency".parse::<FencePolicy>(), Ok(FencePolicy::Latency));
        assert_eq!(" throughput".parse::<FencePolicy>(), Ok(FencePolicy::Throughput));
        assert_eq!("serial".parse::<FencePolicy>(), Err(ConfigError::UnknownFencePolicy));
        assert!(FencePolicy::Latency.fences_each_iteration());
        assert!(!FencePolicy::Throughput.fences_each_iteration());
    }
}
