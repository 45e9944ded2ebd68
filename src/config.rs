//! Build-time and runtime configuration of a measurement run.
//!
//! The bare-metal image has no arguments: everything it measures is
//! fixed when it is built, from `OPCOST_*` environment variables read
//! with `option_env!`. Values are parsed in `const` context, so a bad
//! value fails the build instead of producing a wrong image. Hosts and
//! tests use [`BenchConfig::builder`], which reports the same problems
//! as [`ConfigError`].

use core::num::{NonZeroU32, NonZeroUsize};

use crate::error::ConfigError;
use crate::operation::{OpKind, OperationHandle};
use crate::report::{Radix, ReportFormat};
use crate::shape::{FencePolicy, LoopSpec};

/// Body replication factor of the configured loop (`OPCOST_UNROLL`).
pub const UNROLL: usize = {
    let unroll = build_number(option_env!("OPCOST_UNROLL"), 1, "OPCOST_UNROLL");
    assert!(unroll >= 1 && unroll <= 64, "OPCOST_UNROLL must be between 1 and 64");
    unroll as usize
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchConfig {
    pub operation: OperationHandle,
    pub trip_count: NonZeroU32,
    pub fence: FencePolicy,
    /// Hardware threads that take part in the measurement and the barrier.
    pub threads: NonZeroUsize,
    pub format: ReportFormat,
}

impl BenchConfig {
    /// `add` on `0x1`, `0x2`, ten trips, no fence, one thread, decimal.
    pub const DEFAULT: BenchConfig = BenchConfig {
        operation: OperationHandle::new(OpKind::Add, 0x1, 0x2),
        trip_count: match NonZeroU32::new(10) {
            Some(n) => n,
            None => unreachable!(),
        },
        fence: FencePolicy::Throughput,
        threads: NonZeroUsize::MIN,
        format: ReportFormat { radix: Radix::Decimal, show_operands: false },
    };

    /// The configuration baked in from the build environment.
    pub const BUILD: BenchConfig = {
        let kind = match option_env!("OPCOST_OP") {
            Some(name) => match OpKind::from_mnemonic(name) {
                Some(kind) => kind,
                None => panic!("OPCOST_OP is not a known operation mnemonic"),
            },
            None => Self::DEFAULT.operation.kind(),
        };
        let op1 = build_hex(option_env!("OPCOST_OP1"), 0x1, "OPCOST_OP1");
        let op2 = build_hex(option_env!("OPCOST_OP2"), 0x2, "OPCOST_OP2");

        let trips = build_number(option_env!("OPCOST_TRIP_COUNT"), 10, "OPCOST_TRIP_COUNT");
        assert!(trips <= u32::MAX as u64, "OPCOST_TRIP_COUNT does not fit in 32 bits");
        let trip_count = match NonZeroU32::new(trips as u32) {
            Some(n) => n,
            None => panic!("OPCOST_TRIP_COUNT must be at least 1"),
        };

        let fence = match option_env!("OPCOST_FENCE") {
            Some(name) => match FencePolicy::from_name(name) {
                Some(fence) => fence,
                None => panic!("OPCOST_FENCE must be `latency` or `throughput`"),
            },
            None => Self::DEFAULT.fence,
        };

        let threads = build_number(option_env!("OPCOST_THREADS"), 1, "OPCOST_THREADS");
        let threads = match NonZeroUsize::new(threads as usize) {
            Some(n) => n,
            None => panic!("OPCOST_THREADS must be at least 1"),
        };

        let radix = match option_env!("OPCOST_RADIX") {
            Some(name) => match Radix::from_name(name) {
                Some(radix) => radix,
                None => panic!("OPCOST_RADIX must be `dec` or `hex`"),
            },
            None => Radix::Decimal,
        };
        let show_operands = match option_env!("OPCOST_SHOW_OPERANDS") {
            Some(flag) => match parse_flag(flag) {
                Some(flag) => flag,
                None => panic!("OPCOST_SHOW_OPERANDS must be `0` or `1`"),
            },
            None => false,
        };

        BenchConfig {
            operation: OperationHandle::new(kind, op1, op2),
            trip_count,
            fence,
            threads,
            format: ReportFormat { radix, show_operands },
        }
    };

    pub fn builder() -> BenchConfigBuilder {
        BenchConfigBuilder::default()
    }

    pub const fn loop_spec<const U: usize>(&self) -> LoopSpec<U> {
        LoopSpec::new(self.trip_count, self.fence, self.operation)
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Runtime counterpart of the `OPCOST_*` variables.
///
/// Textual knobs are parsed as they are set; the first rejected value is
/// kept and returned by [`BenchConfigBuilder::build`].
#[derive(Debug, Clone)]
pub struct BenchConfigBuilder {
    kind: OpKind,
    operands: (u64, u64),
    trip_count: u32,
    fence: FencePolicy,
    threads: usize,
    format: ReportFormat,
    error: Option<ConfigError>,
}

impl Default for BenchConfigBuilder {
    fn default() -> Self {
        let base = BenchConfig::DEFAULT;
        Self {
            kind: base.operation.kind(),
            operands: base.operation.operands(),
            trip_count: base.trip_count.get(),
            fence: base.fence,
            threads: base.threads.get(),
            format: base.format,
            error: None,
        }
    }
}

impl BenchConfigBuilder {
    fn record<T>(&mut self, parsed: Result<T, ConfigError>) -> Option<T> {
        match parsed {
            Ok(value) => Some(value),
            Err(err) => {
                if self.error.is_none() {
                    self.error = Some(err);
                }
                None
            }
        }
    }

    pub fn operation(mut self, mnemonic: &str) -> Self {
        if let Some(kind) = self.record(mnemonic.parse()) {
            self.kind = kind;
        }
        self
    }

    pub fn op_kind(mut self, kind: OpKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn operands(mut self, op1: u64, op2: u64) -> Self {
        self.operands = (op1, op2);
        self
    }

    pub fn trip_count(mut self, trips: u32) -> Self {
        self.trip_count = trips;
        self
    }

    pub fn fence(mut self, name: &str) -> Self {
        if let Some(fence) = self.record(name.parse()) {
            self.fence = fence;
        }
        self
    }

    pub fn fence_policy(mut self, fence: FencePolicy) -> Self {
        self.fence = fence;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn radix(mut self, name: &str) -> Self {
        if let Some(radix) = self.record(name.parse()) {
            self.format.radix = radix;
        }
        self
    }

    pub fn show_operands(mut self, show: bool) -> Self {
        self.format.show_operands = show;
        self
    }

    pub fn build(self) -> Result<BenchConfig, ConfigError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(BenchConfig {
            operation: OperationHandle::new(self.kind, self.operands.0, self.operands.1),
            trip_count: NonZeroU32::new(self.trip_count).ok_or(ConfigError::ZeroTripCount)?,
            fence: self.fence,
            threads: NonZeroUsize::new(self.threads).ok_or(ConfigError::ZeroThreads)?,
            format: self.format,
        })
    }
}

const fn build_number(value: Option<&str>, default: u64, name: &'static str) -> u64 {
    match value {
        Some(text) => match parse_u64(text.as_bytes(), 10) {
            Some(n) => n,
            None => const_panic_invalid(name),
        },
        None => default,
    }
}

const fn build_hex(value: Option<&str>, default: u64, name: &'static str) -> u64 {
    match value {
        Some(text) => {
            let bytes = text.as_bytes();
            let digits = match bytes {
                [b'0', b'x' | b'X', rest @ ..] => rest,
                _ => bytes,
            };
            match parse_u64(digits, 16) {
                Some(n) => n,
                None => const_panic_invalid(name),
            }
        }
        None => default,
    }
}

const fn const_panic_invalid(name: &'static str) -> ! {
    // const panics cannot format their arguments.
    let _ = name;
    panic!("invalid number in an OPCOST_* build variable")
}

/// Digits only, `_` separators allowed, no sign.
pub(crate) const fn parse_u64(digits: &[u8], radix: u64) -> Option<u64> {
    if digits.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    let mut seen = false;
    let mut i = 0;
    while i < digits.len() {
        let digit = match digits[i] {
            b'_' => {
                i += 1;
                continue;
            }
            c @ b'0'..=b'9' => (c - b'0') as u64,
            c @ b'a'..=b'f' => (c - b'a' + 10) as u64,
            c @ b'A'..=b'F' => (c - b'A' + 10) as u64,
            _ => return None,
        };
        if digit >= radix {
            return None;
        }
        value = match value.checked_mul(radix) {
            Some(v) => match v.checked_add(digit) {
                Some(v) => v,
                None => return None,
            },
            None => return None,
        };
        seen = true;
        i += 1;
    }
    if seen {
        Some(value)
    } else {
        None
    }
}

const fn parse_flag(text: &str) -> Option<bool> {
    match text.as_bytes() {
        b"0" | b"false" | b"no" => Some(false),
        b"1" | b"true" | b"yes" => Some(true),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_the_default_config() {
        assert_eq!(BenchConfig::builder().build(), Ok(BenchConfig::DEFAULT));
    }

    #[test]
    fn builder_applies_every_knob() {
        let config = BenchConfig::builder()
            .operation("FDIV.D")
            .operands(0x4025_0000_0000_0000, 0x4000_0000_0000_0000)
            .trip_count(1024)
            .fence("latency")
            .threads(4)
            .radix("hex")
            .show_operands(true)
            .build()
            .unwrap();
        assert_eq!(config.operation.kind(), OpKind::FdivD);
        assert_eq!(config.trip_count.get(), 1024);
        assert_eq!(config.fence, FencePolicy::Latency);
        assert_eq!(config.threads.get(), 4);
        assert_eq!(config.format, ReportFormat { radix: Radix::Hex, show_operands: true });

        let spec: LoopSpec<2> = config.loop_spec();
        assert_eq!(spec.body_executions(), 2048);
    }

    #[test]
    fn builder_rejects_bad_values() {
        assert_eq!(BenchConfig::builder().trip_count(0).build(), Err(ConfigError::ZeroTripCount));
        assert_eq!(BenchConfig::builder().threads(0).build(), Err(ConfigError::ZeroThreads));
        assert_eq!(BenchConfig::builder().operation("fsqrt.d").build(), Err(ConfigError::UnknownOperation));
        assert_eq!(BenchConfig::builder().radix("oct").build(), Err(ConfigError::UnknownRadix));
    }

    #[test]
    fn first_rejected_value_wins() {
        let err = BenchConfig::builder().fence("serial").operation("nope").trip_count(0).build();
        assert_eq!(err, Err(ConfigError::UnknownFencePolicy));
    }

    #[test]
    fn const_number_parsing() {
        assert_eq!(parse_u64(b"1024", 10), Some(1024));
        assert_eq!(parse_u64(b"4025_0000", 16), Some(0x4025_0000));
        assert_eq!(parse_u64(b"ffffffffffffffff", 16), Some(u64::MAX));
        assert_eq!(parse_u64(b"10000000000000000", 16), None);
        assert_eq!(parse_u64(b"1a", 10), None);
        assert_eq!(parse_u64(b"", 10), None);
        assert_eq!(parse_u64(b"__", 10), None);
        assert_eq!(build_hex(Some("0x2d"), 0, "T"), 0x2d);
        assert_eq!(build_hex(None, 7, "T"), 7);
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("2"), None);
    }

    #[test]
    fn unroll_is_at_least_one() {
        assert!(UNROLL >= 1);
    }
}
