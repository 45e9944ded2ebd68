use thiserror::Error;

use crate::operation::OpKind;

/// Failures that can stop a measurement before its timed region starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The backend has no kernel for this operation.
    #[error("operation `{0}` has no kernel on this backend")]
    UnsupportedOperation(OpKind),

    /// Architectural PMU too old, or fewer than two fixed-function counters.
    #[error("fixed-function counters unsupported (PMU version {version}, {fixed} fixed counters)")]
    UnsupportedFixPmc { version: u8, fixed: u8 },

    /// Another agent already enabled the fixed counter.
    #[error("fixed counter {0} is already in use")]
    CounterInUse(u8),

    #[error("thread {id} is out of range for {total} participating threads")]
    ThreadOutOfRange { id: usize, total: usize },

    #[error("report sink rejected output")]
    Report(#[from] core::fmt::Error),
}

/// Rejected build or runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("trip count must be at least 1")]
    ZeroTripCount,

    #[error("thread count must be at least 1")]
    ZeroThreads,

    #[error("unknown operation mnemonic")]
    UnknownOperation,

    #[error("unknown fence policy, expected `latency` or `throughput`")]
    UnknownFencePolicy,

    #[error("unknown radix, expected `dec` or `hex`")]
    UnknownRadix,
}

/// A report line that does not follow the `instrs\t<n>\tcycles\t<n>` layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing `{0}` field")]
    MissingField(&'static str),

    #[error("invalid number in `{0}` field")]
    InvalidNumber(&'static str),

    #[error("unexpected input after the cycles field")]
    TrailingInput,
}

/// A flattened device tree that cannot be walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DescriptionError {
    #[error("bad magic {0:#010x}")]
    BadMagic(u32),

    #[error("blob ends inside the structure block")]
    Truncated,

    #[error("unknown structure token {0:#x}")]
    UnknownToken(u32),

    #[error("nodes nested deeper than {0}")]
    TooDeep(usize),

    #[error("end of node without a matching begin")]
    Unbalanced,

    #[error("property name is not a terminated UTF-8 string")]
    BadName,
}
