//! Fixed-field text report lines, their parser, and trial summaries.
//!
//! A line is `instrs\t<n>\tcycles\t<n>`, optionally prefixed with the
//! operand pair as `op1\t<hex>\top2\t<hex>\t`.

use core::fmt;
use core::str::{FromStr, SplitWhitespace};

use crate::counter::Measurement;
use crate::error::{ConfigError, ParseError};
use crate::operation::{eq_ignore_ascii_case, OperationHandle};

/// Base used for the instruction and cycle fields. Operands are always hex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Radix {
    #[default]
    Decimal,
    /// Zero-padded to four digits.
    Hex,
}

impl Radix {
    pub const fn from_name(name: &str) -> Option<Radix> {
        let name = name.as_bytes();
        if eq_ignore_ascii_case(name, b"dec") || eq_ignore_ascii_case(name, b"decimal") {
            Some(Radix::Decimal)
        } else if eq_ignore_ascii_case(name, b"hex") {
            Some(Radix::Hex)
        } else {
            None
        }
    }

    const fn base(self) -> u32 {
        match self {
            Radix::Decimal => 10,
            Radix::Hex => 16,
        }
    }
}

impl FromStr for Radix {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Radix::from_name(s.trim()).ok_or(ConfigError::UnknownRadix)
    }
}

/// How a run renders its result lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportFormat {
    pub radix: Radix,
    /// Prefix each line with the operand pair.
    pub show_operands: bool,
}

impl ReportFormat {
    pub fn line(&self, operation: &OperationHandle, measurement: Measurement) -> ReportLine {
        let line = ReportLine::new(measurement).in_radix(self.radix);
        if self.show_operands {
            let (op1, op2) = operation.operands();
            line.with_operands(op1, op2)
        } else {
            line
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLine {
    pub operands: Option<(u64, u64)>,
    pub measurement: Measurement,
    pub radix: Radix,
}

impl ReportLine {
    pub fn new(measurement: Measurement) -> Self {
        Self { operands: None, measurement, radix: Radix::Decimal }
    }

    pub fn with_operands(mut self, op1: u64, op2: u64) -> Self {
        self.operands = Some((op1, op2));
        self
    }

    pub fn in_radix(mut self, radix: Radix) -> Self {
        self.radix = radix;
        self
    }

    /// Parse a line written in `radix`. Fields may be separated by any
    /// run of whitespace.
    pub fn parse(line: &str, radix: Radix) -> Result<ReportLine, ParseError> {
        let mut tokens = line.split_whitespace().peekable();

        let operands = if tokens.peek() == Some(&"op1") {
            tokens.next();
            let op1 = hex_operand(tokens.next(), "op1")?;
            let op2 = hex_operand(field(&mut tokens, "op2")?, "op2")?;
            Some((op1, op2))
        } else {
            None
        };

        let instructions = count(field(&mut tokens, "instrs")?, radix, "instrs")?;
        let cycles = count(field(&mut tokens, "cycles")?, radix, "cycles")?;
        if tokens.next().is_some() {
            return Err(ParseError::TrailingInput);
        }

        Ok(ReportLine { operands, measurement: Measurement::new(cycles, instructions), radix })
    }
}

fn field<'a>(
    tokens: &mut core::iter::Peekable<SplitWhitespace<'a>>,
    name: &'static str,
) -> Result<Option<&'a str>, ParseError> {
    match tokens.next() {
        Some(token) if token == name => Ok(tokens.next()),
        _ => Err(ParseError::MissingField(name)),
    }
}

fn hex_operand(token: Option<&str>, name: &'static str) -> Result<u64, ParseError> {
    let token = token.ok_or(ParseError::MissingField(name))?;
    let digits = token.strip_prefix("0x").unwrap_or(token);
    u64::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidNumber(name))
}

fn count(token: Option<&str>, radix: Radix, name: &'static str) -> Result<i64, ParseError> {
    let token = token.ok_or(ParseError::MissingField(name))?;
    i64::from_str_radix(token, radix.base()).map_err(|_| ParseError::InvalidNumber(name))
}

fn write_count(f: &mut fmt::Formatter<'_>, value: i64, radix: Radix) -> fmt::Result {
    match radix {
        Radix::Decimal => write!(f, "{}", value),
        Radix::Hex if value < 0 => write!(f, "-{:04x}", value.unsigned_abs()),
        Radix::Hex => write!(f, "{:04x}", value),
    }
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((op1, op2)) = self.operands {
            write!(f, "op1\t{:x}\top2\t{:x}\t", op1, op2)?;
        }
        f.write_str("instrs\t")?;
        write_count(f, self.measurement.instructions, self.radix)?;
        f.write_str("\tcycles\t")?;
        write_count(f, self.measurement.cycles, self.radix)
    }
}

impl FromStr for ReportLine {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportLine::parse(s, Radix::Decimal)
    }
}

/// Per-field minimum and maximum over repeated trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub trials: u32,
    pub min: Measurement,
    pub max: Measurement,
    /// Trials whose corrected cycle count was zero or more.
    pub non_negative_cycles: u32,
}

impl Summary {
    pub fn first(m: Measurement) -> Self {
        Self { trials: 1, min: m, max: m, non_negative_cycles: u32::from(m.cycles >= 0) }
    }

    pub fn observe(&mut self, m: Measurement) {
        self.trials += 1;
        self.min.instructions = self.min.instructions.min(m.instructions);
        self.min.cycles = self.min.cycles.min(m.cycles);
        self.max.instructions = self.max.instructions.max(m.instructions);
        self.max.cycles = self.max.cycles.max(m.cycles);
        if m.cycles >= 0 {
            self.non_negative_cycles += 1;
        }
    }

    /// `None` for an empty sequence of trials.
    pub fn from_trials<I>(trials: I) -> Option<Summary>
    where
        I: IntoIterator<Item = Measurement>,
    {
        let mut trials = trials.into_iter();
        let mut summary = Summary::first(trials.next()?);
        for m in trials {
            summary.observe(m);
        }
        Some(summary)
    }

    pub fn instruction_spread(&self) -> i64 {
        self.max.instructions - self.min.instructions
    }

    pub fn cycle_spread(&self) -> i64 {
        self.max.cycles - self.min.cycles
    }

    /// More than half the trials had non-negative cycle counts.
    pub fn mostly_non_negative(&self) -> bool {
        self.non_negative_cycles * 2 > self.trials
    }
}
