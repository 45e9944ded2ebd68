//! The catalog of operations that can be timed, and the handle that binds
//! one of them to its operand pair for a whole run.

use core::fmt;
use core::str::FromStr;

use crate::error::ConfigError;

/// Register file an operation reads its operands from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpClass {
    Integer,
    /// Operands are the low 32 bits of each constant, as IEEE-754 binary32.
    Single,
    /// Operands are IEEE-754 binary64 bit patterns.
    Double,
}

macro_rules! op_kinds {
    ($( $variant:ident => $mnemonic:literal, $class:ident; )+) => {
        /// One instruction class under test.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum OpKind {
            $( $variant, )+
        }

        impl OpKind {
            pub const ALL: &'static [OpKind] = &[ $( OpKind::$variant, )+ ];

            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( OpKind::$variant => $mnemonic, )+
                }
            }

            pub const fn class(self) -> OpClass {
                match self {
                    $( OpKind::$variant => OpClass::$class, )+
                }
            }
        }
    };
}

op_kinds! {
    Sll => "sll", Integer;
    Srl => "srl", Integer;
    Sra => "sra", Integer;
    Add => "add", Integer;
    Sub => "sub", Integer;
    Xor => "xor", Integer;
    And => "and", Integer;
    Or => "or", Integer;
    Slt => "slt", Integer;
    Sltu => "sltu", Integer;
    Mul => "mul", Integer;
    Mulh => "mulh", Integer;
    Mulhsu => "mulhsu", Integer;
    Mulhu => "mulhu", Integer;
    Div => "div", Integer;
    Divu => "divu", Integer;
    Rem => "rem", Integer;
    Remu => "remu", Integer;
    FaddS => "fadd.s", Single;
    FsubS => "fsub.s", Single;
    FmulS => "fmul.s", Single;
    FdivS => "fdiv.s", Single;
    FsgnjS => "fsgnj.s", Single;
    FsgnjnS => "fsgnjn.s", Single;
    FsgnjxS => "fsgnjx.s", Single;
    FminS => "fmin.s", Single;
    FmaxS => "fmax.s", Single;
    FaddD => "fadd.d", Double;
    FsubD => "fsub.d", Double;
    FmulD => "fmul.d", Double;
    FdivD => "fdiv.d", Double;
    FsgnjD => "fsgnj.d", Double;
    FsgnjnD => "fsgnjn.d", Double;
    FsgnjxD => "fsgnjx.d", Double;
    FminD => "fmin.d", Double;
    FmaxD => "fmax.d", Double;
    Idle => "idle", Integer;
}

impl OpKind {
    /// Case-insensitive lookup usable in `const` context.
    pub const fn from_mnemonic(name: &str) -> Option<OpKind> {
        let mut index = 0;
        while index < Self::ALL.len() {
            let kind = Self::ALL[index];
            if eq_ignore_ascii_case(kind.mnemonic().as_bytes(), name.as_bytes()) {
                return Some(kind);
            }
            index += 1;
        }
        None
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl FromStr for OpKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpKind::from_mnemonic(s.trim()).ok_or(ConfigError::UnknownOperation)
    }
}

pub(crate) const fn eq_ignore_ascii_case(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i].to_ascii_lowercase() != b[i].to_ascii_lowercase() {
            return false;
        }
        i += 1;
    }
    true
}

/// An operation bound to its two operand constants.
///
/// The operands never change during a run. The empty variant of a handle
/// keeps the class and operands (so a backend performs the same operand
/// setup) but carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationHandle {
    kind: OpKind,
    op1: u64,
    op2: u64,
    empty: bool,
}

impl OperationHandle {
    pub const fn new(kind: OpKind, op1: u64, op2: u64) -> Self {
        Self { kind, op1, op2, empty: false }
    }

    /// The non-eliminable idle operation used for latency calibration.
    pub const fn idle() -> Self {
        Self::new(OpKind::Idle, 0, 0)
    }

    /// Same class and operands, no payload.
    pub const fn as_empty(&self) -> Self {
        Self { empty: true, ..*self }
    }

    pub const fn kind(&self) -> OpKind {
        self.kind
    }

    pub const fn class(&self) -> OpClass {
        self.kind.class()
    }

    pub const fn operands(&self) -> (u64, u64) {
        (self.op1, self.op2)
    }

    pub const fn is_empty(&self) -> bool {
        self.empty
    }

    /// The operation executed per body instance, `None` for the empty operation.
    pub const fn payload(&self) -> Option<OpKind> {
        if self.empty {
            None
        } else {
            Some(self.kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mnemonic_parses_back_to_its_kind() {
        for &kind in OpKind::ALL {
            assert_eq!(kind.mnemonic().parse::<OpKind>(), Ok(kind));
        }
    }

    #[test]
    fn lookup_ignores_case_and_rejects_unknown() {
        assert_eq!(OpKind::from_mnemonic("FDIV.D"), Some(OpKind::FdivD));
        assert_eq!(OpKind::from_mnemonic("Mulhsu"), Some(OpKind::Mulhsu));
        assert_eq!("fsqrt.s".parse::<OpKind>(), Err(ConfigError::UnknownOperation));
        assert_eq!(OpKind::from_mnemonic("ad"), None);
    }

    #[test]
    fn classes_follow_suffix() {
        assert_eq!(OpKind::Remu.class(), OpClass::Integer);
        assert_eq!(OpKind::FminS.class(), OpClass::Single);
        assert_eq!(OpKind::FsgnjxD.class(), OpClass::Double);
        assert_eq!(OpKind::Idle.class(), OpClass::Integer);
    }

    #[test]
    fn empty_handle_keeps_operands_and_drops_payload() {
        let handle = OperationHandle::new(OpKind::FmulD, 0x4025_0000_0000_0000, 0x400);
        let empty = handle.as_empty();
        assert_eq!(handle.payload(), Some(OpKind::FmulD));
        assert_eq!(empty.payload(), None);
        assert_eq!(empty.operands(), handle.operands());
        assert_eq!(empty.class(), OpClass::Double);
    }
}
