//! One function per RV64 operation. Each takes the operand pair in integer
//! registers, moves it into the register file its class reads from, and
//! executes the instruction once. The empty kernel of a class does the
//! same moves without the instruction, so the moves cancel in calibration.

use core::arch::asm;

use crate::operation::{OpClass, OpKind};

pub(super) type Body = fn(u64, u64);

macro_rules! integer_kernels {
    ($( $name:ident => $insn:literal; )+) => {
        $(
            #[inline(never)]
            fn $name(a: u64, b: u64) {
                // SAFETY: register-only arithmetic.
                unsafe {
                    asm!(
                        concat!($insn, " {rd}, {rs1}, {rs2}"),
                        rd = out(reg) _,
                        rs1 = in(reg) a,
                        rs2 = in(reg) b,
                        options(nomem, nostack),
                    );
                }
            }
        )+
    };
}

integer_kernels! {
    sll => "sll";
    srl => "srl";
    sra => "sra";
    add => "add";
    sub => "sub";
    xor => "xor";
    and => "and";
    or => "or";
    slt => "slt";
    sltu => "sltu";
    mul => "mul";
    mulh => "mulh";
    mulhsu => "mulhsu";
    mulhu => "mulhu";
    div => "div";
    divu => "divu";
    rem => "rem";
    remu => "remu";
}

#[inline(never)]
fn empty_integer(a: u64, b: u64) {
    // SAFETY: emits nothing; keeps the operands live in registers.
    unsafe { asm!("/* {0} {1} */", in(reg) a, in(reg) b, options(nomem, nostack)) }
}

/// `xor` of a register with itself: one instruction the optimizer cannot
/// see through, whose result depends on its input.
#[inline(never)]
fn idle(a: u64, _b: u64) {
    // SAFETY: register-only arithmetic.
    unsafe { asm!("xor {r}, {r}, {r}", r = inout(reg) a => _, options(nomem, nostack)) }
}

#[cfg(target_feature = "f")]
mod single {
    use core::arch::asm;

    macro_rules! single_kernels {
        ($( $name:ident => $insn:literal; )+) => {
            $(
                #[inline(never)]
                pub(in crate::riscv) fn $name(a: u64, b: u64) {
                    // SAFETY: register-only arithmetic.
                    unsafe {
                        asm!(
                            "fmv.w.x {fa}, {a}",
                            "fmv.w.x {fb}, {b}",
                            concat!($insn, " {fd}, {fa}, {fb}"),
                            a = in(reg) a,
                            b = in(reg) b,
                            fa = out(freg) _,
                            fb = out(freg) _,
                            fd = out(freg) _,
                            options(nomem, nostack),
                        );
                    }
                }
            )+
        };
    }

    single_kernels! {
        fadd => "fadd.s";
        fsub => "fsub.s";
        fmul => "fmul.s";
        fdiv => "fdiv.s";
        fsgnj => "fsgnj.s";
        fsgnjn => "fsgnjn.s";
        fsgnjx => "fsgnjx.s";
        fmin => "fmin.s";
        fmax => "fmax.s";
    }

    #[inline(never)]
    pub(in crate::riscv) fn empty(a: u64, b: u64) {
        // SAFETY: register moves only.
        unsafe {
            asm!(
                "fmv.w.x {fa}, {a}",
                "fmv.w.x {fb}, {b}",
                a = in(reg) a,
                b = in(reg) b,
                fa = out(freg) _,
                fb = out(freg) _,
                options(nomem, nostack),
            );
        }
    }
}

#[cfg(target_feature = "d")]
mod double {
    use core::arch::asm;

    macro_rules! double_kernels {
        ($( $name:ident => $insn:literal; )+) => {
            $(
                #[inline(never)]
                pub(in crate::riscv) fn $name(a: u64, b: u64) {
                    // SAFETY: register-only arithmetic.
                    unsafe {
                        asm!(
                            "fmv.d.x {fa}, {a}",
                            "fmv.d.x {fb}, {b}",
                            concat!($insn, " {fd}, {fa}, {fb}"),
                            a = in(reg) a,
                            b = in(reg) b,
                            fa = out(freg) _,
                            fb = out(freg) _,
                            fd = out(freg) _,
                            options(nomem, nostack),
                        );
                    }
                }
            )+
        };
    }

    double_kernels! {
        fadd => "fadd.d";
        fsub => "fsub.d";
        fmul => "fmul.d";
        fdiv => "fdiv.d";
        fsgnj => "fsgnj.d";
        fsgnjn => "fsgnjn.d";
        fsgnjx => "fsgnjx.d";
        fmin => "fmin.d";
        fmax => "fmax.d";
    }

    #[inline(never)]
    pub(in crate::riscv) fn empty(a: u64, b: u64) {
        // SAFETY: register moves only.
        unsafe {
            asm!(
                "fmv.d.x {fa}, {a}",
                "fmv.d.x {fb}, {b}",
                a = in(reg) a,
                b = in(reg) b,
                fa = out(freg) _,
                fb = out(freg) _,
                options(nomem, nostack),
            );
        }
    }
}

/// Empty kernel of `class`, if the target has its register file.
pub(super) fn empty(class: OpClass) -> Option<Body> {
    match class {
        OpClass::Integer => Some(empty_integer),
        #[cfg(target_feature = "f")]
        OpClass::Single => Some(single::empty),
        #[cfg(target_feature = "d")]
        OpClass::Double => Some(double::empty),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

pub(super) fn payload(kind: OpKind) -> Option<Body> {
    let body: Body = match kind {
        OpKind::Sll => sll,
        OpKind::Srl => srl,
        OpKind::Sra => sra,
        OpKind::Add => add,
        OpKind::Sub => sub,
        OpKind::Xor => xor,
        OpKind::And => and,
        OpKind::Or => or,
        OpKind::Slt => slt,
        OpKind::Sltu => sltu,
        OpKind::Mul => mul,
        OpKind::Mulh => mulh,
        OpKind::Mulhsu => mulhsu,
        OpKind::Mulhu => mulhu,
        OpKind::Div => div,
        OpKind::Divu => divu,
        OpKind::Rem => rem,
        OpKind::Remu => remu,
        OpKind::Idle => idle,
        #[cfg(target_feature = "f")]
        OpKind::FaddS => single::fadd,
        #[cfg(target_feature = "f")]
        OpKind::FsubS => single::fsub,
        #[cfg(target_feature = "f")]
        OpKind::FmulS => single::fmul,
        #[cfg(target_feature = "f")]
        OpKind::FdivS => single::fdiv,
        #[cfg(target_feature = "f")]
        OpKind::FsgnjS => single::fsgnj,
        #[cfg(target_feature = "f")]
        OpKind::FsgnjnS => single::fsgnjn,
        #[cfg(target_feature = "f")]
        OpKind::FsgnjxS => single::fsgnjx,
        #[cfg(target_feature = "f")]
        OpKind::FminS => single::fmin,
        #[cfg(target_feature = "f")]
        OpKind::FmaxS => single::fmax,
        #[cfg(target_feature = "d")]
        OpKind::FaddD => double::fadd,
        #[cfg(target_feature = "d")]
        OpKind::FsubD => double::fsub,
        #[cfg(target_feature = "d")]
        OpKind::FmulD => double::fmul,
        #[cfg(target_feature = "d")]
        OpKind::FdivD => double::fdiv,
        #[cfg(target_feature = "d")]
        OpKind::FsgnjD => double::fsgnj,
        #[cfg(target_feature = "d")]
        OpKind::FsgnjnD => double::fsgnjn,
        #[cfg(target_feature = "d")]
        OpKind::FsgnjxD => double::fsgnjx,
        #[cfg(target_feature = "d")]
        OpKind::FminD => double::fmin,
        #[cfg(target_feature = "d")]
        OpKind::FmaxD => double::fmax,
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(body)
}
