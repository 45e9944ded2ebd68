//! x86_64 kernels. Integer operations run on general registers, single and
//! double precision ones on scalar SSE after a `movq` of each operand
//! (single precision reads the low 32 bits). The empty kernel of a class
//! does the same moves.
//!
//! Operations without a one-instruction x86 encoding have no kernel.

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
                        concat!($insn, " {a}, {b}"),
                        a = inout(reg) a => _,
                        b = in(reg) b,
                        options(nomem, nostack),
                    );
                }
            }
        )+
    };
}

integer_kernels! {
    add => "add";
    sub => "sub";
    xor => "xor";
    and => "and";
    or => "or";
    mul => "imul";
}

macro_rules! shift_kernels {
    ($( $name:ident => $insn:literal; )+) => {
        $(
            #[inline(never)]
            fn $name(a: u64, b: u64) {
                // SAFETY: register-only arithmetic.
                unsafe {
                    asm!(
                        concat!($insn, " {a}, cl"),
                        a = inout(reg) a => _,
                        in("rcx") b,
                        options(nomem, nostack),
                    );
                }
            }
        )+
    };
}

shift_kernels! {
    sll => "shl";
    srl => "shr";
    sra => "sar";
}

macro_rules! sse_kernels {
    ($( $name:ident => $insn:literal; )+) => {
        $(
            #[inline(never)]
            fn $name(a: u64, b: u64) {
                // SAFETY: register-only arithmetic.
                unsafe {
                    asm!(
                        "movq {xa}, {a}",
                        "movq {xb}, {b}",
                        concat!($insn, " {xa}, {xb}"),
                        a = in(reg) a,
                        b = in(reg) b,
                        xa = out(xmm_reg) _,
                        xb = out(xmm_reg) _,
                        options(nomem, nostack),
                    );
                }
            }
        )+
    };
}

sse_kernels! {
    addss => "addss";
    subss => "subss";
    mulss => "mulss";
    divss => "divss";
    minss => "minss";
    maxss => "maxss";
}

sse_kernels! {
    addsd => "addsd";
    subsd => "subsd";
    mulsd => "mulsd";
    divsd => "divsd";
    minsd => "minsd";
    maxsd => "maxsd";
}

#[inline(never)]
fn empty_integer(a: u64, b: u64) {
    // SAFETY: emits nothing; keeps the operands live in registers.
    unsafe { asm!("/* {0} {1} */", in(reg) a, in(reg) b, options(nomem, nostack)) }
}

#[inline(never)]
fn empty_sse(a: u64, b: u64) {
    // SAFETY: register moves only.
    unsafe {
        asm!(
            "movq {xa}, {a}",
            "movq {xb}, {b}",
            a = in(reg) a,
            b = in(reg) b,
            xa = out(xmm_reg) _,
            xb = out(xmm_reg) _,
            options(nomem, nostack),
        );
    }
}

/// `or` of a register with itself. Unlike `xor r, r` it is not a zeroing
/// idiom, so it occupies an execution port and depends on its input.
#[inline(never)]
fn idle(a: u64, _b: u64) {
    // SAFETY: register-only arithmetic.
    unsafe { asm!("or {r}, {r}", r = inout(reg) a => _, options(nomem, nostack)) }
}

pub(super) fn empty(class: OpClass) -> Body {
    match class {
        OpClass::Integer => empty_integer,
        OpClass::Single | OpClass::Double => empty_sse,
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
        OpKind::Mul => mul,
        OpKind::Idle => idle,
        OpKind::FaddS => addss,
        OpKind::FsubS => subss,
        OpKind::FmulS => mulss,
        OpKind::FdivS => divss,
        OpKind::FminS => minss,
        OpKind::FmaxS => maxss,
        OpKind::FaddD => addsd,
        OpKind::FsubD => subsd,
        OpKind::FmulD => mulsd,
        OpKind::FdivD => divsd,
        OpKind::FminD => minsd,
        OpKind::FmaxD => maxsd,
        _ => return None,
    };
    Some(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernels_run_on_the_host() {
        for &kind in OpKind::ALL {
            if let Some(body) = payload(kind) {
                body(0x4000_0000_4000_0000, 3);
            }
            empty(kind.class())(1, 2);
        }
    }

    #[test]
    fn multi_instruction_operations_have_no_kernel() {
        for kind in [OpKind::Slt, OpKind::Mulh, OpKind::Div, OpKind::Remu, OpKind::FsgnjS, OpKind::FsgnjxD] {
            assert!(payload(kind).is_none(), "{kind}");
        }
    }
}
