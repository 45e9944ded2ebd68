//! Controller for the architectural PMU: capability decode from CPUID leaf
//! 0xA, and the IA32_PERF_GLOBAL_CTRL / IA32_FIXED_CTR_CTRL enable bits.
//!
//! MSR access needs ring 0. Nothing here checks the privilege level.

use x86::msr::{rdmsr, wrmsr, IA32_FIXED_CTR0, IA32_FIXED_CTR_CTRL, IA32_PERF_GLOBAL_CTRL};
use x86::perfcnt::intel::Counter;

use crate::error::Error;

/// Count in ring 0 and ring 3, no PMI, for one fixed counter's nibble.
const FIXED_CTRL_OS_USR: u64 = 0b11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerfCounterControler {
    version_identifier: u8,
    number_msr: u8,
    bit_width: u8,
    number_fixed_function_counter: u8,
    bit_width_fixed_counter: u8,
}

impl PerfCounterControler {
    /// Decode CPUID.0AH:EAX and EDX.
    pub const fn from_leaf(eax: u32, edx: u32) -> Self {
        Self {
            version_identifier: (eax & 0xff) as u8,
            number_msr: ((eax >> 8) & 0xff) as u8,
            bit_width: ((eax >> 16) & 0xff) as u8,
            number_fixed_function_counter: (edx & 0x1f) as u8,
            bit_width_fixed_counter: ((edx >> 5) & 0xff) as u8,
        }
    }

    pub fn probe() -> Self {
        // SAFETY: CPUID is available on every x86_64 processor.
        let leaf = unsafe { core::arch::x86_64::__cpuid(0xA) };
        Self::from_leaf(leaf.eax, leaf.edx)
    }

    pub fn get_version_identifier(&self) -> u8 {
        self.version_identifier
    }

    pub fn get_number_msr(&self) -> u8 {
        self.number_msr
    }

    pub fn get_bit_width(&self) -> u8 {
        self.bit_width
    }

    pub fn get_number_fixed_function_counter(&self) -> u8 {
        self.number_fixed_function_counter
    }

    pub fn get_bit_width_fixed_counter(&self) -> u8 {
        self.bit_width_fixed_counter
    }

    /// Fixed counters need architectural PMU version 2 and at least
    /// `needed` of them.
    pub fn require_fixed(&self, needed: u8) -> Result<(), Error> {
        if self.version_identifier < 2 || self.number_fixed_function_counter < needed {
            return Err(Error::UnsupportedFixPmc {
                version: self.version_identifier,
                fixed: self.number_fixed_function_counter,
            });
        }
        Ok(())
    }

    /// Set the counter's enable bit in IA32_PERF_GLOBAL_CTRL and, for a
    /// fixed counter, its ring bits in IA32_FIXED_CTR_CTRL.
    ///
    /// # Safety
    ///
    /// Ring 0 only.
    pub unsafe fn enable_counter(&self, c: Counter) {
        match c {
            Counter::Fixed(index) => {
                let ctrl = rdmsr(IA32_FIXED_CTR_CTRL);
                wrmsr(IA32_FIXED_CTR_CTRL, ctrl | fixed_ctrl_bits(index));
            }
            Counter::Programmable(_) => {}
        }
        let global = rdmsr(IA32_PERF_GLOBAL_CTRL);
        wrmsr(IA32_PERF_GLOBAL_CTRL, global | global_bit(c));
    }

    /// # Safety
    ///
    /// Ring 0 only.
    pub unsafe fn disable_counter(&self, c: Counter) {
        let global = rdmsr(IA32_PERF_GLOBAL_CTRL);
        wrmsr(IA32_PERF_GLOBAL_CTRL, global & !global_bit(c));
        if let Counter::Fixed(index) = c {
            let ctrl = rdmsr(IA32_FIXED_CTR_CTRL);
            wrmsr(IA32_FIXED_CTR_CTRL, ctrl & !fixed_ctrl_bits(index));
        }
    }

    /// # Safety
    ///
    /// Ring 0 only.
    pub unsafe fn reset_counter(&self, c: Counter) {
        if let Counter::Fixed(index) = c {
            wrmsr(IA32_FIXED_CTR0 + u32::from(index), 0);
        }
    }

    /// A fixed counter is in use when some ring is enabled for it and its
    /// global enable bit is set.
    ///
    /// # Safety
    ///
    /// Ring 0 only.
    pub unsafe fn check_in_use(&self, c: Counter) -> bool {
        let enabled = rdmsr(IA32_PERF_GLOBAL_CTRL) & global_bit(c) != 0;
        match c {
            Counter::Fixed(index) => enabled && rdmsr(IA32_FIXED_CTR_CTRL) & fixed_ctrl_bits(index) != 0,
            Counter::Programmable(_) => enabled,
        }
    }
}

const fn fixed_ctrl_bits(index: u8) -> u64 {
    FIXED_CTRL_OS_USR << (4 * index as u32)
}

const fn global_bit(c: Counter) -> u64 {
    match c {
        Counter::Fixed(index) => 1 << (32 + index as u32),
        Counter::Programmable(index) => 1 << index as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_leaf_0a() {
        // Version 4, 8 general counters of 48 bits, 3 fixed of 48 bits.
        let ctl = PerfCounterControler::from_leaf(0x0730_0804, 0x0000_0603);
        assert_eq!(ctl.get_version_identifier(), 4);
        assert_eq!(ctl.get_number_msr(), 8);
        assert_eq!(ctl.get_bit_width(), 48);
        assert_eq!(ctl.get_number_fixed_function_counter(), 3);
        assert_eq!(ctl.get_bit_width_fixed_counter(), 48);
        assert_eq!(ctl.require_fixed(2), Ok(()));
    }

    #[test]
    fn old_pmu_has_no_fixed_counters() {
        let ctl = PerfCounterControler::from_leaf(0x0000_0401, 0);
        assert_eq!(ctl.require_fixed(2), Err(Error::UnsupportedFixPmc { version: 1, fixed: 0 }));
    }

    #[test]
    fn control_bit_layout() {
        assert_eq!(fixed_ctrl_bits(0), 0x3);
        assert_eq!(fixed_ctrl_bits(1), 0x30);
        assert_eq!(global_bit(Counter::Fixed(1)), 1 << 33);
        assert_eq!(global_bit(Counter::Programmable(2)), 1 << 2);
    }
}
