//! Console discovery over a hardware description.
//!
//! A [`HardwareDescription`] (on hardware, a
//! [`FlattenedTree`](super::fdt::FlattenedTree)) walks its nodes and hands
//! every property to a [`ScanCallbacks`]; this module only decides which
//! node is the console.

/// Base address used when no description node matches.
pub const FALLBACK_BASE: usize = 0x6230_0000;

/// Divisor used when the node lacks `clock-frequency` or `current-speed`.
pub const DEFAULT_DIVISOR: u16 = 0x2d;

const COMPATIBLE: &[u8] = b"ns16550a";

/// One property of the node currently open.
#[derive(Debug, Clone, Copy)]
pub struct Property<'a> {
    pub name: &'a str,
    /// Raw big-endian value as stored in the description.
    pub value: &'a [u8],
    /// `#address-cells` of the parent node, used to decode `reg`.
    pub address_cells: u32,
}

/// Visitor driven by [`HardwareDescription::walk`]: `open` at the start of
/// every node, `prop` once per property, `done` at the end of the node.
pub trait ScanCallbacks {
    fn open(&mut self);
    fn prop(&mut self, prop: &Property<'_>);
    fn done(&mut self);
}

pub trait HardwareDescription {
    fn walk(&self, callbacks: &mut dyn ScanCallbacks);
}

/// A matching console node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleNode {
    pub base: usize,
    pub current_speed: Option<u32>,
    pub clock_frequency: Option<u32>,
}

impl ConsoleNode {
    pub const fn fallback() -> Self {
        Self { base: FALLBACK_BASE, current_speed: None, clock_frequency: None }
    }

    /// `clock-frequency / (16 * current-speed)` truncated to the 16-bit
    /// latch, or [`DEFAULT_DIVISOR`] without both properties.
    pub fn divisor(&self) -> u16 {
        match (self.clock_frequency, self.current_speed) {
            (Some(freq), Some(speed)) if speed != 0 => (freq / speed.saturating_mul(16)) as u16,
            _ => DEFAULT_DIVISOR,
        }
    }
}

/// Finds the first `ns16550a` node with a non-zero `reg`.
#[derive(Debug, Default)]
pub struct UartScan {
    compatible: bool,
    reg: u64,
    current_speed: Option<u32>,
    clock_frequency: Option<u32>,
    found: Option<ConsoleNode>,
}

impl UartScan {
    pub fn found(&self) -> Option<ConsoleNode> {
        self.found
    }
}

impl ScanCallbacks for UartScan {
    fn open(&mut self) {
        self.compatible = false;
        self.reg = 0;
        self.current_speed = None;
        self.clock_frequency = None;
    }

    fn prop(&mut self, prop: &Property<'_>) {
        match prop.name {
            "compatible" => self.compatible = prop.value.split(|&b| b == 0).any(|entry| entry == COMPATIBLE),
            "reg" => self.reg = address(prop.value, prop.address_cells).unwrap_or(0),
            "current-speed" => self.current_speed = cell(prop.value),
            "clock-frequency" => self.clock_frequency = cell(prop.value),
            _ => {}
        }
    }

    fn done(&mut self) {
        if !self.compatible || self.reg == 0 || self.found.is_some() {
            return;
        }
        self.found = Some(ConsoleNode {
            base: self.reg as usize,
            current_speed: self.current_speed,
            clock_frequency: self.clock_frequency,
        });
    }
}

fn cell(value: &[u8]) -> Option<u32> {
    let bytes = value.get(..4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn address(value: &[u8], cells: u32) -> Option<u64> {
    let len = 4 * cells as usize;
    let bytes = value.get(..len)?;
    Some(bytes.chunks_exact(4).fold(0u64, |acc, chunk| {
        (acc << 32) | u64::from(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
    }))
}
