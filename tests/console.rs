use std::cell::RefCell;

use rust_opcost_bare_metal::console::scan::{
    ConsoleNode, HardwareDescription, Property, ScanCallbacks, DEFAULT_DIVISOR, FALLBACK_BASE,
};
use rust_opcost_bare_metal::console::uart16550::Uart16550;
use rust_opcost_bare_metal::console::{self, Registers};

/// A flattened node list: name / value pairs per node.
struct Description(Vec<Vec<(&'static str, Vec<u8>)>>);

impl HardwareDescription for Description {
    fn walk(&self, callbacks: &mut dyn ScanCallbacks) {
        for node in &self.0 {
            callbacks.open();
            for (name, value) in node {
                callbacks.prop(&Property { name: *name, value: value.as_slice(), address_cells: 1 });
            }
            callbacks.done();
        }
    }
}

#[derive(Default)]
struct Log {
    writes: RefCell<Vec<(usize, u32)>>,
}

impl Registers for Log {
    fn read(&self, _index: usize) -> u32 {
        0x20
    }

    fn write(&self, index: usize, value: u32) {
        self.writes.borrow_mut().push((index, value));
    }
}

fn discover(description: &Description) -> ConsoleNode {
    console::discover(description).unwrap_or(ConsoleNode::fallback())
}

#[test]
fn described_uart_is_configured_from_its_properties() {
    let description = Description(vec![
        vec![("compatible", b"riscv-virtio\0".to_vec())],
        vec![
            ("compatible", b"ns16550a\0".to_vec()),
            ("reg", 0x1000_0000u32.to_be_bytes().to_vec()),
            ("clock-frequency", 3_686_400u32.to_be_bytes().to_vec()),
            ("current-speed", 115_200u32.to_be_bytes().to_vec()),
        ],
    ]);
    let node = discover(&description);
    assert_eq!(node.base, 0x1000_0000);
    assert_eq!(node.divisor(), 2);

    let uart = Uart16550::new(Log::default());
    uart.configure(node.divisor());
    uart.put_byte(b'\n');
    assert_eq!(
        *uart.registers().writes.borrow(),
        vec![(1, 0x00), (3, 0x80), (0, 0x02), (1, 0x00), (3, 0x03), (2, 0xC7), (0, 0x0a)]
    );
}

#[test]
fn missing_uart_falls_back_to_fixed_address() {
    let description = Description(vec![vec![("compatible", b"ns16550a\0".to_vec())]]);
    let node = discover(&description);
    assert_eq!(node.base, FALLBACK_BASE);
    assert_eq!(node.divisor(), DEFAULT_DIVISOR);
}
