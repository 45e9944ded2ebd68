//! Walker over a flattened device tree blob (`/dts-v1/`, version 17).
//!
//! Drives [`ScanCallbacks`] in document order: `open` at every
//! `FDT_BEGIN_NODE`, `prop` per `FDT_PROP`, `done` at `FDT_END_NODE`.
//! `reg` is decoded with the `#address-cells` of the parent node.

use core::slice;

use super::scan::{HardwareDescription, Property, ScanCallbacks};
use crate::error::DescriptionError;

const MAGIC: u32 = 0xd00d_feed;
const HEADER_LEN: usize = 40;

const BEGIN_NODE: u32 = 0x1;
const END_NODE: u32 = 0x2;
const PROP: u32 = 0x3;
const NOP: u32 = 0x4;
const END: u32 = 0x9;

/// Devicetree default when a node does not set `#address-cells`.
const DEFAULT_ADDRESS_CELLS: u32 = 2;
const MAX_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct FlattenedTree<'a> {
    structure: &'a [u8],
    strings: &'a [u8],
}

impl<'a> FlattenedTree<'a> {
    pub fn new(blob: &'a [u8]) -> Result<Self, DescriptionError> {
        let magic = be32(blob, 0)?;
        if magic != MAGIC {
            return Err(DescriptionError::BadMagic(magic));
        }
        if blob.len() < HEADER_LEN {
            return Err(DescriptionError::Truncated);
        }
        let structure = block(blob, be32(blob, 8)?, be32(blob, 36)?)?;
        let strings = block(blob, be32(blob, 12)?, be32(blob, 32)?)?;
        Ok(Self { structure, strings })
    }

    /// # Safety
    ///
    /// `address` must point at a device tree blob that stays mapped and
    /// unmodified for `'a`.
    pub unsafe fn from_raw(address: usize) -> Result<Self, DescriptionError> {
        let header = slice::from_raw_parts(address as *const u8, 8);
        if be32(header, 0)? != MAGIC {
            return Err(DescriptionError::BadMagic(be32(header, 0)?));
        }
        let total = be32(header, 4)? as usize;
        Self::new(slice::from_raw_parts(address as *const u8, total))
    }

    fn try_walk(&self, callbacks: &mut dyn ScanCallbacks) -> Result<(), DescriptionError> {
        // cells[d] is the #address-cells that children of depth-d nodes use.
        let mut cells = [DEFAULT_ADDRESS_CELLS; MAX_DEPTH + 1];
        let mut depth = 0;
        let mut at = 0;

        loop {
            let token = be32(self.structure, at)?;
            at += 4;
            match token {
                BEGIN_NODE => {
                    let name_len = self
                        .structure
                        .get(at..)
                        .and_then(|rest| rest.iter().position(|&b| b == 0))
                        .ok_or(DescriptionError::Truncated)?;
                    at = align(at + name_len + 1);
                    if depth == MAX_DEPTH {
                        return Err(DescriptionError::TooDeep(MAX_DEPTH));
                    }
                    depth += 1;
                    cells[depth] = DEFAULT_ADDRESS_CELLS;
                    callbacks.open();
                }
                END_NODE => {
                    if depth == 0 {
                        return Err(DescriptionError::Unbalanced);
                    }
                    callbacks.done();
                    depth -= 1;
                }
                PROP => {
                    if depth == 0 {
                        return Err(DescriptionError::Unbalanced);
                    }
                    let len = be32(self.structure, at)? as usize;
                    let name = self.string(be32(self.structure, at + 4)? as usize)?;
                    at += 8;
                    let value = self.structure.get(at..at + len).ok_or(DescriptionError::Truncated)?;
                    at = align(at + len);

                    if name == "#address-cells" {
                        cells[depth] = be32(value, 0)?;
                    }
                    callbacks.prop(&Property { name, value, address_cells: cells[depth - 1] });
                }
                NOP => {}
                END => return Ok(()),
                other => return Err(DescriptionError::UnknownToken(other)),
            }
        }
    }

    fn string(&self, offset: usize) -> Result<&'a str, DescriptionError> {
        let rest = self.strings.get(offset..).ok_or(DescriptionError::BadName)?;
        let len = rest.iter().position(|&b| b == 0).ok_or(DescriptionError::BadName)?;
        core::str::from_utf8(&rest[..len]).map_err(|_| DescriptionError::BadName)
    }
}

impl HardwareDescription for FlattenedTree<'_> {
    /// A malformed blob ends the walk early; nodes already visited stand.
    fn walk(&self, callbacks: &mut dyn ScanCallbacks) {
        if let Err(err) = self.try_walk(callbacks) {
            log::warn!("device tree: {}", err);
        }
    }
}

fn be32(bytes: &[u8], at: usize) -> Result<u32, DescriptionError> {
    let word = bytes.get(at..at + 4).ok_or(DescriptionError::Truncated)?;
    Ok(u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
}

fn block(blob: &[u8], offset: u32, size: u32) -> Result<&[u8], DescriptionError> {
    let start = offset as usize;
    blob.get(start..start + size as usize).ok_or(DescriptionError::Truncated)
}

const fn align(at: usize) -> usize {
    (at + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::scan::UartScan;

    /// Assembles a version 17 blob.
    #[derive(Default)]
    struct Blob {
        structure: Vec<u8>,
        strings: Vec<u8>,
    }

    impl Blob {
        fn word(&mut self, value: u32) {
            self.structure.extend_from_slice(&value.to_be_bytes());
        }

        fn pad(&mut self) {
            while self.structure.len() % 4 != 0 {
                self.structure.push(0);
            }
        }

        fn begin(mut self, name: &str) -> Self {
            self.word(BEGIN_NODE);
            self.structure.extend_from_slice(name.as_bytes());
            self.structure.push(0);
            self.pad();
            self
        }

        fn prop(mut self, name: &str, value: &[u8]) -> Self {
            let offset = self.strings.len() as u32;
            self.strings.extend_from_slice(name.as_bytes());
            self.strings.push(0);
            self.word(PROP);
            self.word(value.len() as u32);
            self.word(offset);
            self.structure.extend_from_slice(value);
            self.pad();
            self
        }

        fn end(mut self) -> Self {
            self.word(END_NODE);
            self
        }

        fn finish(mut self) -> Vec<u8> {
            self.word(END);
            let struct_off = HEADER_LEN as u32;
            let strings_off = struct_off + self.structure.len() as u32;
            let total = strings_off + self.strings.len() as u32;

            let mut blob = Vec::new();
            for word in [
                MAGIC,
                total,
                struct_off,
                strings_off,
                0,
                17,
                16,
                0,
                self.strings.len() as u32,
                self.structure.len() as u32,
            ] {
                blob.extend_from_slice(&word.to_be_bytes());
            }
            blob.extend_from_slice(&self.structure);
            blob.extend_from_slice(&self.strings);
            blob
        }
    }

    fn cells(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    fn scan(blob: &[u8]) -> UartScan {
        let mut scan = UartScan::default();
        FlattenedTree::new(blob).unwrap().walk(&mut scan);
        scan
    }

    #[test]
    fn reg_uses_parent_address_cells() {
        let blob = Blob::default()
            .begin("")
            .prop("#address-cells", &cells(&[1]))
            .begin("uart@10000000")
            .prop("compatible", b"ns16550a\0")
            .prop("reg", &cells(&[0x1000_0000, 0x100]))
            .prop("clock-frequency", &cells(&[3_686_400]))
            .end()
            .end()
            .finish();

        let node = scan(&blob).found().unwrap();
        assert_eq!(node.base, 0x1000_0000);
        assert_eq!(node.clock_frequency, Some(3_686_400));
    }

    #[test]
    fn default_cells_are_two() {
        let blob = Blob::default()
            .begin("")
            .begin("soc")
            .prop("#address-cells", &cells(&[2]))
            .begin("serial@6230000")
            .prop("compatible", b"ns16550a\0")
            .prop("reg", &cells(&[0, 0x0623_0000, 0, 0x100]))
            .end()
            .end()
            .end()
            .finish();
        assert_eq!(scan(&blob).found().map(|n| n.base), Some(0x0623_0000));
    }

    #[test]
    fn rejects_foreign_blobs() {
        let mut blob = Blob::default().begin("").end().finish();
        blob[0] = 0;
        assert!(matches!(FlattenedTree::new(&blob), Err(DescriptionError::BadMagic(_))));
        assert_eq!(FlattenedTree::new(&[0xd0, 0x0d]).unwrap_err(), DescriptionError::Truncated);
    }

    #[test]
    fn truncated_structure_stops_the_walk() {
        let blob = Blob::default().begin("").prop("compatible", b"ns16550a\0").end().finish();
        let tree = FlattenedTree::new(&blob).unwrap();
        let cut = FlattenedTree { structure: &tree.structure[..12], strings: tree.strings };
        assert_eq!(cut.try_walk(&mut UartScan::default()), Err(DescriptionError::Truncated));
    }
}
