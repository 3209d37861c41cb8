// Licensed under the Apache-2.0 license.

use flashy_image_types::FDT_MAGIC;

const FDT_BEGIN_NODE: u32 = 0x1;
const FDT_END_NODE: u32 = 0x2;
const FDT_PROP: u32 = 0x3;
const FDT_END: u32 = 0x9;

const FDT_HEADER_SIZE: usize = 40;
const FDT_RSVMAP_SIZE: usize = 16;

/// Builds a version 17 flattened device tree blob node by node.
#[derive(Default)]
pub struct FdtWriter {
    structure: Vec<u8>,
    strings: Vec<u8>,
}

impl FdtWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_u32(&mut self, val: u32) {
        self.structure.extend_from_slice(&val.to_be_bytes());
    }

    fn pad(&mut self) {
        while self.structure.len() % 4 != 0 {
            self.structure.push(0);
        }
    }

    fn string_offset(&mut self, name: &str) -> u32 {
        let mut offset = 0;
        for s in self.strings.split(|&b| b == 0) {
            if s == name.as_bytes() {
                return offset as u32;
            }
            offset += s.len() + 1;
        }
        let offset = self.strings.len() as u32;
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        offset
    }

    pub fn begin_node(&mut self, name: &str) {
        self.push_u32(FDT_BEGIN_NODE);
        self.structure.extend_from_slice(name.as_bytes());
        self.structure.push(0);
        self.pad();
    }

    pub fn end_node(&mut self) {
        self.push_u32(FDT_END_NODE);
    }

    pub fn property(&mut self, name: &str, value: &[u8]) {
        let name_off = self.string_offset(name);
        self.push_u32(FDT_PROP);
        self.push_u32(value.len() as u32);
        self.push_u32(name_off);
        self.structure.extend_from_slice(value);
        self.pad();
    }

    pub fn property_u32(&mut self, name: &str, value: u32) {
        self.property(name, &value.to_be_bytes());
    }

    pub fn property_str(&mut self, name: &str, value: &str) {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.property(name, &bytes);
    }

    /// Terminates the structure block and returns the complete blob.
    pub fn finish(mut self) -> Vec<u8> {
        self.push_u32(FDT_END);

        let off_mem_rsvmap = FDT_HEADER_SIZE;
        let off_dt_struct = off_mem_rsvmap + FDT_RSVMAP_SIZE;
        let off_dt_strings = off_dt_struct + self.structure.len();
        let totalsize = off_dt_strings + self.strings.len();

        let header = [
            FDT_MAGIC,
            totalsize as u32,
            off_dt_struct as u32,
            off_dt_strings as u32,
            off_mem_rsvmap as u32,
            17,
            16,
            0,
            self.strings.len() as u32,
            self.structure.len() as u32,
        ];

        let mut blob = Vec::with_capacity(totalsize);
        for word in header {
            blob.extend_from_slice(&word.to_be_bytes());
        }
        blob.extend_from_slice(&[0u8; FDT_RSVMAP_SIZE]);
        blob.extend_from_slice(&self.structure);
        blob.extend_from_slice(&self.strings);
        blob
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_fields() {
        let mut w = FdtWriter::new();
        w.begin_node("");
        w.property_str("description", "x");
        w.property_str("description", "y");
        w.end_node();
        let blob = w.finish();
        let word = |i: usize| u32::from_be_bytes(blob[i * 4..][..4].try_into().unwrap());
        assert_eq!(word(0), FDT_MAGIC);
        assert_eq!(word(1) as usize, blob.len());
        assert_eq!(word(2), 56);
        assert_eq!(word(5), 17);
        // "description\0" stored once
        assert_eq!(word(8), 12);
    }
}
