/*++

Licensed under the Apache-2.0 license.

File Name:

    fdt.rs

Abstract:

    Device tree lookups used by the FIT validator, on top of the `fdt` crate.

--*/

use fdt::node::FdtNode;
use fdt::Fdt;
use flashy_error::{FlashyError, FlashyResult};
use zerocopy::byteorder::big_endian;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::bounds::{checked_add_u32, get_word};

/// Version of the FDT specification supported by this reader.
const FDT_VERSION: u32 = 17;

#[repr(C)]
#[allow(dead_code)]
#[derive(Debug, Copy, Clone, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
struct FdtHeader {
    magic: big_endian::U32,
    totalsize: big_endian::U32,
    off_dt_struct: big_endian::U32,
    off_dt_strings: big_endian::U32,
    off_mem_rsvmap: big_endian::U32,
    version: big_endian::U32,
    last_comp_version: big_endian::U32,
    boot_cpuid_phys: big_endian::U32,
    size_dt_strings: big_endian::U32,
    size_dt_struct: big_endian::U32,
}

fn parse_err(reason: impl Into<String>) -> FlashyError {
    FlashyError::FdtParse(reason.into())
}

// The crate slices the structure and strings blocks straight from the header
// offsets, so both must be proven to lie inside the blob first.
fn check_header(data: &[u8]) -> FlashyResult<()> {
    let (header, _) = FdtHeader::ref_from_prefix(data)
        .map_err(|_| parse_err(format!("blob too short ({}) for header", data.len())))?;

    if !(header.last_comp_version.get()..=header.version.get()).contains(&FDT_VERSION) {
        let version = header.version.get();
        return Err(parse_err(format!("unsupported version {version}")));
    }

    if header.off_mem_rsvmap.get() > header.off_dt_struct.get() {
        return Err(parse_err("dt_struct not after memrsvmap"));
    }
    let totalsize = header.totalsize.get();
    let struct_end = checked_add_u32(header.off_dt_struct.get(), header.size_dt_struct.get())?;
    let strings_end = checked_add_u32(header.off_dt_strings.get(), header.size_dt_strings.get())?;
    if struct_end > totalsize || strings_end > totalsize {
        return Err(parse_err(format!("blocks end past totalsize {totalsize:#x}")));
    }
    Ok(())
}

/// Parses the blob at the start of `data`.
///
/// `data` may extend past the blob's `totalsize`; the trailing bytes are
/// ignored.
pub fn parse(data: &[u8]) -> FlashyResult<Fdt<'_>> {
    let fdt = Fdt::new(data).map_err(|e| parse_err(e.to_string()))?;
    check_header(data)?;
    Ok(fdt)
}

/// Root node of a parsed tree.
pub fn root<'b, 'a>(fdt: &'b Fdt<'a>) -> FlashyResult<FitNode<'b, 'a>> {
    fdt.find_node("/")
        .map(FitNode)
        .ok_or_else(|| parse_err("no root node"))
}

/// A device tree node with the lookups a FIT image needs.
#[derive(Clone, Copy)]
pub struct FitNode<'b, 'a>(FdtNode<'b, 'a>);

impl<'b, 'a> FitNode<'b, 'a> {
    pub fn name(&self) -> &'a str {
        self.0.name
    }

    pub fn children(&self) -> impl Iterator<Item = FitNode<'b, 'a>> {
        self.0.children().map(FitNode)
    }

    pub fn child(&self, name: &str) -> FlashyResult<FitNode<'b, 'a>> {
        self.children()
            .find(|c| c.name() == name)
            .ok_or_else(|| FlashyError::FitNodeMissing(name.to_string()))
    }

    pub fn property(&self, name: &str) -> FlashyResult<&'a [u8]> {
        self.0
            .property(name)
            .map(|p| p.value)
            .ok_or_else(|| FlashyError::FitPropertyMissing {
                node: self.name().to_string(),
                property: name.to_string(),
            })
    }

    /// Property holding a single big-endian `u32` cell.
    pub fn property_u32(&self, name: &str) -> FlashyResult<u32> {
        let value = self.property(name)?;
        if value.len() != 4 {
            return Err(parse_err(format!(
                "property '{name}' of node '{}' is {} bytes, expected 4",
                self.name(),
                value.len()
            )));
        }
        get_word(value, 0)
    }

    /// Property holding a NUL-terminated string.
    pub fn property_str(&self, name: &str) -> FlashyResult<&'a str> {
        let value = self.property(name)?;
        let end = value.iter().position(|&b| b == 0).unwrap_or(value.len());
        core::str::from_utf8(&value[..end])
            .map_err(|_| parse_err(format!("property '{name}' is not a valid string")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashy_image_serde::FdtWriter;

    fn example_blob() -> Vec<u8> {
        let mut w = FdtWriter::new();
        w.begin_node("");
        w.property("foo", b"");
        w.begin_node("images");
        w.begin_node("kernel");
        w.property("data", &[1, 2, 3, 4, 5]);
        w.property_u32("data-size", 5);
        w.end_node();
        w.end_node();
        w.begin_node("configurations");
        w.property_str("default", "conf-1");
        w.end_node();
        w.end_node();
        w.finish()
    }

    #[test]
    fn test_lookups() {
        let blob = example_blob();
        let tree = parse(&blob).unwrap();
        let root = root(&tree).unwrap();
        assert_eq!(root.property("foo").unwrap(), b"");
        let images = root.child("images").unwrap();
        let kernel = images.child("kernel").unwrap();
        assert_eq!(kernel.property("data").unwrap(), &[1u8, 2, 3, 4, 5]);
        assert_eq!(kernel.property_u32("data-size").unwrap(), 5);
        assert!(matches!(kernel.property_u32("data"), Err(FlashyError::FdtParse(_))));
        assert_eq!(
            kernel.property("data-position").err(),
            Some(FlashyError::FitPropertyMissing {
                node: "kernel".into(),
                property: "data-position".into(),
            })
        );
        let conf = root.child("configurations").unwrap();
        assert_eq!(conf.property_str("default").unwrap(), "conf-1");
        assert_eq!(
            root.child("nope").err(),
            Some(FlashyError::FitNodeMissing("nope".into()))
        );
    }

    #[test]
    fn test_trailing_padding_ignored() {
        let mut blob = example_blob();
        blob.extend_from_slice(&[0xFF; 4096]);
        assert!(parse(&blob).is_ok());
    }

    #[test]
    fn test_bad_header() {
        assert!(matches!(parse(&[]), Err(FlashyError::FdtParse(_))));

        let mut blob = example_blob();
        blob[0] = 0;
        assert!(matches!(parse(&blob), Err(FlashyError::FdtParse(_))));

        // Structure block claimed to run past totalsize.
        let mut blob = example_blob();
        blob[36..40].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(parse(&blob).is_err());

        // Version 16 only.
        let mut blob = example_blob();
        blob[20..24].copy_from_slice(&16u32.to_be_bytes());
        assert!(matches!(parse(&blob), Err(FlashyError::FdtParse(_))));
    }

    #[test]
    fn test_every_truncation_is_an_error() {
        let blob = example_blob();
        for len in 0..blob.len() {
            assert!(parse(&blob[..len]).is_err(), "len {len}");
        }
    }
}
