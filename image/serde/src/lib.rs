/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    Serialization routines producing well-formed flashy partitions: FIT
    blobs, legacy U-Boot images, appended U-Boot checksum tables and the
    two self-describing meta manifests.

--*/

mod fdt;
mod meta;

use std::io::Write;

use crc::{Crc, CRC_32_ISO_HDLC};
use flashy_image_types::*;
use md5::{Digest, Md5};
use zerocopy::IntoBytes;

pub use fdt::FdtWriter;
pub use meta::{fbmeta_partition, lfmeta_manifest};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// MD5 of `data` as lower-case hex.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// SHA-256 of `data` as lower-case hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha2::Sha256::digest(data))
}

/// Legacy U-Boot Image Writer
pub struct LegacyUbootImageWriter<W: Write> {
    writer: W,
}

impl<W: Write> LegacyUbootImageWriter<W> {
    /// Create an instance of `LegacyUbootImageWriter`
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a 64-byte header describing `data`, followed by `data`
    pub fn write(&mut self, name: &str, data: &[u8]) -> anyhow::Result<()> {
        let mut header = LegacyUbootHeader::default();
        header.magic.set(LEGACY_UBOOT_MAGIC);
        header.size.set(u32::try_from(data.len())?);
        header.dcrc.set(CRC32.checksum(data));
        let name = name.as_bytes();
        let len = name.len().min(LEGACY_UBOOT_NAME_SIZE - 1);
        header.name[..len].copy_from_slice(&name[..len]);
        header.hcrc.set(CRC32.checksum(header.as_bytes()));

        self.writer.write_all(header.as_bytes())?;
        self.writer.write_all(data)?;
        Ok(())
    }
}

/// Appends the 4 KiB JSON checksum table a modern U-Boot build carries,
/// listing the MD5 of `uboot` as the accepted checksum.
pub fn append_uboot_checksums(uboot: &[u8], signed_note: &str) -> anyhow::Result<Vec<u8>> {
    let mut table = serde_json::Map::new();
    table.insert(md5_hex(uboot), serde_json::Value::from(signed_note));
    let mut json = serde_json::to_vec(&table)?;
    if json.len() > UBOOT_CHECKSUMS_REGION_SIZE {
        anyhow::bail!("checksum table ({} bytes) exceeds 4 KiB", json.len());
    }
    json.resize(UBOOT_CHECKSUMS_REGION_SIZE, 0);

    let mut out = uboot.to_vec();
    out.extend_from_slice(&json);
    Ok(out)
}
