/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    File contains data structures describing firmware image layouts and
    the on-flash encodings of their partitions.

--*/

mod manifest;
mod vboot;

use core::fmt;
use core::str::FromStr;

use flashy_error::FlashyError;
use serde_derive::{Deserialize, Serialize};
use zerocopy::byteorder::big_endian;
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned};

pub use manifest::*;
pub use vboot::VbootEnforcement;

pub const LEGACY_UBOOT_MAGIC: u32 = 0x2705_1956;
pub const LEGACY_UBOOT_HEADER_SIZE: usize = core::mem::size_of::<LegacyUbootHeader>();
pub const LEGACY_UBOOT_NAME_SIZE: usize = 32;

/// ARM reset vectors found at the start of U-Boot binaries, read big-endian.
pub const UBOOT_MAGICS: [u32; 4] = [0x1300_00EA, 0xB800_00EA, 0xBE00_00EA, 0x0F00_00EA];
pub const UBOOT_MAGIC_SIZE: usize = 4;
/// Size of the JSON checksum table appended to modern U-Boot binaries.
pub const UBOOT_CHECKSUMS_REGION_SIZE: usize = 4 * 1024;

pub const FDT_MAGIC: u32 = 0xd00d_feed;
pub const SHA256_DIGEST_BYTE_SIZE: usize = 32;

/// Alignment every built-in partition offset and size is a multiple of.
pub const PARTITION_ALIGNMENT: u32 = 1024;

/// Nominal flash size of the older product generations.
pub const FLASH_SIZE_32M: u32 = 32 * 1024 * 1024;
pub const FLASH_SIZE_128M: u32 = 128 * 1024 * 1024;

/// Partition type tag selecting a format validator.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionType {
    Ignore,
    LegacyUboot,
    Uboot,
    Fit,
    FbmetaImage,
    FbmetaMd5,
    LfmetaImage,
    LfmetaSha256,
}

impl PartitionType {
    pub const ALL: [PartitionType; 8] = [
        PartitionType::Ignore,
        PartitionType::LegacyUboot,
        PartitionType::Uboot,
        PartitionType::Fit,
        PartitionType::FbmetaImage,
        PartitionType::FbmetaMd5,
        PartitionType::LfmetaImage,
        PartitionType::LfmetaSha256,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionType::Ignore => "ignore",
            PartitionType::LegacyUboot => "legacy_uboot",
            PartitionType::Uboot => "uboot",
            PartitionType::Fit => "fit",
            PartitionType::FbmetaImage => "fbmeta_image",
            PartitionType::FbmetaMd5 => "fbmeta_md5",
            PartitionType::LfmetaImage => "lfmeta_image",
            PartitionType::LfmetaSha256 => "lfmeta_sha256",
        }
    }
}

impl fmt::Display for PartitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartitionType {
    type Err = FlashyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PartitionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| FlashyError::UnknownPartitionType(s.to_string()))
    }
}

/// Declarative description of one partition slot.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PartitionConfigInfo {
    /// Diagnostic name
    pub name: String,

    /// Byte offset into the image
    pub offset: u32,

    /// Nominal byte length
    pub size: u32,

    #[serde(rename = "type")]
    pub partition_type: PartitionType,

    /// Minimum number of verified FIT image nodes; `None` means one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit_image_nodes: Option<u32>,

    /// Expected hex digest for the digest-based types
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

impl PartitionConfigInfo {
    pub fn new(name: &str, offset: u32, size: u32, partition_type: PartitionType) -> Self {
        Self {
            name: name.to_string(),
            offset,
            size,
            partition_type,
            fit_image_nodes: None,
            checksum: String::new(),
        }
    }

    pub fn with_fit_image_nodes(mut self, nodes: u32) -> Self {
        self.fit_image_nodes = Some(nodes);
        self
    }

    pub fn with_checksum(mut self, checksum: &str) -> Self {
        self.checksum = checksum.to_string();
        self
    }

    /// End offset, or `None` when `offset + size` overflows 32 bits.
    pub fn end(&self) -> Option<u32> {
        self.offset.checked_add(self.size)
    }
}

/// One named historical product layout.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ImageFormat {
    pub name: String,

    #[serde(rename = "partitions")]
    pub partition_configs: Vec<PartitionConfigInfo>,
}

impl ImageFormat {
    pub fn new(name: &str, partition_configs: Vec<PartitionConfigInfo>) -> Self {
        Self {
            name: name.to_string(),
            partition_configs,
        }
    }
}

/// Legacy U-Boot image header (`image_header_t`), stored big-endian.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct LegacyUbootHeader {
    /// Image header magic number
    pub magic: big_endian::U32,

    /// CRC-32 of the header with this field zeroed
    pub hcrc: big_endian::U32,

    /// Image creation timestamp
    pub time: big_endian::U32,

    /// Image data size, excluding the header
    pub size: big_endian::U32,

    /// Data load address
    pub load: big_endian::U32,

    /// Entry point address
    pub ep: big_endian::U32,

    /// CRC-32 of the image data
    pub dcrc: big_endian::U32,

    pub os: u8,
    pub arch: u8,
    pub image_type: u8,
    pub comp: u8,

    /// Image name, NUL padded
    pub name: [u8; LEGACY_UBOOT_NAME_SIZE],
}

impl Default for LegacyUbootHeader {
    fn default() -> Self {
        Self::new_zeroed()
    }
}
