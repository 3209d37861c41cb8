// Licensed under the Apache-2.0 license.

//! JSON schemas of the self-describing meta partitions.

use serde_derive::{Deserialize, Serialize};

/// Offset of the image-meta partition in images carrying an FB meta manifest.
pub const FBMETA_META_OFFSET: u32 = 0xF_0000;
/// Size of the image-meta partition.
pub const FBMETA_META_SIZE: u32 = 0x1_0000;

pub const FBMETA_ROM: &str = "rom";
pub const FBMETA_RAW: &str = "raw";
pub const FBMETA_DATA: &str = "data";
pub const FBMETA_META: &str = "meta";
pub const FBMETA_FIT: &str = "fit";
pub const FBMETA_MTDONLY: &str = "mtdonly";

/// Line one of the image-meta partition.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FbMetaInfo {
    #[serde(rename = "FBOBMC_IMAGE_META_VER")]
    pub version: u32,

    pub part_infos: Vec<FbMetaPartInfo>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FbMetaPartInfo {
    pub name: String,

    pub offset: u32,

    pub size: u32,

    #[serde(rename = "type")]
    pub part_type: String,

    /// Expected MD5 of the partition, hex encoded
    #[serde(default, alias = "checksum", skip_serializing_if = "String::is_empty")]
    pub md5: String,

    /// Minimum number of FIT image nodes for `fit` partitions
    #[serde(rename = "num-nodes", default, skip_serializing_if = "Option::is_none")]
    pub num_nodes: Option<u32>,
}

/// Line two of the image-meta partition: MD5 of line one.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FbMetaChecksum {
    pub meta_md5: String,
}

/// Marker text every phosphor image manifest carries.
pub const LFMETA_MARKER: &str = "phosphor-image-manifest";
/// Key of the manifest's own checksum; the checksum covers every byte before it.
pub const LFMETA_CHECKSUM_KEY: &str = "manifest-sha256";

/// Candidate (offset, size) locations of the phosphor image manifest, for
/// 32 MiB and for 64/128 MiB flash layouts, in the order they are tried.
pub const LFMETA_META_LOCATIONS: [(u32, u32); 2] = [(0x5_F000, 0x1000), (0xD_E000, 0x2000)];

pub const LFMETA_DATA: &str = "data";
pub const LFMETA_FIT: &str = "fit";
pub const LFMETA_UBOOT: &str = "u-boot";
pub const LFMETA_JSON: &str = "json";
/// Only ever produced by tests; always rejected.
pub const LFMETA_TESTING_ONLY: &str = "don't-use--testing-only";

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LfMetaManifest {
    #[serde(rename = "type", default)]
    pub manifest_type: String,

    #[serde(default)]
    pub version: u32,

    #[serde(default)]
    pub partitions: Vec<LfMetaPartition>,

    #[serde(rename = "manifest-sha256")]
    pub manifest_sha256: String,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LfMetaPartition {
    pub name: String,

    pub offset: u32,

    pub size: u32,

    #[serde(rename = "type")]
    pub part_type: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sha256: String,
}
