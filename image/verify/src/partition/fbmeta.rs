/*++

Licensed under the Apache-2.0 license.

File Name:

    fbmeta.rs

Abstract:

    Image carrying a two-line JSON image-meta manifest at a fixed offset.
    The manifest is authenticated by the MD5 on its second line and then
    declares the layout of the rest of the image.

--*/

use std::sync::OnceLock;

use flashy_error::{FlashyError, FlashyResult};
use flashy_image_types::*;
use md5::{Digest, Md5};

use super::{region_size, Partition, PartitionValidator};
use crate::bounds::{checked_add_u32, slice_range};
use crate::{validate_partitions_from_configs, PartitionRegistry, ValidationContext};

#[derive(Debug)]
pub struct FbMetaImagePartition<'a> {
    config: PartitionConfigInfo,
    data: &'a [u8],
    manifest: OnceLock<FlashyResult<FbMetaInfo>>,
}

impl<'a> FbMetaImagePartition<'a> {
    pub fn new(data: &'a [u8], config: PartitionConfigInfo) -> Self {
        Self {
            config,
            data,
            manifest: OnceLock::new(),
        }
    }

    /// The image-meta region, shortened if the image ends inside it.
    fn meta_region(&self) -> FlashyResult<&'a [u8]> {
        let out_of_range = || FlashyError::MetaRegionOutOfRange {
            offset: FBMETA_META_OFFSET,
            size: FBMETA_META_SIZE,
            image_len: self.data.len(),
        };
        let start = FBMETA_META_OFFSET as usize;
        if start >= self.data.len() {
            return Err(out_of_range());
        }
        let end = checked_add_u32(FBMETA_META_OFFSET, FBMETA_META_SIZE)? as usize;
        slice_range(self.data, start, end.min(self.data.len()))
    }

    /// The authenticated manifest, parsed once.
    pub fn manifest(&self) -> FlashyResult<&FbMetaInfo> {
        self.manifest
            .get_or_init(|| parse_meta(self.meta_region()?))
            .as_ref()
            .map_err(Clone::clone)
    }
}

/// Parses and authenticates the image-meta region.
pub(crate) fn parse_meta(region: &[u8]) -> FlashyResult<FbMetaInfo> {
    let mut lines = region.splitn(3, |&b| b == b'\n');
    let (Some(line1), Some(line2), Some(_)) = (lines.next(), lines.next(), lines.next()) else {
        return Err(FlashyError::MetaIncomplete);
    };

    let checksum: FbMetaChecksum = serde_json::from_slice(line2)
        .map_err(|e| FlashyError::MetaJson(format!("image-meta checksum: {e}")))?;

    let computed = hex::encode(Md5::digest(line1));
    if computed != checksum.meta_md5 {
        return Err(FlashyError::MetaChecksumMismatch {
            computed,
            expected: checksum.meta_md5,
        });
    }

    serde_json::from_slice(line1).map_err(|e| FlashyError::MetaJson(format!("image-meta: {e}")))
}

/// Maps a manifest entry onto a general partition config.
pub(crate) fn partition_config(
    info: &FbMetaPartInfo,
    enforcement: VbootEnforcement,
) -> FlashyResult<PartitionConfigInfo> {
    let partition_type = match info.part_type.as_str() {
        // ROM is read-only when hardware enforced.
        FBMETA_ROM if enforcement == VbootEnforcement::HardwareEnforce => PartitionType::Ignore,
        FBMETA_ROM | FBMETA_RAW => PartitionType::FbmetaMd5,
        FBMETA_FIT => PartitionType::Fit,
        FBMETA_DATA | FBMETA_META | FBMETA_MTDONLY => PartitionType::Ignore,
        other => return Err(FlashyError::UnknownMetaPartitionType(other.to_string())),
    };
    Ok(PartitionConfigInfo {
        name: info.name.clone(),
        offset: info.offset,
        size: info.size,
        partition_type,
        fit_image_nodes: info.num_nodes,
        checksum: info.md5.clone(),
    })
}

fn construct(data: &[u8], config: PartitionConfigInfo) -> Partition<'_> {
    Partition::FbMeta(FbMetaImagePartition::new(data, config))
}

pub(crate) fn register(registry: &mut PartitionRegistry) -> FlashyResult<()> {
    registry.register(PartitionType::FbmetaImage, construct)
}

impl PartitionValidator for FbMetaImagePartition<'_> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn size(&self) -> u32 {
        region_size(self.data)
    }

    fn kind(&self) -> PartitionType {
        PartitionType::FbmetaImage
    }

    fn validate(&self, ctx: &ValidationContext) -> FlashyResult<()> {
        let manifest = self.manifest()?;
        log::info!(
            "'{}' image-meta version {} declares {} partition(s)",
            self.config.name,
            manifest.version,
            manifest.part_infos.len()
        );

        let enforcement = ctx.vboot_enforcement()?;
        let configs = manifest
            .part_infos
            .iter()
            .map(|info| partition_config(info, enforcement))
            .collect::<FlashyResult<Vec<_>>>()?;

        validate_partitions_from_configs(&ctx.nested()?, self.data, &configs)
    }
}
