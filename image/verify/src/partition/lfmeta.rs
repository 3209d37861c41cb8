/*++

Licensed under the Apache-2.0 license.

File Name:

    lfmeta.rs

Abstract:

    Image carrying a phosphor image manifest at one of two layout-specific
    locations. The manifest authenticates itself with a SHA-256 over the
    bytes preceding its own checksum key.

--*/

use std::sync::OnceLock;

use flashy_error::{FlashyError, FlashyResult};
use flashy_image_types::*;
use sha2::{Digest, Sha256};

use super::{region_size, Partition, PartitionValidator};
use crate::bounds::{checked_add_u32, find_bytes, slice_range};
use crate::{validate_partitions_from_configs, PartitionRegistry, ValidationContext};

#[derive(Debug)]
pub struct LfMetaImagePartition<'a> {
    config: PartitionConfigInfo,
    data: &'a [u8],
    manifest: OnceLock<FlashyResult<LfMetaManifest>>,
}

impl<'a> LfMetaImagePartition<'a> {
    pub fn new(data: &'a [u8], config: PartitionConfigInfo) -> Self {
        Self {
            config,
            data,
            manifest: OnceLock::new(),
        }
    }

    fn read_manifest_at(&self, offset: u32, size: u32) -> FlashyResult<LfMetaManifest> {
        let end = checked_add_u32(offset, size)?;
        let region = slice_range(self.data, offset as usize, end as usize).map_err(|_| {
            FlashyError::MetaRegionOutOfRange {
                offset,
                size,
                image_len: self.data.len(),
            }
        })?;
        parse_manifest(region)
    }

    fn find_manifest(&self) -> FlashyResult<LfMetaManifest> {
        let mut first_err = None;
        for (offset, size) in LFMETA_META_LOCATIONS {
            match self.read_manifest_at(offset, size) {
                Ok(manifest) => {
                    log::info!(
                        "'{}' image manifest found at {:#x}",
                        self.config.name,
                        offset
                    );
                    return Ok(manifest);
                }
                Err(err) if first_err.is_none() => first_err = Some(err),
                Err(err) => log::warn!(
                    "'{}' no image manifest at {:#x} either: {}",
                    self.config.name,
                    offset,
                    err
                ),
            }
        }
        Err(FlashyError::MetaLocationsExhausted {
            attempts: LFMETA_META_LOCATIONS.len(),
            source: Box::new(first_err.unwrap_or(FlashyError::MetaMarkerMissing)),
        })
    }

    /// The authenticated manifest, located and parsed once.
    pub fn manifest(&self) -> FlashyResult<&LfMetaManifest> {
        self.manifest
            .get_or_init(|| self.find_manifest())
            .as_ref()
            .map_err(Clone::clone)
    }
}

/// Parses and authenticates a manifest region.
pub(crate) fn parse_manifest(region: &[u8]) -> FlashyResult<LfMetaManifest> {
    let end = region.iter().position(|&b| b == 0).unwrap_or(region.len());
    let content = &region[..end];

    if find_bytes(content, LFMETA_MARKER.as_bytes()).is_none() {
        return Err(FlashyError::MetaMarkerMissing);
    }

    let manifest: LfMetaManifest = serde_json::from_slice(content)
        .map_err(|e| FlashyError::MetaJson(format!("image manifest: {e}")))?;

    let key = format!("\"{LFMETA_CHECKSUM_KEY}\"");
    let key_pos = find_bytes(content, key.as_bytes()).ok_or_else(|| {
        FlashyError::MetaJson(format!("image manifest: no literal {key} key"))
    })?;
    let computed = hex::encode(Sha256::digest(&content[..key_pos]));
    if !computed.eq_ignore_ascii_case(&manifest.manifest_sha256) {
        return Err(FlashyError::MetaChecksumMismatch {
            computed,
            expected: manifest.manifest_sha256,
        });
    }
    Ok(manifest)
}

pub(crate) fn partition_config(part: &LfMetaPartition) -> FlashyResult<PartitionConfigInfo> {
    let partition_type = match part.part_type.as_str() {
        LFMETA_DATA | LFMETA_JSON => PartitionType::Ignore,
        LFMETA_FIT | LFMETA_UBOOT => PartitionType::LfmetaSha256,
        // Emitted by manifest generator tests only.
        LFMETA_TESTING_ONLY => {
            return Err(FlashyError::UnknownMetaPartitionType(part.part_type.clone()))
        }
        other => return Err(FlashyError::UnknownMetaPartitionType(other.to_string())),
    };
    Ok(PartitionConfigInfo::new(&part.name, part.offset, part.size, partition_type)
        .with_checksum(&part.sha256))
}

fn construct(data: &[u8], config: PartitionConfigInfo) -> Partition<'_> {
    Partition::LfMeta(LfMetaImagePartition::new(data, config))
}

pub(crate) fn register(registry: &mut PartitionRegistry) -> FlashyResult<()> {
    registry.register(PartitionType::LfmetaImage, construct)
}

impl PartitionValidator for LfMetaImagePartition<'_> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn size(&self) -> u32 {
        region_size(self.data)
    }

    fn kind(&self) -> PartitionType {
        PartitionType::LfmetaImage
    }

    fn validate(&self, ctx: &ValidationContext) -> FlashyResult<()> {
        let manifest = self.manifest()?;
        if manifest.partitions.is_empty() {
            return Err(FlashyError::MetaNoPartitions);
        }

        let configs = manifest
            .partitions
            .iter()
            .map(partition_config)
            .collect::<FlashyResult<Vec<_>>>()?;

        validate_partitions_from_configs(&ctx.nested()?, self.data, &configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::test_util::with_ctx;
    use flashy_image_serde::lfmeta_manifest;

    fn part(name: &str, part_type: &str, sha256: &str) -> LfMetaPartition {
        LfMetaPartition {
            name: name.into(),
            offset: 0,
            size: 1024,
            part_type: part_type.into(),
            sha256: sha256.into(),
        }
    }

    fn image_with_manifest(location: usize, manifest: &[u8]) -> Vec<u8> {
        let (offset, _) = LFMETA_META_LOCATIONS[location];
        let mut data = vec![0u8; 1024 * 1024];
        data[offset as usize..][..manifest.len()].copy_from_slice(manifest);
        data
    }

    fn validate(data: &[u8]) -> FlashyResult<()> {
        let p = LfMetaImagePartition::new(
            data,
            PartitionConfigInfo::new("image", 0, FLASH_SIZE_128M, PartitionType::LfmetaImage),
        );
        with_ctx(VbootEnforcement::None, |ctx| p.validate(ctx))
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = lfmeta_manifest(vec![part("u-boot", LFMETA_UBOOT, "ab")]).unwrap();
        let parsed = parse_manifest(&manifest).unwrap();
        assert_eq!(parsed.partitions.len(), 1);

        let mut corrupt = manifest.clone();
        let pos = find_bytes(&corrupt, b"u-boot").unwrap();
        corrupt[pos] = b'U';
        assert!(matches!(
            parse_manifest(&corrupt),
            Err(FlashyError::MetaChecksumMismatch { .. })
        ));

        assert_eq!(parse_manifest(b"{}"), Err(FlashyError::MetaMarkerMissing));
    }

    #[test]
    fn test_second_location() {
        let uboot = vec![0u8; 1024];
        let sha = hex::encode(Sha256::digest(&uboot));
        let manifest = lfmeta_manifest(vec![
            part("u-boot", LFMETA_UBOOT, &sha),
            part("rwfs", LFMETA_DATA, ""),
        ])
        .unwrap();
        assert_eq!(validate(&image_with_manifest(1, &manifest)), Ok(()));
        assert_eq!(validate(&image_with_manifest(0, &manifest)), Ok(()));
    }

    #[test]
    fn test_no_location_reports_first_error() {
        let err = validate(&vec![0u8; 1024 * 1024]).unwrap_err();
        assert_eq!(
            err,
            FlashyError::MetaLocationsExhausted {
                attempts: 2,
                source: Box::new(FlashyError::MetaMarkerMissing),
            }
        );
    }

    #[test]
    fn test_first_location_error_wins() {
        let mut corrupt = lfmeta_manifest(vec![part("u-boot", LFMETA_UBOOT, "ab")]).unwrap();
        let pos = find_bytes(&corrupt, b"u-boot").unwrap();
        corrupt[pos] = b'U';

        // Checksum failure at the first location, nothing at the second.
        let err = validate(&image_with_manifest(0, &corrupt)).unwrap_err();
        let FlashyError::MetaLocationsExhausted { attempts: 2, source } = err else {
            panic!("unexpected error {err}");
        };
        assert!(matches!(*source, FlashyError::MetaChecksumMismatch { .. }));

        // Nothing at the first location, checksum failure at the second.
        let err = validate(&image_with_manifest(1, &corrupt)).unwrap_err();
        assert_eq!(err.root_cause(), &FlashyError::MetaMarkerMissing);
    }

    #[test]
    fn test_empty_partition_list() {
        let manifest = lfmeta_manifest(vec![]).unwrap();
        assert_eq!(
            validate(&image_with_manifest(0, &manifest)),
            Err(FlashyError::MetaNoPartitions)
        );
    }

    #[test]
    fn test_partition_types() {
        assert_eq!(
            partition_config(&part("x", LFMETA_JSON, "")).unwrap().partition_type,
            PartitionType::Ignore
        );
        assert_eq!(
            partition_config(&part("x", LFMETA_FIT, "")).unwrap().partition_type,
            PartitionType::LfmetaSha256
        );
        assert_eq!(
            partition_config(&part("x", LFMETA_TESTING_ONLY, "")),
            Err(FlashyError::UnknownMetaPartitionType(LFMETA_TESTING_ONLY.into()))
        );
        assert!(partition_config(&part("x", "rom", "")).is_err());
    }

    #[test]
    fn test_testing_only_type_fails_validation() {
        let manifest = lfmeta_manifest(vec![part("x", LFMETA_TESTING_ONLY, "")]).unwrap();
        let err = validate(&image_with_manifest(0, &manifest)).unwrap_err();
        assert_eq!(
            err.root_cause(),
            &FlashyError::UnknownMetaPartitionType(LFMETA_TESTING_ONLY.into())
        );
    }
}
