/*++

Licensed under the Apache-2.0 license.

File Name:

    orchestrator.rs

Abstract:

    Slices an image according to a partition config table, constructs each
    partition and validates them in declared order.

--*/

use flashy_error::{FlashyError, FlashyResult};
use flashy_image_types::{PartitionConfigInfo, PartitionType};

use crate::bounds::{checked_add_u32, slice_range};
use crate::{Partition, PartitionRegistry, PartitionValidator, ValidationContext};

/// Region of `data` owned by the partition `config` describes.
///
/// A partition reaching past the end of the image is shrunk to fit. A
/// partition starting past the end is an error unless it is ignored, in
/// which case it owns an empty region.
fn partition_region<'a>(data: &'a [u8], config: &PartitionConfigInfo) -> FlashyResult<&'a [u8]> {
    let image_len = data.len();
    let start = config.offset as usize;
    let mut end = checked_add_u32(config.offset, config.size)? as usize;

    if start > image_len {
        if config.partition_type == PartitionType::Ignore {
            return Ok(&[]);
        }
        return Err(FlashyError::StartOffsetTooLarge {
            offset: config.offset,
            image_len,
        });
    }

    if end > image_len {
        log::info!(
            "'{}' partition end ({:#x}) is past the image end ({:#x}), shrinking to {:#x} bytes",
            config.name,
            end,
            image_len,
            image_len - start
        );
        end = image_len;
    }

    slice_range(data, start, end)
}

/// Construct every partition `configs` declares over `data`.
pub fn get_partitions_from_configs<'a>(
    registry: &PartitionRegistry,
    data: &'a [u8],
    configs: &[PartitionConfigInfo],
) -> FlashyResult<Vec<Partition<'a>>> {
    configs
        .iter()
        .map(|config| {
            partition_region(data, config)
                .and_then(|region| registry.construct(region, config.clone()))
                .map_err(|err| err.in_partition(&config.name, config.partition_type))
        })
        .collect()
}

/// Validate `data` against the partition layout `configs`, stopping at the
/// first partition that fails.
pub fn validate_partitions_from_configs(
    ctx: &ValidationContext,
    data: &[u8],
    configs: &[PartitionConfigInfo],
) -> FlashyResult<()> {
    let partitions = get_partitions_from_configs(ctx.registry(), data, configs)?;

    for partition in &partitions {
        partition
            .validate(ctx)
            .map_err(|err| err.in_partition(partition.name(), partition.kind()))?;
    }

    log::info!("All {} partition(s) passed validation", partitions.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::test_util::{registry, with_ctx};
    use flashy_image_types::VbootEnforcement;

    #[test]
    fn test_shrink_to_image() {
        let data = vec![0u8; 4 * 1024];
        let configs = [PartitionConfigInfo::new("u-boot", 0, 20 * 1024, PartitionType::Uboot)];
        let partitions = get_partitions_from_configs(&registry(), &data, &configs).unwrap();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].size(), 4 * 1024);
        assert_eq!(partitions[0].kind(), PartitionType::Uboot);
    }

    #[test]
    fn test_start_offset_too_large() {
        let data = vec![0u8; 4 * 1024];
        let configs = [PartitionConfigInfo::new(
            "kernel",
            20 * 1024,
            1024,
            PartitionType::LegacyUboot,
        )];
        let err = get_partitions_from_configs(&registry(), &data, &configs).unwrap_err();
        assert_eq!(
            err.root_cause(),
            &FlashyError::StartOffsetTooLarge {
                offset: 20 * 1024,
                image_len: 4 * 1024
            }
        );
        assert!(matches!(err, FlashyError::Partition { ref name, .. } if name == "kernel"));
    }

    #[test]
    fn test_ignore_past_image_end() {
        let data = vec![0u8; 4 * 1024];
        let configs = [PartitionConfigInfo::new("data0", 20 * 1024, 1024, PartitionType::Ignore)];
        let partitions = get_partitions_from_configs(&registry(), &data, &configs).unwrap();
        assert_eq!(partitions[0].size(), 0);
        with_ctx(VbootEnforcement::None, |ctx| {
            assert_eq!(validate_partitions_from_configs(ctx, &data, &configs), Ok(()));
        });
    }

    #[test]
    fn test_offset_overflow() {
        let data = vec![0u8; 16];
        let configs = [PartitionConfigInfo::new("bad", u32::MAX, 2, PartitionType::Ignore)];
        let err = get_partitions_from_configs(&registry(), &data, &configs).unwrap_err();
        assert_eq!(err.root_cause(), &FlashyError::Overflow { lhs: u32::MAX, rhs: 2 });
    }

    #[test]
    fn test_unregistered_type_aborts() {
        let data = vec![0u8; 16];
        let configs = [PartitionConfigInfo::new("fit", 0, 16, PartitionType::Fit)];
        let err = get_partitions_from_configs(&PartitionRegistry::default(), &data, &configs)
            .unwrap_err();
        assert_eq!(
            err.root_cause(),
            &FlashyError::UnknownPartitionType("fit".into())
        );
    }

    #[test]
    fn test_fail_fast_names_partition() {
        let data = vec![0u8; 8 * 1024];
        let configs = [
            PartitionConfigInfo::new("env", 0, 1024, PartitionType::Ignore),
            PartitionConfigInfo::new("kernel", 1024, 1024, PartitionType::LegacyUboot),
            PartitionConfigInfo::new("u-boot", 2048, 1024, PartitionType::Uboot),
        ];
        let err = with_ctx(VbootEnforcement::None, |ctx| {
            validate_partitions_from_configs(ctx, &data, &configs)
        })
        .unwrap_err();
        match err {
            FlashyError::Partition {
                name,
                partition_type,
                source,
            } => {
                assert_eq!(name, "kernel");
                assert_eq!(partition_type, "legacy_uboot");
                assert!(matches!(
                    *source,
                    FlashyError::LegacyUbootHeaderChecksumMismatch { .. }
                ));
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
