/*++

Licensed under the Apache-2.0 license.

File Name:

    matcher.rs

Abstract:

    Tries candidate image formats in order until one validates.

--*/

use flashy_error::{FlashyError, FlashyResult};
use flashy_image_types::ImageFormat;

use crate::{validate_partitions_from_configs, PartitionRegistry, ValidationContext, ValidationEnv};

/// Validate `data` against each of `formats` in turn and return the first
/// format it fully matches.
///
/// A failure under one format is logged and the next format is tried. If no
/// format matches, every failure is returned in order.
pub fn validate<'f>(
    env: &dyn ValidationEnv,
    registry: &PartitionRegistry,
    data: &[u8],
    formats: &'f [ImageFormat],
) -> FlashyResult<&'f ImageFormat> {
    let ctx = ValidationContext::new(env, registry);
    let mut failures = Vec::with_capacity(formats.len());

    for format in formats {
        log::info!("Attempting to validate image as '{}'", format.name);
        match validate_partitions_from_configs(&ctx, data, &format.partition_configs) {
            Ok(()) => {
                log::info!("Image matches format '{}'", format.name);
                return Ok(format);
            }
            Err(err) => {
                log::warn!(
                    "Image does not match format '{}': {}",
                    format.name,
                    err.report()
                );
                failures.push((format.name.clone(), err));
            }
        }
    }

    Err(FlashyError::NoMatchingImageFormat(failures))
}
