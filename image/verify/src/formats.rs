// Licensed under the Apache-2.0 license.

//! Partition layouts of the known image generations, in the order they
//! are tried.

use flashy_image_types::*;
use flashy_image_types::PartitionType::*;

const KB: u32 = 1024;
const MB: u32 = 1024 * KB;

fn part(name: &str, offset: u32, size: u32, partition_type: PartitionType) -> PartitionConfigInfo {
    PartitionConfigInfo::new(name, offset, size, partition_type)
}

pub fn builtin_image_formats() -> Vec<ImageFormat> {
    vec![
        ImageFormat::new(
            "fbmeta-image",
            vec![part("fbmeta-image", 0, FLASH_SIZE_32M, FbmetaImage)],
        ),
        ImageFormat::new(
            "lfmeta-image",
            vec![part("lfmeta-image", 0, FLASH_SIZE_128M, LfmetaImage)],
        ),
        ImageFormat::new(
            "vboot",
            vec![
                part("spl", 0, 256 * KB, Ignore),
                part("rec-u-boot", 256 * KB, 640 * KB, Uboot),
                part("u-boot-env", 896 * KB, 64 * KB, Ignore),
                part("image-meta", 960 * KB, 64 * KB, Ignore),
                part("u-boot-fit", 1024 * KB, 640 * KB, Fit).with_fit_image_nodes(1),
                part("os-fit", 1664 * KB, 31_850_496, Fit).with_fit_image_nodes(3),
            ],
        ),
        ImageFormat::new(
            "uboot-fit",
            vec![
                part("u-boot", 0, 384 * KB, Uboot),
                part("env", 384 * KB, 128 * KB, Ignore),
                part("fit", 512 * KB, 28160 * KB, Fit).with_fit_image_nodes(1),
                part("data0", 28 * MB, 4 * MB, Ignore),
            ],
        ),
        ImageFormat::new(
            "legacy-fido",
            vec![
                part("u-boot", 0, 384 * KB, Uboot),
                part("env", 384 * KB, 128 * KB, Ignore),
                part("kernel", 512 * KB, 4 * MB, LegacyUboot),
                part("rootfs", 4608 * KB, 24064 * KB, LegacyUboot),
                part("data0", 28 * MB, 4 * MB, Ignore),
            ],
        ),
    ]
}
