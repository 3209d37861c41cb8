// Licensed under the Apache-2.0 license.

use crc::{Crc, CRC_32_ISO_HDLC};
use flashy_error::{FlashyError, FlashyResult};
use flashy_image_types::*;
use zerocopy::{FromBytes, IntoBytes};

use super::{region_size, Partition, PartitionValidator};
use crate::bounds::slice_range;
use crate::{PartitionRegistry, ValidationContext};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// A 64-byte legacy U-Boot header followed by the data it describes.
#[derive(Debug)]
pub struct LegacyUbootPartition<'a> {
    config: PartitionConfigInfo,
    data: &'a [u8],
}

impl<'a> LegacyUbootPartition<'a> {
    pub fn new(data: &'a [u8], config: PartitionConfigInfo) -> Self {
        Self { config, data }
    }

    fn header(&self) -> FlashyResult<LegacyUbootHeader> {
        let (header, _) = LegacyUbootHeader::read_from_prefix(self.data).map_err(|_| {
            FlashyError::LegacyUbootTooSmall {
                len: self.data.len(),
            }
        })?;
        Ok(header)
    }

    fn verify_header_checksum(header: &LegacyUbootHeader) -> FlashyResult<()> {
        let mut zeroed = *header;
        zeroed.hcrc.set(0);
        let computed = CRC32.checksum(zeroed.as_bytes());
        let expected = header.hcrc.get();
        if computed != expected {
            return Err(FlashyError::LegacyUbootHeaderChecksumMismatch { expected, computed });
        }
        Ok(())
    }

    fn verify_data(&self, header: &LegacyUbootHeader) -> FlashyResult<()> {
        let declared = header.size.get();
        let end = LEGACY_UBOOT_HEADER_SIZE
            .checked_add(declared as usize)
            .filter(|end| *end <= self.data.len())
            .ok_or(FlashyError::LegacyUbootDataTruncated {
                declared,
                available: self.data.len().saturating_sub(LEGACY_UBOOT_HEADER_SIZE),
            })?;
        let body = slice_range(self.data, LEGACY_UBOOT_HEADER_SIZE, end)?;

        let computed = CRC32.checksum(body);
        let expected = header.dcrc.get();
        if computed != expected {
            return Err(FlashyError::LegacyUbootDataChecksumMismatch { expected, computed });
        }
        Ok(())
    }
}

fn construct(data: &[u8], config: PartitionConfigInfo) -> Partition<'_> {
    Partition::LegacyUboot(LegacyUbootPartition::new(data, config))
}

pub(crate) fn register(registry: &mut PartitionRegistry) -> FlashyResult<()> {
    registry.register(PartitionType::LegacyUboot, construct)
}

impl PartitionValidator for LegacyUbootPartition<'_> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn size(&self) -> u32 {
        region_size(self.data)
    }

    fn kind(&self) -> PartitionType {
        PartitionType::LegacyUboot
    }

    fn validate(&self, _ctx: &ValidationContext) -> FlashyResult<()> {
        let header = self.header()?;

        Self::verify_header_checksum(&header)?;

        if header.magic.get() != LEGACY_UBOOT_MAGIC {
            return Err(FlashyError::LegacyUbootMagicMismatch {
                found: header.magic.get(),
            });
        }

        self.verify_data(&header)?;

        log::info!(
            "Legacy U-Boot partition '{}' passed validation",
            self.config.name
        );
        Ok(())
    }
}
