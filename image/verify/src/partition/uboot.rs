// Licensed under the Apache-2.0 license.

use std::sync::OnceLock;

use flashy_error::{FlashyError, FlashyResult};
use flashy_image_types::*;
use md5::{Digest, Md5};

use super::uboot_checksums::UBOOT_KNOWN_CHECKSUMS;
use super::{region_size, Partition, PartitionValidator};
use crate::bounds::{get_word, slice_range};
use crate::{PartitionRegistry, ValidationContext};

/// A modern U-Boot binary, optionally carrying a trailing 4 KiB JSON table
/// of its own accepted MD5 digests.
#[derive(Debug)]
pub struct UbootPartition<'a> {
    config: PartitionConfigInfo,
    data: &'a [u8],
    known_checksums: &'static [&'static str],
    appended_checksums: OnceLock<Option<Vec<String>>>,
}

impl<'a> UbootPartition<'a> {
    pub fn new(data: &'a [u8], config: PartitionConfigInfo) -> Self {
        Self {
            config,
            data,
            known_checksums: UBOOT_KNOWN_CHECKSUMS,
            appended_checksums: OnceLock::new(),
        }
    }

    /// Replace the table consulted when no checksums are appended.
    pub fn with_known_checksums(mut self, known: &'static [&'static str]) -> Self {
        self.known_checksums = known;
        self
    }

    fn check_magic(&self) -> FlashyResult<()> {
        if self.data.len() < UBOOT_MAGIC_SIZE {
            return Err(FlashyError::UbootTooSmall {
                len: self.data.len(),
            });
        }
        let magic = get_word(self.data, 0)?;
        if !UBOOT_MAGICS.contains(&magic) {
            return Err(FlashyError::UbootMagicMismatch { found: magic });
        }
        Ok(())
    }

    /// Checksums listed in the trailing table, or `None` if there is none.
    fn appended_checksums(&self) -> Option<&[String]> {
        self.appended_checksums
            .get_or_init(|| match self.read_appended_checksums() {
                Ok(checksums) => {
                    log::info!(
                        "'{}' partition has appended checksum(s) {:?}",
                        self.config.name,
                        checksums
                    );
                    Some(checksums)
                }
                Err(reason) => {
                    log::info!(
                        "'{}' partition has no appended checksums: {}. Using known checksums",
                        self.config.name,
                        reason
                    );
                    None
                }
            })
            .as_deref()
    }

    fn read_appended_checksums(&self) -> Result<Vec<String>, String> {
        let len = self.data.len();
        if len < UBOOT_CHECKSUMS_REGION_SIZE {
            return Err(format!("too small ({len}) to contain appended checksums"));
        }
        let region = slice_range(self.data, len - UBOOT_CHECKSUMS_REGION_SIZE, len)
            .map_err(|e| e.to_string())?;
        let start = region.iter().position(|&b| b != 0).unwrap_or(region.len());
        let end = region.iter().rposition(|&b| b != 0).map_or(start, |i| i + 1);

        let table: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&region[start..end]).map_err(|e| e.to_string())?;
        Ok(table.into_iter().map(|(k, _)| k).collect())
    }

    fn checksum(&self) -> FlashyResult<String> {
        let end = match self.appended_checksums() {
            Some(_) => self.data.len() - UBOOT_CHECKSUMS_REGION_SIZE,
            None => self.data.len(),
        };
        let region = slice_range(self.data, 0, end)?;
        Ok(hex::encode(Md5::digest(region)))
    }
}

fn construct(data: &[u8], config: PartitionConfigInfo) -> Partition<'_> {
    Partition::Uboot(UbootPartition::new(data, config))
}

pub(crate) fn register(registry: &mut PartitionRegistry) -> FlashyResult<()> {
    registry.register(PartitionType::Uboot, construct)
}

impl PartitionValidator for UbootPartition<'_> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn size(&self) -> u32 {
        region_size(self.data)
    }

    fn kind(&self) -> PartitionType {
        PartitionType::Uboot
    }

    fn validate(&self, ctx: &ValidationContext) -> FlashyResult<()> {
        // Read-only in hardware, so not a flashing hazard.
        if ctx.vboot_enforcement()? == VbootEnforcement::HardwareEnforce {
            log::info!(
                "U-Boot partition '{}' validation bypassed: this is a vboot system",
                self.config.name
            );
            return Ok(());
        }

        self.check_magic()?;

        let checksum = self.checksum()?;
        let appended = self.appended_checksums().unwrap_or_default();
        let recognized = self.known_checksums.iter().any(|c| *c == checksum)
            || appended.iter().any(|c| *c == checksum);
        if !recognized {
            return Err(FlashyError::UbootChecksumUnrecognized { checksum });
        }

        log::debug!("'{}' partition md5sum '{}' OK", self.config.name, checksum);
        log::info!("U-Boot partition '{}' passed validation", self.config.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::test_util::{with_broken_env, with_ctx};
    use flashy_image_serde::{append_uboot_checksums, md5_hex};

    fn uboot_binary() -> Vec<u8> {
        let mut data = 0x1300_00EAu32.to_be_bytes().to_vec();
        data.extend((0..4096u32).map(|i| (i % 251) as u8));
        data
    }

    fn check(p: &UbootPartition, enforcement: VbootEnforcement) -> FlashyResult<()> {
        with_ctx(enforcement, |ctx| p.validate(ctx))
    }

    fn config(data: &[u8]) -> PartitionConfigInfo {
        PartitionConfigInfo::new("u-boot", 0, region_size(data), PartitionType::Uboot)
    }

    #[test]
    fn test_appended_checksums() {
        let data = append_uboot_checksums(&uboot_binary(), "signed").unwrap();
        assert!(data.len() >= 8 * 1024);
        let p = UbootPartition::new(&data, config(&data));
        assert_eq!(check(&p, VbootEnforcement::None), Ok(()));
        assert_eq!(p.appended_checksums().map(|c| c.len()), Some(1));
    }

    #[test]
    fn test_known_checksums() {
        let data = uboot_binary();
        let known: &'static [&'static str] =
            Box::leak(vec![&*Box::leak(md5_hex(&data).into_boxed_str())].into_boxed_slice());

        let p = UbootPartition::new(&data, config(&data)).with_known_checksums(known);
        assert_eq!(check(&p, VbootEnforcement::None), Ok(()));
        assert_eq!(p.appended_checksums(), None);

        let p = UbootPartition::new(&data, config(&data));
        assert_eq!(
            check(&p, VbootEnforcement::None),
            Err(FlashyError::UbootChecksumUnrecognized {
                checksum: md5_hex(&data)
            })
        );
    }

    #[test]
    fn test_magic() {
        let mut data = uboot_binary();
        data[0] = 0x14;
        let p = UbootPartition::new(&data, config(&data));
        assert_eq!(
            check(&p, VbootEnforcement::SoftwareEnforce),
            Err(FlashyError::UbootMagicMismatch { found: 0x1400_00EA })
        );

        let p = UbootPartition::new(&data[..3], config(&data[..3]));
        assert_eq!(
            check(&p, VbootEnforcement::None),
            Err(FlashyError::UbootTooSmall { len: 3 })
        );
    }

    #[test]
    fn test_all_magics_accepted() {
        for magic in UBOOT_MAGICS {
            let mut binary = uboot_binary();
            binary[..4].copy_from_slice(&magic.to_be_bytes());
            let data = append_uboot_checksums(&binary, "").unwrap();
            let p = UbootPartition::new(&data, config(&data));
            assert_eq!(check(&p, VbootEnforcement::None), Ok(()));
        }
    }

    #[test]
    fn test_hardware_enforce_bypass() {
        let data = [0u8; 16];
        let p = UbootPartition::new(&data, config(&data));
        assert_eq!(check(&p, VbootEnforcement::HardwareEnforce), Ok(()));
    }

    #[test]
    fn test_vboot_query_failure() {
        let data = append_uboot_checksums(&uboot_binary(), "signed").unwrap();
        let p = UbootPartition::new(&data, config(&data));
        assert!(matches!(
            with_broken_env(|ctx| p.validate(ctx)),
            Err(FlashyError::VbootEnforcementUnavailable(_))
        ));
    }

    #[test]
    fn test_corrupted_with_appended_checksums() {
        let mut data = append_uboot_checksums(&uboot_binary(), "signed").unwrap();
        data[100] ^= 0x80;
        let p = UbootPartition::new(&data, config(&data));
        assert!(matches!(
            check(&p, VbootEnforcement::None),
            Err(FlashyError::UbootChecksumUnrecognized { .. })
        ));
    }
}
