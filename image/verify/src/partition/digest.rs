// Licensed under the Apache-2.0 license.

use flashy_error::{FlashyError, FlashyResult};
use flashy_image_types::{PartitionConfigInfo, PartitionType};
use md5::Md5;
use sha2::{Digest, Sha256};

use super::{region_size, Partition, PartitionValidator};
use crate::{PartitionRegistry, ValidationContext};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DigestAlgo {
    Md5,
    Sha256,
}

impl DigestAlgo {
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgo::Md5 => "md5",
            DigestAlgo::Sha256 => "sha256",
        }
    }

    /// Hex encoded digest of `data`.
    pub fn hex_digest(&self, data: &[u8]) -> String {
        match self {
            DigestAlgo::Md5 => hex::encode(Md5::digest(data)),
            DigestAlgo::Sha256 => hex::encode(Sha256::digest(data)),
        }
    }
}

/// A region whose digest must equal the checksum a meta manifest declared.
#[derive(Debug)]
pub struct DigestPartition<'a> {
    config: PartitionConfigInfo,
    data: &'a [u8],
    algo: DigestAlgo,
}

impl<'a> DigestPartition<'a> {
    pub fn new(data: &'a [u8], config: PartitionConfigInfo, algo: DigestAlgo) -> Self {
        Self { config, data, algo }
    }
}

fn construct_md5(data: &[u8], config: PartitionConfigInfo) -> Partition<'_> {
    Partition::Digest(DigestPartition::new(data, config, DigestAlgo::Md5))
}

fn construct_sha256(data: &[u8], config: PartitionConfigInfo) -> Partition<'_> {
    Partition::Digest(DigestPartition::new(data, config, DigestAlgo::Sha256))
}

pub(crate) fn register(registry: &mut PartitionRegistry) -> FlashyResult<()> {
    registry.register(PartitionType::FbmetaMd5, construct_md5)?;
    registry.register(PartitionType::LfmetaSha256, construct_sha256)
}

impl PartitionValidator for DigestPartition<'_> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn size(&self) -> u32 {
        region_size(self.data)
    }

    fn kind(&self) -> PartitionType {
        match self.algo {
            DigestAlgo::Md5 => PartitionType::FbmetaMd5,
            DigestAlgo::Sha256 => PartitionType::LfmetaSha256,
        }
    }

    fn validate(&self, _ctx: &ValidationContext) -> FlashyResult<()> {
        let computed = self.algo.hex_digest(self.data);
        if !computed.eq_ignore_ascii_case(self.config.checksum.trim()) {
            return Err(FlashyError::DigestMismatch {
                algo: self.algo.name(),
                computed,
                expected: self.config.checksum.clone(),
            });
        }
        log::info!(
            "Partition '{}' {} '{}' OK",
            self.config.name,
            self.algo.name(),
            computed
        );
        Ok(())
    }
}
