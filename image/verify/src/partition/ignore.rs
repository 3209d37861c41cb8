// Licensed under the Apache-2.0 license.

use flashy_error::FlashyResult;
use flashy_image_types::{PartitionConfigInfo, PartitionType};

use super::{region_size, Partition, PartitionValidator};
use crate::{PartitionRegistry, ValidationContext};

/// A partition whose contents are not understood and never read.
#[derive(Debug)]
pub struct IgnorePartition<'a> {
    config: PartitionConfigInfo,
    data: &'a [u8],
}

impl<'a> IgnorePartition<'a> {
    pub fn new(data: &'a [u8], config: PartitionConfigInfo) -> Self {
        Self { config, data }
    }
}

fn construct(data: &[u8], config: PartitionConfigInfo) -> Partition<'_> {
    Partition::Ignore(IgnorePartition::new(data, config))
}

pub(crate) fn register(registry: &mut PartitionRegistry) -> FlashyResult<()> {
    registry.register(PartitionType::Ignore, construct)
}

impl PartitionValidator for IgnorePartition<'_> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn size(&self) -> u32 {
        region_size(self.data)
    }

    fn kind(&self) -> PartitionType {
        PartitionType::Ignore
    }

    fn validate(&self, _ctx: &ValidationContext) -> FlashyResult<()> {
        log::info!("Partition '{}' ignored", self.config.name);
        Ok(())
    }
}
