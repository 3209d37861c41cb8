/*++

Licensed under the Apache-2.0 license.

File Name:

    registry.rs

Abstract:

    Table mapping partition type tags to validator constructors.

--*/

use std::collections::BTreeMap;

use flashy_error::{FlashyError, FlashyResult};
use flashy_image_types::{PartitionConfigInfo, PartitionType};

use crate::partition::{self, Partition};

/// Builds a partition over the region it owns.
pub type PartitionConstructor = for<'a> fn(&'a [u8], PartitionConfigInfo) -> Partition<'a>;

/// Partition factory registry.
///
/// Built once before any validation runs and only read afterwards.
#[derive(Default)]
pub struct PartitionRegistry {
    constructors: BTreeMap<PartitionType, PartitionConstructor>,
}

impl PartitionRegistry {
    /// Registry holding every built-in validator.
    pub fn with_default_validators() -> FlashyResult<Self> {
        let mut registry = Self::default();
        partition::register_ignore(&mut registry)?;
        partition::register_legacy_uboot(&mut registry)?;
        partition::register_uboot(&mut registry)?;
        partition::register_fit(&mut registry)?;
        partition::register_fbmeta(&mut registry)?;
        partition::register_lfmeta(&mut registry)?;
        partition::register_digest(&mut registry)?;
        Ok(registry)
    }

    /// Associate `partition_type` with `constructor`. Each type may be
    /// registered once.
    pub fn register(
        &mut self,
        partition_type: PartitionType,
        constructor: PartitionConstructor,
    ) -> FlashyResult<()> {
        if self.constructors.contains_key(&partition_type) {
            return Err(FlashyError::DuplicateRegistration(
                partition_type.to_string(),
            ));
        }
        self.constructors.insert(partition_type, constructor);
        Ok(())
    }

    pub fn is_registered(&self, partition_type: PartitionType) -> bool {
        self.constructors.contains_key(&partition_type)
    }

    pub fn registered_types(&self) -> impl Iterator<Item = PartitionType> + '_ {
        self.constructors.keys().copied()
    }

    /// Construct the partition `config` describes over `data`.
    pub fn construct<'a>(
        &self,
        data: &'a [u8],
        config: PartitionConfigInfo,
    ) -> FlashyResult<Partition<'a>> {
        let constructor = self
            .constructors
            .get(&config.partition_type)
            .ok_or_else(|| FlashyError::UnknownPartitionType(config.partition_type.to_string()))?;
        Ok(constructor(data, config))
    }
}
