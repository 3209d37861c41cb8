// Licensed under the Apache-2.0 license

#![no_main]

use arbitrary::Arbitrary;
use flashy_image_types::{PartitionConfigInfo, PartitionType, VbootEnforcement};
use flashy_image_verify::{validate_partitions_from_configs, PartitionRegistry, ValidationContext};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    type_index: u8,
    offset: u32,
    size: u32,
    fit_image_nodes: Option<u32>,
    hardware_enforce: bool,
    data: &'a [u8],
}

fuzz_target!(|input: Input| {
    let Ok(registry) = PartitionRegistry::with_default_validators() else {
        return;
    };
    let partition_type = PartitionType::ALL[input.type_index as usize % PartitionType::ALL.len()];
    let mut config = PartitionConfigInfo::new("fuzz", input.offset, input.size, partition_type);
    config.fit_image_nodes = input.fit_image_nodes;

    let enforcement = if input.hardware_enforce {
        VbootEnforcement::HardwareEnforce
    } else {
        VbootEnforcement::None
    };
    let ctx = ValidationContext::new(&enforcement, &registry);
    let _ = validate_partitions_from_configs(&ctx, input.data, &[config]);
});
