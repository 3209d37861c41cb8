// Licensed under the Apache-2.0 license

#![no_main]

use flashy_image_types::VbootEnforcement;
use flashy_image_verify::{builtin_image_formats, validate, PartitionRegistry};
use libfuzzer_sys::fuzz_target;

// Arbitrary bytes must never panic the matcher, whatever format they resemble.
fuzz_target!(|data: &[u8]| {
    let Ok(registry) = PartitionRegistry::with_default_validators() else {
        return;
    };
    let formats = builtin_image_formats();
    let _ = validate(&VbootEnforcement::None, &registry, data, &formats);
});
