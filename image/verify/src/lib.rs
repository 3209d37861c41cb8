/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    Flashy image validation library: proves every partition of a firmware
    image internally consistent before the image is written to flash.

--*/

pub mod bounds;
pub mod fdt;
mod formats;
mod matcher;
mod orchestrator;
pub mod partition;
mod registry;

use flashy_error::{FlashyError, FlashyResult};
use flashy_image_types::VbootEnforcement;

pub use formats::builtin_image_formats;
pub use matcher::validate;
pub use orchestrator::{get_partitions_from_configs, validate_partitions_from_configs};
pub use partition::{Partition, PartitionValidator};
pub use registry::{PartitionConstructor, PartitionRegistry};

/// Number of times a meta partition may re-enter the orchestrator.
pub const MAX_META_RECURSION_DEPTH: u32 = 1;

/// Validation Environment
pub trait ValidationEnv: Sync {
    /// Get the vboot enforcement mode of the running system
    fn vboot_enforcement(&self) -> FlashyResult<VbootEnforcement>;
}

impl ValidationEnv for VbootEnforcement {
    fn vboot_enforcement(&self) -> FlashyResult<VbootEnforcement> {
        Ok(*self)
    }
}

/// Everything a validator may consult besides its own bytes.
#[derive(Clone, Copy)]
pub struct ValidationContext<'r> {
    env: &'r dyn ValidationEnv,
    registry: &'r PartitionRegistry,
    depth: u32,
}

impl<'r> ValidationContext<'r> {
    pub fn new(env: &'r dyn ValidationEnv, registry: &'r PartitionRegistry) -> Self {
        Self {
            env,
            registry,
            depth: 0,
        }
    }

    pub fn env(&self) -> &'r dyn ValidationEnv {
        self.env
    }

    pub fn registry(&self) -> &'r PartitionRegistry {
        self.registry
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Vboot enforcement of the running system. Any failure of the
    /// environment is reported as `VbootEnforcementUnavailable`.
    pub fn vboot_enforcement(&self) -> FlashyResult<VbootEnforcement> {
        self.env.vboot_enforcement().map_err(|e| match e {
            FlashyError::VbootEnforcementUnavailable(_) => e,
            other => FlashyError::VbootEnforcementUnavailable(other.report()),
        })
    }

    /// Context for partitions declared by a meta manifest.
    pub fn nested(&self) -> FlashyResult<Self> {
        let depth = self.depth + 1;
        if depth > MAX_META_RECURSION_DEPTH {
            return Err(FlashyError::RecursionLimit { depth });
        }
        Ok(Self { depth, ..*self })
    }
}
