/*++

Licensed under the Apache-2.0 license.

File Name:

    mod.rs

Abstract:

    Partition capability and the closed set of format validators.

--*/

mod digest;
mod fbmeta;
mod fit;
mod ignore;
mod legacy_uboot;
mod lfmeta;
mod uboot;
mod uboot_checksums;

use flashy_error::FlashyResult;
use flashy_image_types::PartitionType;

use crate::ValidationContext;

pub use digest::{DigestAlgo, DigestPartition};
pub use fbmeta::FbMetaImagePartition;
pub use fit::FitPartition;
pub use ignore::IgnorePartition;
pub use legacy_uboot::LegacyUbootPartition;
pub use lfmeta::LfMetaImagePartition;
pub use uboot::UbootPartition;
pub use uboot_checksums::UBOOT_KNOWN_CHECKSUMS;

pub(crate) use digest::register as register_digest;
pub(crate) use fbmeta::register as register_fbmeta;
pub(crate) use fit::register as register_fit;
pub(crate) use ignore::register as register_ignore;
pub(crate) use legacy_uboot::register as register_legacy_uboot;
pub(crate) use lfmeta::register as register_lfmeta;
pub(crate) use uboot::register as register_uboot;

/// Capability shared by every format validator.
pub trait PartitionValidator {
    /// Diagnostic name from the partition config
    fn name(&self) -> &str;

    /// Size of the byte region the partition owns
    fn size(&self) -> u32;

    /// Type tag the partition was constructed from
    fn kind(&self) -> PartitionType;

    /// Prove the owned region internally consistent
    fn validate(&self, ctx: &ValidationContext) -> FlashyResult<()>;
}

/// A partition constructed for one validation attempt.
#[derive(Debug)]
pub enum Partition<'a> {
    Ignore(IgnorePartition<'a>),
    LegacyUboot(LegacyUbootPartition<'a>),
    Uboot(UbootPartition<'a>),
    Fit(FitPartition<'a>),
    FbMeta(FbMetaImagePartition<'a>),
    LfMeta(LfMetaImagePartition<'a>),
    Digest(DigestPartition<'a>),
}

macro_rules! dispatch {
    ($self:ident, $p:ident => $e:expr) => {
        match $self {
            Partition::Ignore($p) => $e,
            Partition::LegacyUboot($p) => $e,
            Partition::Uboot($p) => $e,
            Partition::Fit($p) => $e,
            Partition::FbMeta($p) => $e,
            Partition::LfMeta($p) => $e,
            Partition::Digest($p) => $e,
        }
    };
}

impl PartitionValidator for Partition<'_> {
    fn name(&self) -> &str {
        dispatch!(self, p => p.name())
    }

    fn size(&self) -> u32 {
        dispatch!(self, p => p.size())
    }

    fn kind(&self) -> PartitionType {
        dispatch!(self, p => p.kind())
    }

    fn validate(&self, ctx: &ValidationContext) -> FlashyResult<()> {
        dispatch!(self, p => p.validate(ctx))
    }
}

/// Length of a region as the 32-bit size partitions report.
///
/// Regions are sliced with 32-bit offsets, so the length always fits.
pub(crate) fn region_size(data: &[u8]) -> u32 {
    u32::try_from(data.len()).unwrap_or(u32::MAX)
}
