/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Error type shared by the flashy image validation crates.

--*/
use core::fmt;
use std::error::Error as _;

use thiserror::Error;

/// Broad classification of a validation failure.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    /// Truncated data, out of range offsets, unparseable encodings
    Structural,
    /// Checksum or digest mismatches
    Authentication,
    /// Unknown tags, missing nodes or properties, malformed manifests
    Schema,
    /// Every candidate (image format, manifest location) failed
    Exhaustion,
}

/// Macro to define error code constants ensuring uniqueness
///
/// This macro takes a list of (name, value, doc) tuples and generates
/// constant definitions for each error code.
macro_rules! define_error_codes {
    ($(($name:ident, $value:expr, $doc:expr)),* $(,)?) => {
        $(
            #[doc = $doc]
            pub const $name: u32 = $value;
        )*

        #[cfg(test)]
        /// Returns a vector of all defined error codes for testing uniqueness
        pub fn all_codes() -> Vec<(&'static str, u32)> {
            vec![
                $(
                    (stringify!($name), $value),
                )*
            ]
        }
    };
}

/// Numeric error codes, stable across releases.
///
/// The upper 16 bits group codes by [`ErrorKind`].
pub mod code {
    define_error_codes![
        (SLICE_OUT_OF_RANGE, 0x0001_0001, "Slice range out of bounds"),
        (OVERFLOW, 0x0001_0002, "Unsigned 32-bit addition overflowed"),
        (START_OFFSET_TOO_LARGE, 0x0001_0003, "Partition starts beyond the image"),
        (LEGACY_UBOOT_TOO_SMALL, 0x0001_0004, "Legacy U-Boot header truncated"),
        (LEGACY_UBOOT_DATA_TRUNCATED, 0x0001_0005, "Legacy U-Boot data truncated"),
        (UBOOT_TOO_SMALL, 0x0001_0006, "U-Boot partition too small for magic"),
        (FDT_PARSE, 0x0001_0007, "Flattened device tree parse failure"),
        (FIT_IMAGE_DATA_UNAVAILABLE, 0x0001_0008, "FIT image node data unavailable"),
        (META_REGION_OUT_OF_RANGE, 0x0001_0009, "Meta region outside the image"),
        (META_INCOMPLETE, 0x0001_000A, "Meta partition incomplete"),
        (META_JSON, 0x0001_000B, "Meta partition JSON unparseable"),
        (RECURSION_LIMIT, 0x0001_000C, "Meta partition recursion limit reached"),
        (
            LEGACY_UBOOT_HEADER_CHECKSUM_MISMATCH,
            0x0002_0001,
            "Legacy U-Boot header checksum mismatch"
        ),
        (LEGACY_UBOOT_MAGIC_MISMATCH, 0x0002_0002, "Legacy U-Boot magic mismatch"),
        (LEGACY_UBOOT_DATA_CHECKSUM_MISMATCH, 0x0002_0003, "Legacy U-Boot data checksum mismatch"),
        (UBOOT_MAGIC_MISMATCH, 0x0002_0004, "U-Boot magic mismatch"),
        (UBOOT_CHECKSUM_UNRECOGNIZED, 0x0002_0005, "U-Boot checksum unrecognized"),
        (FIT_IMAGE_DIGEST_MISMATCH, 0x0002_0006, "FIT image node digest mismatch"),
        (FIT_NOT_ENOUGH_IMAGE_NODES, 0x0002_0007, "Not enough FIT image nodes validated"),
        (META_CHECKSUM_MISMATCH, 0x0002_0008, "Meta manifest checksum mismatch"),
        (META_MARKER_MISSING, 0x0002_0009, "Meta manifest marker missing"),
        (DIGEST_MISMATCH, 0x0002_000A, "Partition digest mismatch"),
        (UNKNOWN_PARTITION_TYPE, 0x0003_0001, "Partition type has no registered validator"),
        (DUPLICATE_REGISTRATION, 0x0003_0002, "Partition type registered twice"),
        (UNKNOWN_META_PARTITION_TYPE, 0x0003_0003, "Unknown partition type in meta manifest"),
        (FIT_NODE_MISSING, 0x0003_0004, "Required FIT node missing"),
        (FIT_PROPERTY_MISSING, 0x0003_0005, "Required FIT property missing"),
        (FIT_UNSUPPORTED_HASH_ALGO, 0x0003_0006, "FIT hash algorithm not sha256"),
        (FIT_INVALID_HASH_LENGTH, 0x0003_0007, "FIT hash value has wrong length"),
        (META_NO_PARTITIONS, 0x0003_0008, "Meta manifest declares no partitions"),
        (VBOOT_ENFORCEMENT_UNAVAILABLE, 0x0003_0009, "Unable to get vboot enforcement"),
        (NO_MATCHING_IMAGE_FORMAT, 0x0004_0001, "No image format matched"),
        (META_LOCATIONS_EXHAUSTED, 0x0004_0002, "No meta location authenticated"),
    ];
}

/// Flashy Error Type
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FlashyError {
    #[error("slice range [{start}, {end}) out of bounds for length {len}")]
    SliceOutOfRange {
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("unsigned addition overflow: {lhs} + {rhs}")]
    Overflow { lhs: u32, rhs: u32 },
    #[error("partition start offset ({offset}) is larger than image size ({image_len})")]
    StartOffsetTooLarge { offset: u32, image_len: usize },
    #[error("partition size ({len}) smaller than legacy U-Boot header size (64)")]
    LegacyUbootTooSmall { len: usize },
    #[error("legacy U-Boot data truncated: header declares {declared} bytes, {available} available")]
    LegacyUbootDataTruncated { declared: u32, available: usize },
    #[error("partition too small ({len}) to contain U-Boot magic")]
    UbootTooSmall { len: usize },
    #[error("unable to read FIT: {0}")]
    FdtParse(String),
    #[error("unable to get data: (1) 'data' property: {data_prop}; (2) data link: {data_link}")]
    FitImageDataUnavailable {
        data_prop: String,
        data_link: String,
    },
    #[error("meta region at {offset:#x} (size {size:#x}) is outside the image (size {image_len:#x})")]
    MetaRegionOutOfRange {
        offset: u32,
        size: u32,
        image_len: usize,
    },
    #[error("meta partition incomplete: cannot find two lines of JSON")]
    MetaIncomplete,
    #[error("unable to parse meta JSON: {0}")]
    MetaJson(String),
    #[error("meta partitions nested too deeply (depth {depth})")]
    RecursionLimit { depth: u32 },
    #[error("legacy U-Boot header checksum mismatch: header says {expected:#010x}, computed {computed:#010x}")]
    LegacyUbootHeaderChecksumMismatch { expected: u32, computed: u32 },
    #[error("legacy U-Boot magic {found:#010x} does not match {:#010x}", LEGACY_UBOOT_MAGIC)]
    LegacyUbootMagicMismatch { found: u32 },
    #[error("legacy U-Boot data checksum mismatch: header says {expected:#010x}, computed {computed:#010x}")]
    LegacyUbootDataChecksumMismatch { expected: u32, computed: u32 },
    #[error("magic {found:#010X} does not match any U-Boot magic")]
    UbootMagicMismatch { found: u32 },
    #[error("U-Boot md5sum '{checksum}' unrecognized")]
    UbootChecksumUnrecognized { checksum: String },
    #[error("calculated sha256 ({computed}) does not match that in FIT ({expected})")]
    FitImageDigestMismatch { computed: String, expected: String },
    #[error("not enough image nodes validated: want '{want}' got '{got}'")]
    FitNotEnoughImageNodes {
        want: u32,
        got: u32,
        #[source]
        first_failure: Option<Box<FlashyError>>,
    },
    #[error("meta checksum ({computed}) does not match checksum supplied ({expected})")]
    MetaChecksumMismatch { computed: String, expected: String },
    #[error("meta manifest marker not found")]
    MetaMarkerMissing,
    #[error("{algo} ({computed}) does not match expected ({expected})")]
    DigestMismatch {
        algo: &'static str,
        computed: String,
        expected: String,
    },
    #[error("no validator registered for partition type '{0}'")]
    UnknownPartitionType(String),
    #[error("partition type '{0}' registered more than once")]
    DuplicateRegistration(String),
    #[error("unknown partition type in image meta: '{0}'")]
    UnknownMetaPartitionType(String),
    #[error("child node with name '{0}' not found")]
    FitNodeMissing(String),
    #[error("property '{property}' not found in node '{node}'")]
    FitPropertyMissing { node: String, property: String },
    #[error("unsupported hash algorithm '{0}', only sha256 is accepted")]
    FitUnsupportedHashAlgo(String),
    #[error("hash value is {0} bytes, sha256 needs 32")]
    FitInvalidHashLength(usize),
    #[error("meta manifest declares no partitions")]
    MetaNoPartitions,
    #[error("unable to get vboot enforcement: {0}")]
    VbootEnforcementUnavailable(String),
    #[error("image does not match any known image format{}", render_failures(.0))]
    NoMatchingImageFormat(Vec<(String, FlashyError)>),
    #[error("no valid meta partition found in {attempts} location(s)")]
    MetaLocationsExhausted {
        attempts: usize,
        #[source]
        source: Box<FlashyError>,
    },
    /// A failure attributed to one partition of the layout
    #[error("'{name}' partition (type '{partition_type}') failed validation")]
    Partition {
        name: String,
        partition_type: String,
        #[source]
        source: Box<FlashyError>,
    },
    /// A failure attributed to one image node of a FIT blob
    #[error("image node '{node}' failed validation")]
    ImageNode {
        node: String,
        #[source]
        source: Box<FlashyError>,
    },
}

const LEGACY_UBOOT_MAGIC: u32 = 0x2705_1956;

fn render_failures(failures: &[(String, FlashyError)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("; '{name}': {}", err.report()))
        .collect()
}

impl FlashyError {
    /// Wrap `self` with the name and type tag of the partition that produced it.
    pub fn in_partition(self, name: &str, partition_type: impl fmt::Display) -> Self {
        FlashyError::Partition {
            name: name.to_string(),
            partition_type: partition_type.to_string(),
            source: Box::new(self),
        }
    }

    /// Wrap `self` with the name of the FIT image node that produced it.
    pub fn in_image_node(self, node: &str) -> Self {
        FlashyError::ImageNode {
            node: node.to_string(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping partition and image node wrappers.
    pub fn root_cause(&self) -> &FlashyError {
        match self {
            FlashyError::Partition { source, .. }
            | FlashyError::ImageNode { source, .. }
            | FlashyError::MetaLocationsExhausted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Renders the error followed by each cause in its source chain.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut cause = self.source();
        while let Some(err) = cause {
            out.push_str(": ");
            out.push_str(&err.to_string());
            cause = err.source();
        }
        out
    }

    /// Stable numeric code of the error. Wrappers report their innermost cause.
    pub fn code(&self) -> u32 {
        use FlashyError::*;
        match self {
            SliceOutOfRange { .. } => code::SLICE_OUT_OF_RANGE,
            Overflow { .. } => code::OVERFLOW,
            StartOffsetTooLarge { .. } => code::START_OFFSET_TOO_LARGE,
            LegacyUbootTooSmall { .. } => code::LEGACY_UBOOT_TOO_SMALL,
            LegacyUbootDataTruncated { .. } => code::LEGACY_UBOOT_DATA_TRUNCATED,
            UbootTooSmall { .. } => code::UBOOT_TOO_SMALL,
            FdtParse(_) => code::FDT_PARSE,
            FitImageDataUnavailable { .. } => code::FIT_IMAGE_DATA_UNAVAILABLE,
            MetaRegionOutOfRange { .. } => code::META_REGION_OUT_OF_RANGE,
            MetaIncomplete => code::META_INCOMPLETE,
            MetaJson(_) => code::META_JSON,
            RecursionLimit { .. } => code::RECURSION_LIMIT,
            LegacyUbootHeaderChecksumMismatch { .. } => code::LEGACY_UBOOT_HEADER_CHECKSUM_MISMATCH,
            LegacyUbootMagicMismatch { .. } => code::LEGACY_UBOOT_MAGIC_MISMATCH,
            LegacyUbootDataChecksumMismatch { .. } => code::LEGACY_UBOOT_DATA_CHECKSUM_MISMATCH,
            UbootMagicMismatch { .. } => code::UBOOT_MAGIC_MISMATCH,
            UbootChecksumUnrecognized { .. } => code::UBOOT_CHECKSUM_UNRECOGNIZED,
            FitImageDigestMismatch { .. } => code::FIT_IMAGE_DIGEST_MISMATCH,
            FitNotEnoughImageNodes { .. } => code::FIT_NOT_ENOUGH_IMAGE_NODES,
            MetaChecksumMismatch { .. } => code::META_CHECKSUM_MISMATCH,
            MetaMarkerMissing => code::META_MARKER_MISSING,
            DigestMismatch { .. } => code::DIGEST_MISMATCH,
            UnknownPartitionType(_) => code::UNKNOWN_PARTITION_TYPE,
            DuplicateRegistration(_) => code::DUPLICATE_REGISTRATION,
            UnknownMetaPartitionType(_) => code::UNKNOWN_META_PARTITION_TYPE,
            FitNodeMissing(_) => code::FIT_NODE_MISSING,
            FitPropertyMissing { .. } => code::FIT_PROPERTY_MISSING,
            FitUnsupportedHashAlgo(_) => code::FIT_UNSUPPORTED_HASH_ALGO,
            FitInvalidHashLength(_) => code::FIT_INVALID_HASH_LENGTH,
            MetaNoPartitions => code::META_NO_PARTITIONS,
            VbootEnforcementUnavailable(_) => code::VBOOT_ENFORCEMENT_UNAVAILABLE,
            NoMatchingImageFormat(_) => code::NO_MATCHING_IMAGE_FORMAT,
            MetaLocationsExhausted { .. } => code::META_LOCATIONS_EXHAUSTED,
            Partition { source, .. } | ImageNode { source, .. } => source.code(),
        }
    }

    /// Classification of the error, derived from its code.
    pub fn kind(&self) -> ErrorKind {
        match self.code() >> 16 {
            0x0001 => ErrorKind::Structural,
            0x0002 => ErrorKind::Authentication,
            0x0003 => ErrorKind::Schema,
            _ => ErrorKind::Exhaustion,
        }
    }
}

pub type FlashyResult<T> = Result<T, FlashyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::error::Error as StdError;

    #[test]
    fn test_error_codes_uniqueness() {
        let codes = code::all_codes();
        let mut error_values = HashSet::new();
        let mut duplicates = Vec::new();

        for (name, value) in codes {
            if !error_values.insert(value) {
                duplicates.push((name, value));
            }
        }

        assert!(
            duplicates.is_empty(),
            "Found duplicate error codes: {:?}",
            duplicates
        );
    }

    #[test]
    fn test_wrapped_error_keeps_cause() {
        let err = FlashyError::LegacyUbootMagicMismatch { found: 0 }
            .in_partition("kernel", "legacy_uboot");
        assert_eq!(err.code(), code::LEGACY_UBOOT_MAGIC_MISMATCH);
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(
            err.root_cause(),
            &FlashyError::LegacyUbootMagicMismatch { found: 0 }
        );
        assert!(err.to_string().starts_with("'kernel' partition (type 'legacy_uboot')"));
    }

    #[test]
    fn test_source_chain() {
        let inner = FlashyError::FitImageDigestMismatch {
            computed: "aa".into(),
            expected: "bb".into(),
        };
        let err = FlashyError::FitNotEnoughImageNodes {
            want: 1,
            got: 0,
            first_failure: Some(Box::new(inner.clone().in_image_node("kernel@1"))),
        }
        .in_partition("os", "fit");

        let mut chain = vec![];
        let mut cause: Option<&dyn StdError> = Some(&err);
        while let Some(e) = cause {
            chain.push(e.to_string());
            cause = e.source();
        }
        assert_eq!(
            chain,
            [
                "'os' partition (type 'fit') failed validation",
                "not enough image nodes validated: want '1' got '0'",
                "image node 'kernel@1' failed validation",
                "calculated sha256 (aa) does not match that in FIT (bb)",
            ]
        );
        assert_eq!(err.report(), chain.join(": "));
        assert!(StdError::source(&inner).is_none());
    }

    #[test]
    fn test_no_matching_format_lists_failures() {
        let err = FlashyError::NoMatchingImageFormat(vec![(
            "vboot".into(),
            FlashyError::MetaMarkerMissing.in_partition("meta", "lfmeta"),
        )]);
        assert_eq!(
            err.to_string(),
            "image does not match any known image format; 'vboot': \
             'meta' partition (type 'lfmeta') failed validation: meta manifest marker not found"
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(FlashyError::MetaIncomplete.kind(), ErrorKind::Structural);
        assert_eq!(FlashyError::MetaNoPartitions.kind(), ErrorKind::Schema);
        assert_eq!(
            FlashyError::NoMatchingImageFormat(vec![]).kind(),
            ErrorKind::Exhaustion
        );
    }
}
