/*++

Licensed under the Apache-2.0 license.

File Name:

    fit.rs

Abstract:

    FIT (flattened image tree) partition validator. Every child of the
    `images` node carries a payload and a SHA-256 hash node; enough of them
    must verify to satisfy the configured minimum.

--*/

use flashy_error::{FlashyError, FlashyResult};
use flashy_image_types::*;
use sha2::{Digest, Sha256};

use super::{region_size, Partition, PartitionValidator};
use crate::bounds::{checked_add_u32, slice_range};
use crate::fdt::{self, FitNode};
use crate::{PartitionRegistry, ValidationContext};

const IMAGES_NODE: &str = "images";
const CONFIGURATIONS_NODE: &str = "configurations";

/// Hash node names, current naming first.
const HASH_NODE_NAMES: [&str; 2] = ["hash@1", "hash-1"];

#[derive(Debug)]
pub struct FitPartition<'a> {
    config: PartitionConfigInfo,
    data: &'a [u8],
}

impl<'a> FitPartition<'a> {
    pub fn new(data: &'a [u8], config: PartitionConfigInfo) -> Self {
        Self { config, data }
    }

    /// Minimum number of image nodes that must verify.
    pub fn required_image_nodes(&self) -> u32 {
        self.config.fit_image_nodes.unwrap_or(1)
    }

    /// Payload held inline in the `data` property.
    fn inline_data(&self, node: &FitNode<'_, 'a>) -> FlashyResult<&'a [u8]> {
        let data = node.property("data")?;
        if data.len() > self.data.len() {
            return Err(FlashyError::SliceOutOfRange {
                start: 0,
                end: data.len(),
                len: self.data.len(),
            });
        }
        Ok(data)
    }

    /// Payload stored after the blob, located by `data-position` and
    /// `data-size` relative to the start of the partition.
    fn linked_data(&self, node: &FitNode<'_, 'a>) -> FlashyResult<&'a [u8]> {
        let size = node.property_u32("data-size")?;
        let position = node.property_u32("data-position")?;
        let end = checked_add_u32(position, size)?;
        slice_range(self.data, position as usize, end as usize)
    }

    fn image_data(&self, node: &FitNode<'_, 'a>) -> FlashyResult<&'a [u8]> {
        match self.inline_data(node) {
            Ok(data) => Ok(data),
            Err(prop_err) => {
                self.linked_data(node)
                    .map_err(|link_err| FlashyError::FitImageDataUnavailable {
                        data_prop: prop_err.to_string(),
                        data_link: link_err.to_string(),
                    })
            }
        }
    }

    fn expected_digest(node: &FitNode<'_, 'a>) -> FlashyResult<&'a [u8]> {
        let hash = HASH_NODE_NAMES
            .iter()
            .find_map(|name| node.child(name).ok())
            .ok_or_else(|| FlashyError::FitNodeMissing(HASH_NODE_NAMES.join("' or '")))?;

        let algo = hash.property_str("algo")?;
        if algo != "sha256" {
            return Err(FlashyError::FitUnsupportedHashAlgo(algo.to_string()));
        }

        let value = hash.property("value")?;
        if value.len() != SHA256_DIGEST_BYTE_SIZE {
            return Err(FlashyError::FitInvalidHashLength(value.len()));
        }
        Ok(value)
    }

    fn validate_image_node(&self, node: &FitNode<'_, 'a>) -> FlashyResult<()> {
        let data = self.image_data(node)?;
        let expected = Self::expected_digest(node)?;
        let computed = Sha256::digest(data);
        if computed.as_slice() != expected {
            return Err(FlashyError::FitImageDigestMismatch {
                computed: hex::encode(computed),
                expected: hex::encode(expected),
            });
        }
        Ok(())
    }
}

fn construct(data: &[u8], config: PartitionConfigInfo) -> Partition<'_> {
    Partition::Fit(FitPartition::new(data, config))
}

pub(crate) fn register(registry: &mut PartitionRegistry) -> FlashyResult<()> {
    registry.register(PartitionType::Fit, construct)
}

impl PartitionValidator for FitPartition<'_> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn size(&self) -> u32 {
        region_size(self.data)
    }

    fn kind(&self) -> PartitionType {
        PartitionType::Fit
    }

    fn validate(&self, _ctx: &ValidationContext) -> FlashyResult<()> {
        let tree = fdt::parse(self.data)?;
        let root = fdt::root(&tree)?;
        let images = root.child(IMAGES_NODE)?;
        root.child(CONFIGURATIONS_NODE)?;

        let want = self.required_image_nodes();
        let mut got = 0;
        let mut total = 0;
        let mut first_failure = None;
        for node in images.children() {
            total += 1;
            match self.validate_image_node(&node) {
                Ok(()) => {
                    log::debug!("FIT image node '{}' verified", node.name());
                    got += 1;
                }
                Err(err) => {
                    let err = err.in_image_node(node.name());
                    log::warn!("'{}' partition: {}", self.config.name, err.report());
                    first_failure.get_or_insert(err);
                }
            }
        }

        if got < want {
            return Err(FlashyError::FitNotEnoughImageNodes {
                want,
                got,
                first_failure: first_failure.map(Box::new),
            });
        }

        log::info!(
            "FIT partition '{}' passed validation ({} of {} image nodes verified)",
            self.config.name,
            got,
            total
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::test_util::with_ctx;
    use flashy_image_serde::FdtWriter;

    enum Payload<'s> {
        Inline(&'s [u8]),
        Link { position: u32, size: u32 },
        Missing,
    }

    fn image_node(w: &mut FdtWriter, name: &str, hash_node: &str, payload: Payload, digest: &[u8]) {
        w.begin_node(name);
        w.property_str("description", name);
        match payload {
            Payload::Inline(data) => w.property("data", data),
            Payload::Link { position, size } => {
                w.property_u32("data-size", size);
                w.property_u32("data-position", position);
            }
            Payload::Missing => {}
        }
        w.begin_node(hash_node);
        w.property_str("algo", "sha256");
        w.property("value", digest);
        w.end_node();
        w.end_node();
    }

    fn fit(nodes: impl FnOnce(&mut FdtWriter)) -> Vec<u8> {
        let mut w = FdtWriter::new();
        w.begin_node("");
        w.property_str("description", "test FIT");
        w.begin_node(IMAGES_NODE);
        nodes(&mut w);
        w.end_node();
        w.begin_node(CONFIGURATIONS_NODE);
        w.begin_node("conf@1");
        w.property_str("kernel", "kernel@1");
        w.end_node();
        w.end_node();
        w.end_node();
        w.finish()
    }

    fn check(data: &[u8], fit_image_nodes: Option<u32>) -> FlashyResult<()> {
        let mut config = PartitionConfigInfo::new("os", 0, region_size(data), PartitionType::Fit);
        config.fit_image_nodes = fit_image_nodes;
        let p = FitPartition::new(data, config);
        with_ctx(VbootEnforcement::None, |ctx| p.validate(ctx))
    }

    fn sha(data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }

    #[test]
    fn test_inline_data_both_hash_eras() {
        let kernel = b"kernel image bytes".as_slice();
        for hash_node in HASH_NODE_NAMES {
            let blob = fit(|w| {
                image_node(w, "kernel@1", hash_node, Payload::Inline(kernel), &sha(kernel))
            });
            assert_eq!(check(&blob, None), Ok(()));
        }
    }

    #[test]
    fn test_linked_data() {
        let payload = [0x5au8; 512];
        let position = 0x1000;
        let mut data = fit(|w| {
            image_node(
                w,
                "kernel@1",
                "hash-1",
                Payload::Link {
                    position,
                    size: payload.len() as u32,
                },
                &sha(&payload),
            )
        });
        assert!(data.len() < position as usize);
        data.resize(position as usize, 0);
        data.extend_from_slice(&payload);
        assert_eq!(check(&data, Some(1)), Ok(()));

        // Data link past the end of the partition.
        data.truncate(position as usize + 100);
        let err = check(&data, Some(1)).unwrap_err();
        let FlashyError::FitNotEnoughImageNodes { first_failure, .. } = err else {
            panic!("unexpected error {err}");
        };
        assert!(matches!(
            first_failure.unwrap().root_cause(),
            FlashyError::FitImageDataUnavailable { .. }
        ));
    }

    #[test]
    fn test_linked_data_overflow() {
        let blob = fit(|w| {
            image_node(
                w,
                "kernel@1",
                "hash@1",
                Payload::Link {
                    position: 4,
                    size: u32::MAX,
                },
                &[0u8; 32],
            )
        });
        let err = check(&blob, None).unwrap_err();
        assert!(err.report().contains("overflow"), "{err}");
    }

    #[test]
    fn test_not_enough_image_nodes() {
        let kernel = b"kernel".as_slice();
        let blob = fit(|w| {
            image_node(w, "kernel@1", "hash@1", Payload::Inline(kernel), &sha(kernel));
            image_node(w, "ramdisk@1", "hash@1", Payload::Missing, &[0u8; 32]);
        });
        assert_eq!(check(&blob, Some(1)), Ok(()));
        let err = check(&blob, Some(2)).unwrap_err();
        match err {
            FlashyError::FitNotEnoughImageNodes {
                want: 2,
                got: 1,
                first_failure: Some(failure),
            } => {
                assert!(matches!(
                    *failure,
                    FlashyError::ImageNode { ref node, .. } if node == "ramdisk@1"
                ));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_digest_mismatch() {
        let blob = fit(|w| {
            image_node(w, "kernel@1", "hash@1", Payload::Inline(b"abc"), &sha(b"abd"))
        });
        let err = check(&blob, None).unwrap_err();
        let FlashyError::FitNotEnoughImageNodes { first_failure: Some(failure), .. } = err else {
            panic!("unexpected error {err}");
        };
        assert!(matches!(
            failure.root_cause(),
            FlashyError::FitImageDigestMismatch { .. }
        ));
    }

    #[test]
    fn test_hash_node_checks() {
        let node = |algo: &str, value: &[u8]| {
            let mut w = FdtWriter::new();
            w.begin_node("");
            w.begin_node("hash@1");
            w.property_str("algo", algo);
            w.property("value", value);
            w.end_node();
            w.end_node();
            w.finish()
        };
        let blob = node("md5", &[0u8; 16]);
        let tree = fdt::parse(&blob).unwrap();
        let root = fdt::root(&tree).unwrap();
        assert_eq!(
            FitPartition::expected_digest(&root),
            Err(FlashyError::FitUnsupportedHashAlgo("md5".into()))
        );
        let blob = node("sha256", &[0u8; 31]);
        let tree = fdt::parse(&blob).unwrap();
        let root = fdt::root(&tree).unwrap();
        assert_eq!(
            FitPartition::expected_digest(&root),
            Err(FlashyError::FitInvalidHashLength(31))
        );
    }

    #[test]
    fn test_missing_nodes() {
        let mut w = FdtWriter::new();
        w.begin_node("");
        w.begin_node(IMAGES_NODE);
        w.end_node();
        w.end_node();
        let blob = w.finish();
        assert_eq!(
            check(&blob, Some(0)),
            Err(FlashyError::FitNodeMissing(CONFIGURATIONS_NODE.into()))
        );
        assert!(matches!(check(&[], None), Err(FlashyError::FdtParse(_))));
    }
}
