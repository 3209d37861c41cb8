// Licensed under the Apache-2.0 license.

use anyhow::{bail, Context};
use flashy_image_types::*;

use crate::{md5_hex, sha256_hex};

/// Serializes the FB image-meta partition: the manifest line, the checksum
/// line, then NUL padding up to the partition size.
pub fn fbmeta_partition(info: &FbMetaInfo) -> anyhow::Result<Vec<u8>> {
    let line1 = serde_json::to_vec(info).context("serializing image meta")?;
    let checksum = FbMetaChecksum {
        meta_md5: md5_hex(&line1),
    };
    let line2 = serde_json::to_vec(&checksum)?;

    let mut out = line1;
    out.push(b'\n');
    out.extend_from_slice(&line2);
    out.push(b'\n');
    if out.len() > FBMETA_META_SIZE as usize {
        bail!("image meta ({} bytes) exceeds partition size", out.len());
    }
    out.resize(FBMETA_META_SIZE as usize, 0);
    Ok(out)
}

/// Serializes a phosphor image manifest, filling in `manifest-sha256` with
/// the SHA-256 of every byte preceding the key.
pub fn lfmeta_manifest(partitions: Vec<LfMetaPartition>) -> anyhow::Result<Vec<u8>> {
    let placeholder = "0".repeat(64);
    let manifest = LfMetaManifest {
        manifest_type: LFMETA_MARKER.to_string(),
        version: 1,
        partitions,
        manifest_sha256: placeholder.clone(),
    };
    let text = serde_json::to_string(&manifest)?;
    let key = format!("\"{LFMETA_CHECKSUM_KEY}\"");
    let key_pos = text
        .find(&key)
        .context("serialized manifest lacks checksum key")?;
    let digest = sha256_hex(&text.as_bytes()[..key_pos]);

    let placeholder_pos = key_pos
        + text[key_pos..]
            .find(&placeholder)
            .context("serialized manifest lacks checksum value")?;
    let mut out = text.into_bytes();
    out[placeholder_pos..placeholder_pos + 64].copy_from_slice(digest.as_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fbmeta_partition_lines() {
        let info = FbMetaInfo {
            version: 1,
            part_infos: vec![],
        };
        let out = fbmeta_partition(&info).unwrap();
        assert_eq!(out.len(), FBMETA_META_SIZE as usize);
        let mut lines = out.split(|&b| b == b'\n');
        let line1 = lines.next().unwrap();
        let line2 = lines.next().unwrap();
        let checksum: FbMetaChecksum = serde_json::from_slice(line2).unwrap();
        assert_eq!(checksum.meta_md5, md5_hex(line1));
    }

    #[test]
    fn test_lfmeta_manifest_checksum() {
        let out = lfmeta_manifest(vec![LfMetaPartition {
            name: "u-boot".into(),
            offset: 0,
            size: 1024,
            part_type: LFMETA_UBOOT.into(),
            sha256: "ab".into(),
        }])
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(LFMETA_MARKER));
        let key_pos = text.find("\"manifest-sha256\"").unwrap();
        let manifest: LfMetaManifest = serde_json::from_str(&text).unwrap();
        assert_eq!(manifest.manifest_sha256, sha256_hex(&text.as_bytes()[..key_pos]));
    }
}
