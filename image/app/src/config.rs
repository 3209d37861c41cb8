/*++

Licensed under the Apache-2.0 license.

File Name:

   config.rs

Abstract:

    File contains utilities for loading image format tables and the vboot
    enforcement of the target system.

--*/

use anyhow::{bail, Context};
use flashy_image_types::{ImageFormat, VbootEnforcement};
use serde_derive::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Image format table file
#[derive(Default, Serialize, Deserialize)]
pub(crate) struct FormatsConfig {
    #[serde(rename = "format")]
    pub formats: Vec<ImageFormat>,
}

/// Load an image format table from a TOML file, or JSON if the extension says so
pub(crate) fn load_formats(path: &Path) -> anyhow::Result<Vec<ImageFormat>> {
    let config_str = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read the formats file {}", path.display()))?;

    let config: FormatsConfig = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&config_str)
            .with_context(|| format!("Failed to parse formats file {}", path.display()))?,
        _ => toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse formats file {}", path.display()))?,
    };

    if config.formats.is_empty() {
        bail!("Formats file {} declares no formats", path.display());
    }
    Ok(config.formats)
}

/// Keep only the format called `name`
pub(crate) fn select_format(
    formats: Vec<ImageFormat>,
    name: &str,
) -> anyhow::Result<Vec<ImageFormat>> {
    let selected: Vec<_> = formats.into_iter().filter(|f| f.name == name).collect();
    if selected.is_empty() {
        bail!("Unknown image format '{name}'");
    }
    Ok(selected)
}

/// Where the vboot enforcement of the target system comes from
#[derive(Default)]
pub(crate) struct VbootSource {
    pub enforcement: Option<VbootEnforcement>,
    pub proc_mtd: Option<PathBuf>,
    pub vboot_util: Option<PathBuf>,
}

impl VbootSource {
    /// Resolve the enforcement, preferring an explicit value over system files
    pub(crate) fn resolve(&self) -> anyhow::Result<VbootEnforcement> {
        if let Some(enforcement) = self.enforcement {
            return Ok(enforcement);
        }
        let Some(proc_mtd) = &self.proc_mtd else {
            return Ok(VbootEnforcement::None);
        };
        let mtd = std::fs::read_to_string(proc_mtd)
            .with_context(|| format!("Failed to read {}", proc_mtd.display()))?;
        let vboot_util = match &self.vboot_util {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
            None => String::new(),
        };
        Ok(VbootEnforcement::detect(&mtd, &vboot_util))
    }
}
