// Licensed under the Apache-2.0 license.

use serde_derive::{Deserialize, Serialize};

/// Whether boot-critical flash regions are read-only in hardware.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VbootEnforcement {
    #[default]
    None,
    SoftwareEnforce,
    HardwareEnforce,
}

impl VbootEnforcement {
    /// Derive the enforcement mode from the contents of `/proc/mtd` and the
    /// output of `vboot-util`.
    ///
    /// A system without a `romx` mtd partition is not a vboot system.
    pub fn detect(proc_mtd: &str, vboot_util_output: &str) -> Self {
        if !proc_mtd.contains("romx") {
            return VbootEnforcement::None;
        }
        if flag_is_set(vboot_util_output, "hardware_enforce") {
            VbootEnforcement::HardwareEnforce
        } else if flag_is_set(vboot_util_output, "software_enforce") {
            VbootEnforcement::SoftwareEnforce
        } else {
            VbootEnforcement::None
        }
    }
}

// Matches lines such as "Flags hardware_enforce:  0x01".
fn flag_is_set(vboot_util_output: &str, flag: &str) -> bool {
    vboot_util_output.lines().any(|line| {
        let Some(rest) = line.trim().strip_prefix("Flags ") else {
            return false;
        };
        let Some((name, value)) = rest.split_once(':') else {
            return false;
        };
        name.trim() == flag
            && u32::from_str_radix(value.trim().trim_start_matches("0x"), 16)
                .map(|v| v != 0)
                .unwrap_or(false)
    })
}
