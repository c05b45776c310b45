/*
 * SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

use std::path::{Path, PathBuf};

use anvil_flash::mac::FlashMethod;
use anvil_testrun::TestSpec;
use serde::Deserialize;

use crate::{AnvilError, AnvilResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    pub system: SystemConfig,
    #[serde(default)]
    pub tests: TestsConfig,
    #[serde(default)]
    pub flash: FlashConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SystemConfig {
    /// Expected DMI product name; a mismatch aborts the session.
    pub product: String,
    pub manufacturer: String,
    #[serde(default = "default_true")]
    pub require_root: bool,
    /// GUID namespace for the identity EFI variables.
    pub guid_prefix: String,
    #[serde(default = "default_efi_sn_name")]
    pub efi_sn_name: String,
    #[serde(default = "default_efi_mac_name")]
    pub efi_mac_name: String,
    /// Source directory of the vendor flashing driver.
    #[serde(default = "default_driver_dir")]
    pub driver_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TestsConfig {
    /// Per-test deadline in seconds, unless the test declares its own.
    #[serde(default = "default_test_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub parallel_groups: Vec<Vec<TestSpec>>,
    #[serde(default)]
    pub sequential_groups: Vec<Vec<TestSpec>>,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            timeout: default_test_timeout(),
            parallel_groups: Vec::new(),
            sequential_groups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashOperation {
    Mac,
    Efi,
    Fru,
}

/// One interactively collected identity value, validated against its
/// pattern until it matches.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldSpec {
    pub name: String,
    pub prompt: String,
    pub regex: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FlashConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_operations")]
    pub operations: Vec<FlashOperation>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default = "default_method")]
    pub method: FlashMethod,
    /// `vendor:device` PCI id pairs selecting the NICs to program.
    #[serde(default)]
    pub ven_device: Vec<String>,
    #[serde(default = "default_normal_driver")]
    pub normal_driver: String,
    #[serde(default = "default_flash_driver")]
    pub flash_driver: String,
    #[serde(default = "default_diag_tool")]
    pub diag_tool: String,
    #[serde(default = "default_flash_tool")]
    pub flash_tool: String,
    /// Flash-tool exit codes that signal "driver absent" rather than
    /// failure.
    #[serde(default = "default_benign_exit_codes")]
    pub benign_exit_codes: Vec<i32>,
    #[serde(default = "default_fru_tool")]
    pub fru_tool: String,
    #[serde(default = "default_fru_device_id")]
    pub fru_device_id: String,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            operations: default_operations(),
            fields: Vec::new(),
            method: default_method(),
            ven_device: Vec::new(),
            normal_driver: default_normal_driver(),
            flash_driver: default_flash_driver(),
            diag_tool: default_diag_tool(),
            flash_tool: default_flash_tool(),
            benign_exit_codes: default_benign_exit_codes(),
            fru_tool: default_fru_tool(),
            fru_device_id: default_fru_device_id(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LogConfig {
    #[serde(default = "default_true")]
    pub save_local: bool,
    #[serde(default)]
    pub send_logs: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Remote host for record upload, `user@host` form.
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default = "default_server_dir")]
    pub server_dir: String,
    /// Manufacturing-station name, used as a remote subdirectory.
    #[serde(default = "default_op_name")]
    pub op_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            save_local: true,
            send_logs: false,
            log_dir: default_log_dir(),
            server: None,
            server_dir: default_server_dir(),
            op_name: default_op_name(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> AnvilResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AnvilError::Config(format!("could not read {}: {e}", path.display()))
        })?;
        let config: Config = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AnvilResult<()> {
        if self.flash.enabled && self.flash.operations.is_empty() {
            return Err(AnvilError::Config(
                "flashing is enabled but no operations are configured".to_string(),
            ));
        }
        if self.flash.enabled
            && self.flash.method == FlashMethod::VendorMultiNic
            && self.flash.ven_device.is_empty()
        {
            return Err(AnvilError::Config(
                "vendor-multi-nic flashing needs at least one venDevice entry".to_string(),
            ));
        }
        for field in &self.flash.fields {
            regex::Regex::new(&field.regex).map_err(|e| {
                AnvilError::Config(format!("field '{}' has a bad pattern: {e}", field.name))
            })?;
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_efi_sn_name() -> String {
    "AssetSN".to_string()
}
fn default_efi_mac_name() -> String {
    "AssetMAC".to_string()
}
fn default_driver_dir() -> PathBuf {
    PathBuf::from("/opt/anvil/driver")
}
fn default_test_timeout() -> u64 {
    300
}
fn default_operations() -> Vec<FlashOperation> {
    vec![FlashOperation::Mac, FlashOperation::Efi, FlashOperation::Fru]
}
fn default_method() -> FlashMethod {
    FlashMethod::DriverSwap
}
fn default_normal_driver() -> String {
    "r8169".to_string()
}
fn default_flash_driver() -> String {
    "pgdrv".to_string()
}
fn default_diag_tool() -> String {
    "lspci".to_string()
}
fn default_flash_tool() -> String {
    "rtnicpg".to_string()
}
fn default_benign_exit_codes() -> Vec<i32> {
    vec![2]
}
fn default_fru_tool() -> String {
    "ipmitool".to_string()
}
fn default_fru_device_id() -> String {
    "0".to_string()
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/anvil")
}
fn default_server_dir() -> String {
    "/srv/anvil-logs".to_string()
}
fn default_op_name() -> String {
    "assembly".to_string()
}
