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
use std::sync::Arc;
use std::time::Duration;

use anvil_utils::{Cmd, DecisionContext, DecisionProvider, FlashDecision};
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::classify::{MarkerClassifier, OutcomeClassifier, ToolOutcome};
use crate::driver::DriverLifecycle;
use crate::netinv;
use crate::{FlashError, FlashResult};

/// Automated attempts before the operator is asked.
pub const MAC_FLASH_ATTEMPTS: u32 = 3;

const TOOL_TIMEOUT: Duration = Duration::from_secs(120);
const DIAG_TIMEOUT: Duration = Duration::from_secs(30);
const IP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlashMethod {
    /// Discover every matching NIC and program each one through the
    /// vendor flashing tool, incrementing the MAC per NIC.
    VendorMultiNic,
    /// Swap the normal driver for the vendor flashing driver and write
    /// the MAC through it.
    DriverSwap,
}

#[derive(Debug, Clone)]
pub struct MacFlashConfig {
    pub method: FlashMethod,
    /// `vendor:device` PCI id pairs selecting the NICs to program.
    pub ven_device: Vec<String>,
    pub normal_driver: String,
    pub flash_driver: String,
    pub driver_dir: PathBuf,
    pub diag_tool: String,
    pub flash_tool: String,
    pub benign_exit_codes: Vec<i32>,
}

/// Owned by exactly one engine invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MacFlashSummary {
    pub method: FlashMethod,
    pub target_mac: String,
    pub interface: Option<String>,
    pub original_ip: Option<String>,
    pub original_driver: Option<String>,
    pub nic_indices: Vec<u32>,
    pub success: bool,
    pub skipped: bool,
    pub error: Option<String>,
}

impl MacFlashSummary {
    pub fn failed(&self) -> bool {
        !self.success && !self.skipped
    }
}

pub struct MacFlashEngine {
    cfg: MacFlashConfig,
    decisions: Arc<dyn DecisionProvider>,
    netinv_root: PathBuf,
}

impl MacFlashEngine {
    pub fn new(cfg: MacFlashConfig, decisions: Arc<dyn DecisionProvider>) -> Self {
        Self::with_netinv_root(cfg, decisions, Path::new(netinv::SYS_CLASS_NET))
    }

    /// Same engine against an alternate sysfs net directory.
    pub fn with_netinv_root(
        cfg: MacFlashConfig,
        decisions: Arc<dyn DecisionProvider>,
        netinv_root: &Path,
    ) -> Self {
        Self {
            cfg,
            decisions,
            netinv_root: netinv_root.to_path_buf(),
        }
    }

    pub async fn run(&self, target: MacAddress) -> MacFlashSummary {
        let mut summary = MacFlashSummary {
            method: self.cfg.method,
            target_mac: target.to_string(),
            interface: None,
            original_ip: None,
            original_driver: None,
            nic_indices: Vec::new(),
            success: false,
            skipped: false,
            error: None,
        };

        // Preflight: a MAC that is already present anywhere makes the
        // whole operation a no-op, with zero driver reloads and zero
        // vendor-tool calls.
        match netinv::snapshot_from(&self.netinv_root).await {
            Ok(interfaces) => {
                if let Some(iface) = netinv::find_by_mac(&interfaces, &target) {
                    info!(interface = %iface.name, mac = %target, "target MAC already present");
                    summary.interface = Some(iface.name.clone());
                    summary.success = true;
                    return summary;
                }
                let original = netinv::find_by_driver(&interfaces, &self.cfg.normal_driver)
                    .or_else(|| interfaces.first());
                if let Some(orig) = original {
                    summary.interface = Some(orig.name.clone());
                    summary.original_ip = orig.ip.clone();
                    summary.original_driver = orig.driver.clone();
                }
            }
            Err(e) => warn!("preflight interface snapshot failed: {e}"),
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.flash_once(&target, &mut summary).await {
                Ok(()) => {
                    summary.success = true;
                    summary.error = None;
                    return summary;
                }
                Err(e) if e.is_fatal() => {
                    error!("MAC flash hit a fatal precondition: {e}");
                    summary.error = Some(e.to_string());
                    return summary;
                }
                Err(e) => {
                    error!(attempt, "MAC flash attempt failed: {e}");
                    summary.error = Some(e.to_string());
                    if attempt < MAC_FLASH_ATTEMPTS {
                        continue;
                    }
                    let detail = e.to_string();
                    let ctx = DecisionContext {
                        name: "mac-flash",
                        attempt,
                        detail: &detail,
                    };
                    match self.decisions.decide_flash(&ctx) {
                        FlashDecision::Retry => {
                            attempt = 0;
                        }
                        FlashDecision::Abort => return summary,
                        FlashDecision::Skip => {
                            summary.skipped = true;
                            return summary;
                        }
                    }
                }
            }
        }
    }

    async fn flash_once(
        &self,
        target: &MacAddress,
        summary: &mut MacFlashSummary,
    ) -> FlashResult<()> {
        let expected = match self.cfg.method {
            FlashMethod::VendorMultiNic => self.flash_multi_nic(target, summary).await?,
            FlashMethod::DriverSwap => self.flash_driver_swap(target).await?,
        };
        self.post_flash(&expected, summary).await
    }

    async fn flash_multi_nic(
        &self,
        target: &MacAddress,
        summary: &mut MacFlashSummary,
    ) -> FlashResult<Vec<MacAddress>> {
        let indices = self.discover_nics().await?;
        if indices.is_empty() {
            return Err(FlashError::Execution(
                "no NICs matched the configured vendor devices".to_string(),
            ));
        }
        summary.nic_indices = indices.clone();

        let classifier = MarkerClassifier::new(self.cfg.benign_exit_codes.clone());
        let mut expected = Vec::with_capacity(indices.len());
        let mut mac = *target;
        for (slot, index) in indices.iter().enumerate() {
            if slot > 0 {
                mac = increment_mac(&mac);
            }
            let report = Cmd::new(&self.cfg.flash_tool)
                .args(["-nic", &index.to_string(), "-mac", &mac_hex(&mac)])
                .timeout(TOOL_TIMEOUT)
                .run()
                .await;
            match classifier.classify(report.exit_code, &report.output) {
                ToolOutcome::Success => info!(nic = index, mac = %mac, "NIC programmed"),
                ToolOutcome::DriverAbsent => {
                    info!(nic = index, "flash tool reported driver absent, continuing")
                }
                ToolOutcome::Failure(reason) => {
                    return Err(FlashError::Execution(format!(
                        "flash tool failed on NIC {index}: {reason}"
                    )));
                }
            }
            expected.push(mac);
        }
        Ok(expected)
    }

    async fn flash_driver_swap(&self, target: &MacAddress) -> FlashResult<Vec<MacAddress>> {
        let mut lifecycle = DriverLifecycle::new(
            &self.cfg.normal_driver,
            &self.cfg.flash_driver,
            &self.cfg.driver_dir,
        );
        let result = match lifecycle.prepare().await {
            Ok(()) => {
                let report = Cmd::new(&self.cfg.flash_tool)
                    .args(["-w", "-mac", &mac_hex(target)])
                    .timeout(TOOL_TIMEOUT)
                    .run()
                    .await;
                if report.passed() {
                    Ok(vec![*target])
                } else {
                    Err(FlashError::Execution(format!(
                        "MAC write through flashing driver failed: {}",
                        report.error_summary.unwrap_or_default()
                    )))
                }
            }
            Err(e) => Err(e),
        };
        // Cleanup runs regardless of outcome so the machine is never
        // left on the flashing driver.
        if let Err(e) = lifecycle.cleanup().await {
            warn!("driver cleanup failed: {e}");
        }
        result
    }

    /// Lists matching NICs through the configured diagnostic tool, one
    /// output line per device, indexed in discovery order.
    async fn discover_nics(&self) -> FlashResult<Vec<u32>> {
        let mut indices = Vec::new();
        let mut next = 0u32;
        for ven_device in &self.cfg.ven_device {
            let report = Cmd::new(&self.cfg.diag_tool)
                .args(["-n", "-d", ven_device])
                .timeout(DIAG_TIMEOUT)
                .run()
                .await;
            if !report.passed() {
                return Err(FlashError::Execution(format!(
                    "{} -d {ven_device}: {}",
                    self.cfg.diag_tool,
                    report.error_summary.unwrap_or_default()
                )));
            }
            for line in report.output.lines().filter(|l| !l.trim().is_empty()) {
                debug!(device = ven_device, line, "matched vendor NIC");
                indices.push(next);
                next += 1;
            }
        }
        Ok(indices)
    }

    async fn post_flash(
        &self,
        expected: &[MacAddress],
        summary: &MacFlashSummary,
    ) -> FlashResult<()> {
        restart_networking().await;

        let interfaces = netinv::snapshot_from(&self.netinv_root).await?;
        for mac in expected {
            if netinv::find_by_mac(&interfaces, mac).is_none() {
                return Err(FlashError::Verification(format!(
                    "MAC {mac} not present after flashing"
                )));
            }
        }

        // Best effort: give the primary interface its old address back.
        if let (Some(cidr), Some(first)) = (&summary.original_ip, expected.first()) {
            if let Some(iface) = netinv::find_by_mac(&interfaces, first) {
                let report = Cmd::new("ip")
                    .args(["addr", "replace", cidr, "dev", &iface.name])
                    .timeout(IP_TIMEOUT)
                    .run()
                    .await;
                if !report.passed() {
                    warn!(interface = %iface.name, "could not restore original IP {cidr}");
                }
                let _ = Cmd::new("ip")
                    .args(["link", "set", &iface.name, "up"])
                    .timeout(IP_TIMEOUT)
                    .run()
                    .await;
            }
        }
        Ok(())
    }
}

/// Service-manager restart sequence, then a manual per-interface cycle
/// when none of the managers is present.
async fn restart_networking() {
    const SERVICE_CMDS: &[&[&str]] = &[
        &["systemctl", "restart", "systemd-networkd"],
        &["systemctl", "restart", "NetworkManager"],
        &["service", "network", "restart"],
    ];
    for argv in SERVICE_CMDS {
        let report = Cmd::new(argv[0])
            .args(&argv[1..])
            .timeout(Duration::from_secs(60))
            .run()
            .await;
        if report.passed() {
            debug!(command = argv.join(" "), "networking restarted");
            return;
        }
    }
    warn!("no service manager restarted networking, cycling interfaces manually");
    if let Ok(interfaces) = netinv::snapshot().await {
        for iface in interfaces {
            let _ = Cmd::new("ip")
                .args(["link", "set", &iface.name, "down"])
                .timeout(IP_TIMEOUT)
                .run()
                .await;
            let _ = Cmd::new("ip")
                .args(["link", "set", &iface.name, "up"])
                .timeout(IP_TIMEOUT)
                .run()
                .await;
        }
    }
}

/// Big-endian increment: the last byte goes up by one, carrying into
/// the preceding bytes on overflow.
pub fn increment_mac(mac: &MacAddress) -> MacAddress {
    let mut bytes = mac.bytes();
    for byte in bytes.iter_mut().rev() {
        let (value, carry) = byte.overflowing_add(1);
        *byte = value;
        if !carry {
            break;
        }
    }
    MacAddress::new(bytes)
}

/// Plain-hex rendition for vendor tools that reject separators.
pub fn mac_hex(mac: &MacAddress) -> String {
    mac.bytes().iter().map(|b| format!("{b:02X}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_increment_carries_into_second_to_last_byte() {
        let mac = MacAddress::from_str("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(increment_mac(&mac).to_string(), "AA:BB:CC:DD:EF:00");
    }

    #[test]
    fn test_increment_carries_through_both_trailing_bytes() {
        let mac = MacAddress::from_str("AA:BB:CC:DD:FF:FF").unwrap();
        assert_eq!(increment_mac(&mac).to_string(), "AA:BB:CC:DE:00:00");
    }

    #[test]
    fn test_increment_without_carry() {
        let mac = MacAddress::from_str("AA:BB:CC:DD:EE:01").unwrap();
        assert_eq!(increment_mac(&mac).to_string(), "AA:BB:CC:DD:EE:02");
    }

    #[test]
    fn test_mac_hex_strips_separators() {
        let mac = MacAddress::from_str("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(mac_hex(&mac), "AABBCCDDEEFF");
    }
}
