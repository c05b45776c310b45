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

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anvil_flash::bootentry::BootEntryManager;
use anvil_flash::efivars::EfiVariableStore;
use anvil_flash::fru::{FruConfig, FruIdentity, FruProvisioner};
use anvil_flash::mac::{MacFlashConfig, MacFlashEngine};
use anvil_testrun::{TestOrchestrator, TestResult};
use anvil_utils::{AutoDecisions, Cmd, ConsoleDecisions, DecisionProvider};
use mac_address::MacAddress;
use tracing::{error, info, warn};

use crate::cfg::{Config, FlashOperation, Options};
use crate::report::{self, FlashRecord, FlashRecordStatus, SessionRecord};
use crate::sysinfo::{self, SystemInfo};
use crate::{fields, AnvilResult};

const RESCUE_LABEL: &str = "anvil-rescue";
const RESCUE_LOADER: &str = "\\EFI\\BOOT\\BOOTX64.EFI";
const RESCUE_DELAY_SECS: u32 = 5;
const POWER_TIMEOUT: Duration = Duration::from_secs(30);

/// The serial field every flashing operation keys on.
const SERIAL_FIELD: &str = "serial";
/// The MAC field consumed by the MAC and EFI operations.
const MAC_FIELD: &str = "mac";

/// Runs one full session and returns the process exit code.
pub async fn run(options: Options) -> AnvilResult<u8> {
    let config = Config::load(&options.config)?;
    let info = SystemInfo::collect().await;

    if let Err(reason) = identify(&config, &info).await {
        error!("system identification failed: {reason}");
        return Ok(1);
    }
    info!(
        product = %info.product,
        serial = %info.board_serial,
        ip = ?info.ip,
        "system identified"
    );

    let decisions: Arc<dyn DecisionProvider> = if options.non_interactive {
        Arc::new(AutoDecisions)
    } else {
        Arc::new(ConsoleDecisions)
    };

    let mut pipeline = Vec::new();
    let mut test_results: Vec<TestResult> = Vec::new();
    if options.flash_only {
        info!("flash-only mode, skipping test suites");
    } else {
        pipeline.push("tests".to_string());
        let orchestrator =
            TestOrchestrator::new(Duration::from_secs(config.tests.timeout), decisions.clone());
        let summary = orchestrator
            .run(&config.tests.parallel_groups, &config.tests.sequential_groups)
            .await;
        test_results = summary.results;
    }

    let mut flash_records = Vec::new();
    let mut target_serial = None;
    if config.flash.enabled && !options.tests_only {
        pipeline.push("flash".to_string());
        let phase = run_flash_phase(&config, &options, decisions).await;
        flash_records = phase.records;
        target_serial = phase.serial;
    } else if options.tests_only && config.flash.enabled {
        info!("tests-only mode, skipping flashing");
    }

    let state = report::compute_state(&test_results, &flash_records);
    let record = SessionRecord::new(state, pipeline, info.clone(), test_results, flash_records);
    let filename = record.filename(
        &config.system.product,
        target_serial.as_deref().unwrap_or(&info.board_serial),
    );

    if config.log.save_local {
        match record.save_local(&config.log.log_dir, &filename).await {
            Ok(path) => {
                if config.log.send_logs {
                    report::upload(&path, &config.log, &config.system.product).await;
                }
            }
            Err(e) => warn!("could not save session record: {e}"),
        }
    }

    info!(state = %state, "session complete");
    if !options.non_interactive {
        power_transition(&info, target_serial.as_deref()).await;
    }
    Ok(if state == report::SessionState::Failed { 1 } else { 0 })
}

/// Privilege and identity gate. A mismatch here means the operator is
/// about to imprint the wrong machine, so nothing else may run.
async fn identify(config: &Config, info: &SystemInfo) -> Result<(), String> {
    if config.system.require_root && !sysinfo::is_root().await {
        return Err("this tool needs root privileges".to_string());
    }
    if info.product.is_empty() {
        return Err("DMI product name is empty".to_string());
    }
    if !info.product.eq_ignore_ascii_case(&config.system.product) {
        return Err(format!(
            "product name '{}' does not match configured '{}'",
            info.product, config.system.product
        ));
    }
    Ok(())
}

struct FlashPhase {
    records: Vec<FlashRecord>,
    /// Serial actually targeted, once field collection succeeded.
    serial: Option<String>,
}

async fn run_flash_phase(
    config: &Config,
    options: &Options,
    decisions: Arc<dyn DecisionProvider>,
) -> FlashPhase {
    let mut phase = FlashPhase {
        records: Vec::new(),
        serial: None,
    };

    // The EFI subsystem check runs up front: without it the machine
    // cannot be imprinted, and partially flashing is worse than not
    // flashing at all.
    let store = if config.flash.operations.contains(&FlashOperation::Efi) {
        match EfiVariableStore::new(&config.system.guid_prefix) {
            Ok(store) => Some(store),
            Err(e) => {
                error!("flashing phase aborted: {e}");
                phase.records.push(FlashRecord {
                    name: "preflight".to_string(),
                    status: FlashRecordStatus::Failed,
                    error: Some(e.to_string()),
                });
                return phase;
            }
        }
    } else {
        None
    };

    let values = match fields::collect(&config.flash.fields, !options.non_interactive) {
        Ok(values) => values,
        Err(e) => {
            error!("flashing phase aborted: {e}");
            phase.records.push(FlashRecord {
                name: "fields".to_string(),
                status: FlashRecordStatus::Failed,
                error: Some(e.to_string()),
            });
            return phase;
        }
    };
    let serial = values.get(SERIAL_FIELD).cloned();
    // A collected-but-unparseable MAC is carried as an error so every
    // operation that needs it fails loudly instead of silently passing.
    let mac: Result<Option<MacAddress>, String> = match values.get(MAC_FIELD) {
        None => Ok(None),
        Some(raw) => MacAddress::from_str(raw)
            .map(Some)
            .map_err(|e| format!("collected MAC '{raw}' does not parse: {e}")),
    };
    phase.serial = serial.clone();

    for op in &config.flash.operations {
        let record = match op {
            FlashOperation::Mac => run_mac(config, &mac, decisions.clone()).await,
            FlashOperation::Efi => {
                // Guarded above; operations listing `efi` always have a store.
                match &store {
                    Some(store) => {
                        run_efi(
                            &config.system.efi_sn_name,
                            &config.system.efi_mac_name,
                            store,
                            &serial,
                            &mac,
                        )
                        .await
                    }
                    None => FlashRecord {
                        name: "efi".to_string(),
                        status: FlashRecordStatus::Failed,
                        error: Some("EFI variable store unavailable".to_string()),
                    },
                }
            }
            FlashOperation::Fru => run_fru(config, &serial, decisions.clone()).await,
        };
        if record.failed() {
            error!(operation = %record.name, "flash operation failed");
        }
        phase.records.push(record);
    }
    phase
}

async fn run_mac(
    config: &Config,
    mac: &Result<Option<MacAddress>, String>,
    decisions: Arc<dyn DecisionProvider>,
) -> FlashRecord {
    let target = match mac {
        Ok(Some(target)) => target,
        Ok(None) => {
            return FlashRecord {
                name: "mac".to_string(),
                status: FlashRecordStatus::Failed,
                error: Some("no MAC address collected".to_string()),
            };
        }
        Err(e) => {
            return FlashRecord {
                name: "mac".to_string(),
                status: FlashRecordStatus::Failed,
                error: Some(e.clone()),
            };
        }
    };
    let engine = MacFlashEngine::new(
        MacFlashConfig {
            method: config.flash.method,
            ven_device: config.flash.ven_device.clone(),
            normal_driver: config.flash.normal_driver.clone(),
            flash_driver: config.flash.flash_driver.clone(),
            driver_dir: config.system.driver_dir.clone(),
            diag_tool: config.flash.diag_tool.clone(),
            flash_tool: config.flash.flash_tool.clone(),
            benign_exit_codes: config.flash.benign_exit_codes.clone(),
        },
        decisions,
    );
    let summary = engine.run(*target).await;
    FlashRecord {
        name: "mac".to_string(),
        status: if summary.success {
            FlashRecordStatus::Pass
        } else if summary.skipped {
            FlashRecordStatus::Skipped
        } else {
            FlashRecordStatus::Failed
        },
        error: summary.error,
    }
}

/// Writes the serial and MAC identity variables. Values already in
/// place are skipped by the store itself.
async fn run_efi(
    sn_name: &str,
    mac_name: &str,
    store: &EfiVariableStore,
    serial: &Option<String>,
    mac: &Result<Option<MacAddress>, String>,
) -> FlashRecord {
    let mut errors = Vec::new();

    match serial {
        Some(serial) => {
            if let Err(e) = store.set(sn_name, serial.as_bytes()).await {
                errors.push(format!("{sn_name}: {e}"));
            }
        }
        None => errors.push(format!("{sn_name}: no serial collected")),
    }
    match mac {
        Ok(Some(mac)) => {
            let value = mac.to_string();
            if let Err(e) = store.set(mac_name, value.as_bytes()).await {
                errors.push(format!("{mac_name}: {e}"));
            }
        }
        Ok(None) => {}
        Err(e) => errors.push(format!("{mac_name}: {e}")),
    }

    FlashRecord {
        name: "efi".to_string(),
        status: if errors.is_empty() {
            FlashRecordStatus::Pass
        } else {
            FlashRecordStatus::Failed
        },
        error: (!errors.is_empty()).then(|| errors.join("; ")),
    }
}

async fn run_fru(
    config: &Config,
    serial: &Option<String>,
    decisions: Arc<dyn DecisionProvider>,
) -> FlashRecord {
    let Some(serial) = serial else {
        return FlashRecord {
            name: "fru".to_string(),
            status: FlashRecordStatus::Failed,
            error: Some("no serial collected".to_string()),
        };
    };
    let provisioner = FruProvisioner::new(
        FruConfig {
            tool: config.flash.fru_tool.clone(),
            device_id: config.flash.fru_device_id.clone(),
            work_dir: std::env::temp_dir(),
        },
        decisions,
    );
    let summary = provisioner
        .provision(&FruIdentity {
            manufacturer: config.system.manufacturer.clone(),
            product: config.system.product.clone(),
            serial: serial.clone(),
        })
        .await;
    FlashRecord {
        name: "fru".to_string(),
        status: if summary.success {
            FlashRecordStatus::Pass
        } else if summary.skipped {
            FlashRecordStatus::Skipped
        } else {
            FlashRecordStatus::Failed
        },
        error: summary.error,
    }
}

/// A changed serial means the machine carries a new identity and must
/// cold-start through the rescue loader; anything else just powers off.
async fn power_transition(info: &SystemInfo, target_serial: Option<&str>) {
    let serial_changed = matches!(
        target_serial,
        Some(serial) if !serial.is_empty() && serial != info.board_serial
    );

    if serial_changed {
        if !confirm("serial number changed, reboot now?") {
            return;
        }
        let manager = BootEntryManager::new(RESCUE_LABEL, RESCUE_LOADER, RESCUE_DELAY_SECS);
        match manager.prepare_one_shot().await {
            Ok(number) => info!(entry = %number, "one-shot boot entry armed"),
            Err(e) => {
                warn!("could not arm one-shot boot entry, rebooting anyway: {e}");
            }
        }
        let report = Cmd::new("reboot").timeout(POWER_TIMEOUT).run().await;
        if !report.passed() {
            error!(
                "reboot failed: {}",
                report.error_summary.unwrap_or_default()
            );
        }
    } else if confirm("session finished, shut down now?") {
        let report = Cmd::new("shutdown")
            .args(["-h", "now"])
            .timeout(POWER_TIMEOUT)
            .run()
            .await;
        if !report.passed() {
            error!(
                "shutdown failed: {}",
                report.error_summary.unwrap_or_default()
            );
        }
    }
}

fn confirm(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUID: &str = "1b4e28ba-2fa1-11d2-883f-b9a761bde3fb";

    fn collected_mac(raw: &str) -> Result<Option<MacAddress>, String> {
        MacAddress::from_str(raw)
            .map(Some)
            .map_err(|e| format!("collected MAC '{raw}' does not parse: {e}"))
    }

    #[tokio::test]
    async fn test_efi_record_fails_when_the_collected_mac_does_not_parse() {
        let dir = tempfile::tempdir().unwrap();
        let store = EfiVariableStore::with_root(GUID, dir.path()).unwrap();

        let mac = collected_mac("not-a-mac");
        assert!(mac.is_err());
        let record = run_efi(
            "AssetSN",
            "AssetMAC",
            &store,
            &Some("SN012345".to_string()),
            &mac,
        )
        .await;

        assert_eq!(record.status, FlashRecordStatus::Failed);
        assert!(record.error.unwrap().contains("does not parse"));
        // The serial variable still lands; only the MAC is refused.
        assert_eq!(store.get("AssetSN").await.unwrap(), b"SN012345");
        assert!(store.get("AssetMAC").await.is_err());
    }

    #[tokio::test]
    async fn test_efi_record_passes_with_valid_serial_and_mac() {
        let dir = tempfile::tempdir().unwrap();
        let store = EfiVariableStore::with_root(GUID, dir.path()).unwrap();

        let record = run_efi(
            "AssetSN",
            "AssetMAC",
            &store,
            &Some("SN012345".to_string()),
            &collected_mac("AA:BB:CC:DD:EE:FF"),
        )
        .await;

        assert_eq!(record.status, FlashRecordStatus::Pass);
        assert_eq!(store.get("AssetMAC").await.unwrap(), b"AA:BB:CC:DD:EE:FF");
    }
}
