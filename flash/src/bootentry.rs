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

use std::collections::HashMap;
use std::time::Duration;

use anvil_utils::Cmd;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::{FlashError, FlashResult};

/// Partition type GUID of an EFI system partition.
pub const ESP_PARTTYPE: &str = "c12a7328-f81f-11d2-ba4b-00a0c93ec93b";

const TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// One parsed line of the firmware boot-entry table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootEntry {
    /// Four-digit hex entry number, e.g. "0003".
    pub number: String,
    pub active: bool,
    /// Label plus device/loader detail, as printed by the tool.
    pub detail: String,
}

#[derive(Debug, Clone, Default)]
pub struct BootTable {
    pub entries: Vec<BootEntry>,
    pub boot_next: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EspLocation {
    /// Parent disk device path, e.g. "/dev/sda".
    pub disk: String,
    pub partition: u32,
}

/// Creates a verified one-shot firmware boot entry pointing at the
/// rescue loader. Every mutation is checked by re-querying the table;
/// an unverifiable step is an error, never silently ignored.
pub struct BootEntryManager {
    rescue_label: String,
    /// Loader path on the ESP, backslash separated.
    loader_path: String,
    delay_secs: u32,
}

impl BootEntryManager {
    pub fn new(rescue_label: &str, loader_path: &str, delay_secs: u32) -> Self {
        Self {
            rescue_label: rescue_label.to_string(),
            loader_path: loader_path.to_string(),
            delay_secs,
        }
    }

    /// Full sequence: find an ESP, drop stale entries for the same
    /// loader, create the entry, set it as next boot. Returns the new
    /// entry number.
    pub async fn prepare_one_shot(&self) -> FlashResult<String> {
        let boot_disk = boot_disk().await;
        if let Some(disk) = &boot_disk {
            debug!(%disk, "identified boot disk");
        }
        let esp = find_esp(boot_disk.as_deref()).await?;
        info!(disk = %esp.disk, partition = esp.partition, "using EFI system partition");

        self.remove_stale_entries().await?;
        let number = self.create_entry(&esp).await?;
        self.set_next(&number).await?;
        Ok(number)
    }

    /// Deletes every existing entry pointing at the rescue loader, so
    /// the new one-shot entry is unambiguous.
    async fn remove_stale_entries(&self) -> FlashResult<()> {
        let table = query_table().await?;
        let needle = self.loader_path.to_lowercase();
        let stale: Vec<String> = table
            .entries
            .iter()
            .filter(|e| e.detail.to_lowercase().contains(&needle))
            .map(|e| e.number.clone())
            .collect();

        for number in stale {
            info!(entry = %number, "removing stale rescue boot entry");
            let report = Cmd::new("efibootmgr")
                .args(["-b", &number, "-B"])
                .timeout(TOOL_TIMEOUT)
                .run()
                .await;
            if !report.passed() {
                return Err(FlashError::Execution(format!(
                    "could not delete boot entry {number}: {}",
                    report.error_summary.unwrap_or_default()
                )));
            }
            let table = query_table().await?;
            if table.entries.iter().any(|e| e.number == number) {
                return Err(FlashError::Verification(format!(
                    "boot entry {number} still present after deletion"
                )));
            }
        }
        Ok(())
    }

    async fn create_entry(&self, esp: &EspLocation) -> FlashResult<String> {
        let before = query_table().await?;
        let report = Cmd::new("efibootmgr")
            .args([
                "-c",
                "-d",
                &esp.disk,
                "-p",
                &esp.partition.to_string(),
                "-L",
                &self.rescue_label,
                "-l",
                &self.loader_path,
                "-u",
                &format!("delay {}", self.delay_secs),
            ])
            .timeout(TOOL_TIMEOUT)
            .run()
            .await;
        if !report.passed() {
            return Err(FlashError::Execution(format!(
                "boot entry creation failed: {}",
                report.error_summary.unwrap_or_default()
            )));
        }

        let after = query_table().await?;
        let created = after
            .entries
            .iter()
            .filter(|e| e.detail.contains(&self.rescue_label))
            .find(|e| !before.entries.contains(*e));
        match created {
            Some(entry) => {
                info!(entry = %entry.number, label = %self.rescue_label, "boot entry created");
                Ok(entry.number.clone())
            }
            None => Err(FlashError::Verification(
                "created boot entry not found when re-querying the table".to_string(),
            )),
        }
    }

    async fn set_next(&self, number: &str) -> FlashResult<()> {
        let report = Cmd::new("efibootmgr")
            .args(["-n", number])
            .timeout(TOOL_TIMEOUT)
            .run()
            .await;
        if !report.passed() {
            return Err(FlashError::Execution(format!(
                "could not set BootNext to {number}: {}",
                report.error_summary.unwrap_or_default()
            )));
        }
        let table = query_table().await?;
        if table.boot_next.as_deref() != Some(number) {
            return Err(FlashError::Verification(format!(
                "BootNext is {:?} after setting it to {number}",
                table.boot_next
            )));
        }
        Ok(())
    }
}

async fn query_table() -> FlashResult<BootTable> {
    let report = Cmd::new("efibootmgr")
        .arg("-v")
        .timeout(TOOL_TIMEOUT)
        .run()
        .await;
    if !report.passed() {
        return Err(FlashError::Execution(format!(
            "efibootmgr query failed: {}",
            report.error_summary.unwrap_or_default()
        )));
    }
    Ok(parse_boot_table(&report.output))
}

pub fn parse_boot_table(output: &str) -> BootTable {
    let entry_re = Regex::new(r"^Boot([0-9A-Fa-f]{4})(\*?)\s+(.*)$").unwrap();
    let next_re = Regex::new(r"^BootNext:\s*([0-9A-Fa-f]{4})").unwrap();

    let mut table = BootTable::default();
    for line in output.lines() {
        if let Some(caps) = entry_re.captures(line) {
            table.entries.push(BootEntry {
                number: caps[1].to_string(),
                active: &caps[2] == "*",
                detail: caps[3].trim().to_string(),
            });
        } else if let Some(caps) = next_re.captures(line) {
            table.boot_next = Some(caps[1].to_string());
        }
    }
    table
}

/// Parent disk of the partition mounted at `/`, e.g. "sda". None on
/// live/installer media where `/` is not disk-backed.
async fn boot_disk() -> Option<String> {
    let report = Cmd::new("findmnt")
        .args(["-n", "-o", "SOURCE", "/"])
        .timeout(TOOL_TIMEOUT)
        .run()
        .await;
    if !report.passed() {
        return None;
    }
    let source = report.output.trim().to_string();
    if !source.starts_with("/dev/") {
        return None;
    }
    let report = Cmd::new("lsblk")
        .args(["-no", "PKNAME", &source])
        .timeout(TOOL_TIMEOUT)
        .run()
        .await;
    if !report.passed() {
        return None;
    }
    let parent = report.output.trim().to_string();
    (!parent.is_empty()).then_some(parent)
}

/// Locates an EFI system partition, preferring one on the boot disk.
/// Falling back to any other disk is correct here: live/installer media
/// boot from different physical media than the target's own partition.
async fn find_esp(boot_disk: Option<&str>) -> FlashResult<EspLocation> {
    let report = Cmd::new("lsblk")
        .args(["-P", "-o", "NAME,PKNAME,PARTTYPE"])
        .timeout(TOOL_TIMEOUT)
        .run()
        .await;
    if !report.passed() {
        return Err(FlashError::Execution(format!(
            "lsblk failed: {}",
            report.error_summary.unwrap_or_default()
        )));
    }

    let mut candidates = Vec::new();
    for line in report.output.lines() {
        let fields = parse_lsblk_line(line);
        let (Some(name), Some(pkname), Some(parttype)) = (
            fields.get("NAME"),
            fields.get("PKNAME"),
            fields.get("PARTTYPE"),
        ) else {
            continue;
        };
        if !parttype.eq_ignore_ascii_case(ESP_PARTTYPE) || pkname.is_empty() {
            continue;
        }
        let Some(partition) = parse_partition_number(name, pkname) else {
            warn!(%name, "could not derive partition number, skipping candidate");
            continue;
        };
        candidates.push((pkname.clone(), partition));
    }

    if let Some(disk) = boot_disk {
        if let Some((pkname, partition)) = candidates.iter().find(|(pk, _)| pk == disk) {
            return Ok(EspLocation {
                disk: format!("/dev/{pkname}"),
                partition: *partition,
            });
        }
    }
    match candidates.into_iter().next() {
        Some((pkname, partition)) => Ok(EspLocation {
            disk: format!("/dev/{pkname}"),
            partition,
        }),
        None => Err(FlashError::Precondition(
            "no EFI system partition found on any disk".to_string(),
        )),
    }
}

/// Parses one `lsblk -P` line of KEY="VALUE" pairs.
pub fn parse_lsblk_line(line: &str) -> HashMap<String, String> {
    let re = Regex::new(r#"(\w+)="([^"]*)""#).unwrap();
    re.captures_iter(line)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

/// Partition number from kernel names: "sda3"/"sda" -> 3,
/// "nvme0n1p2"/"nvme0n1" -> 2.
pub fn parse_partition_number(name: &str, pkname: &str) -> Option<u32> {
    let suffix = name.strip_prefix(pkname)?;
    suffix.trim_start_matches('p').parse().ok()
}
