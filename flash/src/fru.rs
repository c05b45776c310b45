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

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anvil_utils::{Cmd, DecisionContext, DecisionProvider, FlashDecision};
use regex::Regex;
use serde::Serialize;
use tracing::{error, info};

use crate::{FlashError, FlashResult};

/// Blank-initialization image size. Matches the EEPROM fitted on the
/// supported boards; a differing size reported by the tool is rejected
/// before any blanking write happens.
pub const FRU_BLANK_SIZE: usize = 2048;

/// Automated attempts before the operator is asked.
pub const FRU_ATTEMPTS: u32 = 3;

const TOOL_TIMEOUT: Duration = Duration::from_secs(120);
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Longest string a type/length-encoded FRU field can carry.
const MAX_FIELD_LEN: usize = 0x3F;

#[derive(Debug, Clone)]
pub struct FruIdentity {
    pub manufacturer: String,
    pub product: String,
    pub serial: String,
}

/// Point-in-time judgment of the FRU chip, recomputed before every
/// write decision and never persisted.
#[derive(Debug, Clone)]
pub struct FruStatus {
    pub present: bool,
    pub empty: bool,
    pub bad_checksum: bool,
    pub readable: bool,
    pub message: String,
    /// Chip size as reported by the tool, when it reports one.
    pub size: Option<usize>,
}

impl FruStatus {
    /// Whether the chip needs a blank-initialization pass before the
    /// normal write path.
    pub fn needs_blank(&self) -> bool {
        !self.readable || self.empty || self.bad_checksum
    }
}

/// Identity fields as read back from the chip.
#[derive(Debug, Clone, Default)]
pub struct FruFields {
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FruConfig {
    /// Vendor FRU CLI, ipmitool-compatible argument layout.
    pub tool: String,
    pub device_id: String,
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FruProvisionSummary {
    pub success: bool,
    pub skipped: bool,
    pub blank_initialized: bool,
    pub attempts: u32,
    pub error: Option<String>,
}

impl FruProvisionSummary {
    pub fn failed(&self) -> bool {
        !self.success && !self.skipped
    }
}

enum OnceOutcome {
    /// Current serial already equals the target; nothing was written.
    AlreadyProvisioned,
    Written { blanked: bool },
}

pub struct FruProvisioner {
    cfg: FruConfig,
    decisions: Arc<dyn DecisionProvider>,
}

impl FruProvisioner {
    pub fn new(cfg: FruConfig, decisions: Arc<dyn DecisionProvider>) -> Self {
        Self { cfg, decisions }
    }

    pub async fn provision(&self, id: &FruIdentity) -> FruProvisionSummary {
        let mut summary = FruProvisionSummary {
            success: false,
            skipped: false,
            blank_initialized: false,
            attempts: 0,
            error: None,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            summary.attempts += 1;
            match self.provision_once(id).await {
                Ok(OnceOutcome::AlreadyProvisioned) => {
                    info!(serial = %id.serial, "FRU already carries the target serial, skipping write");
                    summary.success = true;
                    return summary;
                }
                Ok(OnceOutcome::Written { blanked }) => {
                    summary.success = true;
                    summary.blank_initialized |= blanked;
                    summary.error = None;
                    return summary;
                }
                Err(e) if e.is_fatal() => {
                    error!("FRU provisioning hit a fatal precondition: {e}");
                    summary.error = Some(e.to_string());
                    return summary;
                }
                Err(e) => {
                    error!(attempt, "FRU provisioning attempt failed: {e}");
                    summary.error = Some(e.to_string());
                    if attempt < FRU_ATTEMPTS {
                        continue;
                    }
                    let detail = e.to_string();
                    let ctx = DecisionContext {
                        name: "fru-provision",
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

    async fn provision_once(&self, id: &FruIdentity) -> FlashResult<OnceOutcome> {
        // The status is a fresh read every time; a previous attempt may
        // have changed the chip.
        let status = self.read_status().await;
        let mut blanked = false;

        if status.needs_blank() {
            info!(message = %status.message, "FRU unusable, blank-initializing");
            self.blank_initialize(&status).await?;
            blanked = true;
        } else if let Ok(fields) = self.read_fields().await {
            if fields.serial.as_deref() == Some(id.serial.as_str()) {
                return Ok(OnceOutcome::AlreadyProvisioned);
            }
        }

        let image = generate_fru_image(id)?;
        let path = self.cfg.work_dir.join("fru-image.bin");
        tokio::fs::write(&path, &image).await?;

        let report = Cmd::new(&self.cfg.tool)
            .args(["fru", "write", &self.cfg.device_id])
            .arg(&path)
            .timeout(TOOL_TIMEOUT)
            .run()
            .await;
        if !report.passed() {
            return Err(FlashError::Execution(format!(
                "FRU write failed: {}",
                report.error_summary.unwrap_or_default()
            )));
        }

        let fields = self.read_fields().await?;
        let mismatches = compare_fields(id, &fields);
        if !mismatches.is_empty() {
            return Err(FlashError::Verification(mismatches.join("; ")));
        }
        Ok(OnceOutcome::Written { blanked })
    }

    /// Classifies the chip from a fresh `fru print` run.
    pub async fn read_status(&self) -> FruStatus {
        let report = Cmd::new(&self.cfg.tool)
            .args(["fru", "print", &self.cfg.device_id])
            .timeout(TOOL_TIMEOUT)
            .run()
            .await;
        let output = report.output.clone();
        let lowered = output.to_lowercase();
        let size = chip_size(&output);

        if !report.passed() {
            let present = !lowered.contains("not present") && !lowered.contains("no such");
            return FruStatus {
                present,
                empty: false,
                bad_checksum: false,
                readable: false,
                message: report
                    .error_summary
                    .unwrap_or_else(|| "FRU read failed".to_string()),
                size,
            };
        }
        if lowered.contains("checksum") {
            return FruStatus {
                present: true,
                empty: false,
                bad_checksum: true,
                readable: false,
                message: "FRU checksum error".to_string(),
                size,
            };
        }
        if lowered.contains("unknown fru header") || output.trim().is_empty() {
            return FruStatus {
                present: true,
                empty: true,
                bad_checksum: false,
                readable: false,
                message: "FRU header not recognized".to_string(),
                size,
            };
        }
        FruStatus {
            present: true,
            empty: false,
            bad_checksum: false,
            readable: true,
            message: String::new(),
            size,
        }
    }

    async fn read_fields(&self) -> FlashResult<FruFields> {
        let report = Cmd::new(&self.cfg.tool)
            .args(["fru", "print", &self.cfg.device_id])
            .timeout(TOOL_TIMEOUT)
            .run()
            .await;
        if !report.passed() {
            return Err(FlashError::Execution(format!(
                "FRU read failed: {}",
                report.error_summary.unwrap_or_default()
            )));
        }
        Ok(parse_fru_print(&report.output))
    }

    async fn blank_initialize(&self, status: &FruStatus) -> FlashResult<()> {
        if let Some(size) = status.size {
            if size != FRU_BLANK_SIZE {
                return Err(FlashError::Precondition(format!(
                    "FRU chip reports {size} bytes, blanking assumes {FRU_BLANK_SIZE}"
                )));
            }
        }
        let path = self.cfg.work_dir.join("fru-blank.bin");
        tokio::fs::write(&path, vec![0u8; FRU_BLANK_SIZE]).await?;

        let report = Cmd::new(&self.cfg.tool)
            .args(["fru", "write", &self.cfg.device_id])
            .arg(&path)
            .timeout(TOOL_TIMEOUT)
            .run()
            .await;
        if !report.passed() {
            return Err(FlashError::Execution(format!(
                "FRU blank-initialization failed: {}",
                report.error_summary.unwrap_or_default()
            )));
        }
        // Give the chip a moment before the real image goes in.
        tokio::time::sleep(SETTLE_DELAY).await;
        Ok(())
    }
}

/// Extracts the board identity fields from ipmitool-style output.
pub fn parse_fru_print(output: &str) -> FruFields {
    let field = |label: &str| -> Option<String> {
        let pattern = format!(r"(?m)^\s*{label}\s*:\s*(.+?)\s*$");
        let re = Regex::new(&pattern).ok()?;
        re.captures(output)
            .map(|c| c[1].trim().to_string())
            .filter(|v| !v.is_empty())
    };
    FruFields {
        manufacturer: field("Board Mfg"),
        product: field("Board Product"),
        serial: field("Board Serial"),
    }
}

/// Compares each identity field individually; every mismatch is named
/// so the operator sees exactly which field disagrees.
pub fn compare_fields(id: &FruIdentity, read: &FruFields) -> Vec<String> {
    let mut mismatches = Vec::new();
    let mut check = |name: &str, wrote: &str, got: &Option<String>| {
        if got.as_deref() != Some(wrote) {
            mismatches.push(format!(
                "{name}: wrote '{wrote}', read '{}'",
                got.as_deref().unwrap_or("")
            ));
        }
    };
    check("manufacturer", &id.manufacturer, &read.manufacturer);
    check("product", &id.product, &read.product);
    check("serial", &id.serial, &read.serial);
    mismatches
}

fn chip_size(message: &str) -> Option<usize> {
    let re = Regex::new(r"(?i)size\s*[:=]\s*(\d+)").ok()?;
    re.captures(message)?.get(1)?.as_str().parse().ok()
}

/// Builds a minimal IPMI FRU image: common header plus a board info
/// area carrying manufacturer, product and serial, padded out to the
/// full chip size.
pub fn generate_fru_image(id: &FruIdentity) -> FlashResult<Vec<u8>> {
    let mut board: Vec<u8> = Vec::new();
    board.push(0x01); // area format version
    board.push(0x00); // length in 8-byte units, patched below
    board.push(0x00); // language code (english)
    board.extend_from_slice(&[0x00, 0x00, 0x00]); // mfg date unspecified
    push_field(&mut board, &id.manufacturer)?;
    push_field(&mut board, &id.product)?;
    push_field(&mut board, &id.serial)?;
    board.push(0xC1); // end-of-area marker
    while (board.len() + 1) % 8 != 0 {
        board.push(0x00);
    }
    board[1] = ((board.len() + 1) / 8) as u8;
    board.push(area_checksum(&board));

    // Common header: version, no internal/chassis areas, board area at
    // offset 8 (one 8-byte unit), no product/multirecord areas.
    let mut image = vec![0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
    image.push(area_checksum(&image));
    image.extend_from_slice(&board);

    if image.len() > FRU_BLANK_SIZE {
        return Err(FlashError::Execution(format!(
            "generated FRU image ({} bytes) exceeds chip size",
            image.len()
        )));
    }
    image.resize(FRU_BLANK_SIZE, 0x00);
    Ok(image)
}

fn push_field(buf: &mut Vec<u8>, value: &str) -> FlashResult<()> {
    let bytes = value.as_bytes();
    if bytes.len() > MAX_FIELD_LEN {
        return Err(FlashError::Execution(format!(
            "FRU field '{value}' exceeds {MAX_FIELD_LEN} bytes"
        )));
    }
    buf.push(0xC0 | bytes.len() as u8); // ASCII type/length byte
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Zero-sum checksum: the byte that makes the area sum to 0 mod 256.
fn area_checksum(data: &[u8]) -> u8 {
    0u8.wrapping_sub(data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)))
}
