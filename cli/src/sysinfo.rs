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

use std::path::Path;
use std::time::Duration;

use anvil_utils::Cmd;
use serde::Serialize;
use tracing::debug;

const DMI_DIR: &str = "/sys/class/dmi/id";
const IP_TIMEOUT: Duration = Duration::from_secs(10);

/// Machine identity as read from the DMI table, plus the primary IP.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub product: String,
    pub vendor: String,
    pub board_serial: String,
    pub product_serial: String,
    pub bios_version: String,
    pub bios_date: String,
    pub ip: Option<String>,
}

impl SystemInfo {
    pub async fn collect() -> Self {
        let mut info = Self::from_dmi(Path::new(DMI_DIR)).await;
        info.ip = primary_ip().await;
        info
    }

    /// DMI fields only; missing attributes come back empty rather than
    /// failing, identity gaps are judged by the caller.
    pub async fn from_dmi(dmi: &Path) -> Self {
        let attr = |name: &str| {
            let path = dmi.join(name);
            async move {
                tokio::fs::read_to_string(&path)
                    .await
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default()
            }
        };
        Self {
            product: attr("product_name").await,
            vendor: attr("sys_vendor").await,
            board_serial: attr("board_serial").await,
            product_serial: attr("product_serial").await,
            bios_version: attr("bios_version").await,
            bios_date: attr("bios_date").await,
            ip: None,
        }
    }
}

/// Whether the process runs with real uid 0, from `/proc/self/status`.
pub async fn is_root() -> bool {
    let Ok(status) = tokio::fs::read_to_string("/proc/self/status").await else {
        return false;
    };
    status
        .lines()
        .find(|line| line.starts_with("Uid:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .map(|uid| uid == "0")
        .unwrap_or(false)
}

/// Source address of the default route, if the machine has one.
pub async fn primary_ip() -> Option<String> {
    let report = Cmd::new("ip")
        .args(["route", "get", "1.1.1.1"])
        .timeout(IP_TIMEOUT)
        .run()
        .await;
    if !report.passed() {
        debug!("no default route, primary IP unknown");
        return None;
    }
    let mut tokens = report.output.split_whitespace();
    tokens
        .by_ref()
        .find(|t| *t == "src")
        .and_then(|_| tokens.next())
        .map(str::to_string)
}
