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
use std::str::FromStr;
use std::time::Duration;

use anvil_utils::Cmd;
use mac_address::MacAddress;
use serde::Serialize;
use tracing::debug;

use crate::FlashResult;

pub const SYS_CLASS_NET: &str = "/sys/class/net";

/// A point-in-time view of one network interface. Loading or unloading
/// drivers can rename or remove interfaces, so snapshots are always
/// captured fresh and never reused across a driver reload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceSnapshot {
    pub name: String,
    pub mac: Option<MacAddress>,
    /// CIDR form as reported by `ip`, e.g. "10.1.2.3/24".
    pub ip: Option<String>,
    pub driver: Option<String>,
    pub state: String,
}

/// Enumerates all non-loopback interfaces from sysfs.
pub async fn snapshot() -> FlashResult<Vec<InterfaceSnapshot>> {
    snapshot_from(Path::new(SYS_CLASS_NET)).await
}

pub async fn snapshot_from(root: &Path) -> FlashResult<Vec<InterfaceSnapshot>> {
    let mut interfaces = Vec::new();
    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name == "lo" {
            continue;
        }
        let base = entry.path();
        let mac = read_trimmed(base.join("address"))
            .await
            .ok()
            .and_then(|s| MacAddress::from_str(&s).ok());
        let state = read_trimmed(base.join("operstate"))
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        let driver = driver_of(&base).await;
        let ip = interface_ip(&name).await;
        interfaces.push(InterfaceSnapshot {
            name,
            mac,
            ip,
            driver,
            state,
        });
    }
    debug!(count = interfaces.len(), "captured interface snapshot");
    Ok(interfaces)
}

pub fn find_by_mac<'a>(
    interfaces: &'a [InterfaceSnapshot],
    mac: &MacAddress,
) -> Option<&'a InterfaceSnapshot> {
    interfaces.iter().find(|i| i.mac.as_ref() == Some(mac))
}

pub fn find_by_name<'a>(
    interfaces: &'a [InterfaceSnapshot],
    name: &str,
) -> Option<&'a InterfaceSnapshot> {
    interfaces.iter().find(|i| i.name == name)
}

pub fn find_by_driver<'a>(
    interfaces: &'a [InterfaceSnapshot],
    driver: &str,
) -> Option<&'a InterfaceSnapshot> {
    interfaces.iter().find(|i| i.driver.as_deref() == Some(driver))
}

async fn driver_of(base: &Path) -> Option<String> {
    let link = tokio::fs::read_link(base.join("device/driver")).await.ok()?;
    link.file_name().map(|n| n.to_string_lossy().to_string())
}

async fn interface_ip(name: &str) -> Option<String> {
    let report = Cmd::new("ip")
        .args(["-o", "-4", "addr", "show", "dev", name])
        .timeout(Duration::from_secs(5))
        .run()
        .await;
    if !report.passed() {
        return None;
    }
    // "2: enp3s0    inet 10.1.2.3/24 brd 10.1.2.255 scope global ..."
    let mut tokens = report.output.split_whitespace().skip_while(|t| *t != "inet");
    tokens.next()?;
    tokens.next().map(|cidr| cidr.to_string())
}

async fn read_trimmed(path: PathBuf) -> std::io::Result<String> {
    Ok(tokio::fs::read_to_string(path).await?.trim().to_string())
}
