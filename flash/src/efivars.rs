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
use std::time::Duration;

use anvil_utils::Cmd;
use tracing::{debug, info, warn};

use crate::{FlashError, FlashResult};

pub const EFIVARS_DIR: &str = "/sys/firmware/efi/efivars";

const ATTR_NON_VOLATILE: u32 = 0x1;
const ATTR_BOOTSERVICE_ACCESS: u32 = 0x2;
const ATTR_RUNTIME_ACCESS: u32 = 0x4;
const WRITE_ATTRIBUTES: u32 = ATTR_NON_VOLATILE | ATTR_BOOTSERVICE_ACCESS | ATTR_RUNTIME_ACCESS;

const CHATTR_TIMEOUT: Duration = Duration::from_secs(10);

pub const MAX_NAME_LEN: usize = 64;
pub const MAX_VALUE_LEN: usize = 1024;

/// UEFI runtime variables under one GUID namespace, backed by efivarfs.
/// Every access round-trips to firmware; nothing is cached.
#[derive(Debug)]
pub struct EfiVariableStore {
    guid: String,
    root: PathBuf,
}

impl EfiVariableStore {
    /// Fails with a precondition error when the EFI variable subsystem
    /// is not present; that is fatal for the whole flashing phase.
    pub fn new(guid: &str) -> FlashResult<Self> {
        Self::with_root(guid, Path::new(EFIVARS_DIR))
    }

    pub fn with_root(guid: &str, root: &Path) -> FlashResult<Self> {
        if !root.is_dir() {
            return Err(FlashError::Precondition(format!(
                "EFI variable subsystem not available at {}",
                root.display()
            )));
        }
        Ok(Self {
            guid: guid.to_string(),
            root: root.to_path_buf(),
        })
    }

    fn var_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}-{}", self.guid))
    }

    /// Raw variable bytes, without the leading attribute word.
    pub async fn get(&self, name: &str) -> FlashResult<Vec<u8>> {
        let path = self.var_path(name);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FlashError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if data.len() < 4 {
            return Err(FlashError::Verification(format!(
                "variable {name} is shorter than its attribute word"
            )));
        }
        Ok(data[4..].to_vec())
    }

    /// Writes `value` with the non-volatile, boot-service and runtime
    /// attributes. Skipped entirely when the current value already
    /// equals the target, to avoid needless flash wear. Returns whether
    /// a write happened.
    pub async fn set(&self, name: &str, value: &[u8]) -> FlashResult<bool> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(FlashError::Execution(format!(
                "variable name length {} out of bounds (1..={MAX_NAME_LEN})",
                name.len()
            )));
        }
        if value.is_empty() || value.len() > MAX_VALUE_LEN {
            return Err(FlashError::Execution(format!(
                "variable value length {} out of bounds (1..={MAX_VALUE_LEN})",
                value.len()
            )));
        }

        match self.get(name).await {
            Ok(existing) if existing == value => {
                info!(name, "EFI variable already holds the target value, skipping write");
                return Ok(false);
            }
            Ok(_) => {
                // efivarfs marks existing variables immutable; clear the
                // flag before rewriting. Best effort, the write itself
                // reports the real failure.
                let _ = Cmd::new("chattr")
                    .arg("-i")
                    .arg(self.var_path(name))
                    .timeout(CHATTR_TIMEOUT)
                    .run()
                    .await;
            }
            Err(FlashError::NotFound(_)) => {}
            Err(e) => warn!(name, "could not read existing variable: {e}"),
        }

        let mut buf = Vec::with_capacity(4 + value.len());
        buf.extend_from_slice(&WRITE_ATTRIBUTES.to_le_bytes());
        buf.extend_from_slice(value);
        tokio::fs::write(self.var_path(name), &buf).await?;
        debug!(name, len = value.len(), "EFI variable written");

        // Firmware may silently truncate; a mismatch here is worth a
        // warning but is not an error.
        match self.get(name).await {
            Ok(echoed) if echoed != value => warn!(
                name,
                wrote = value.len(),
                read = echoed.len(),
                "EFI variable read-back differs from what was written"
            ),
            Err(e) => warn!(name, "EFI variable read-back failed: {e}"),
            Ok(_) => {}
        }
        Ok(true)
    }
}
