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

use anvil_utils::{poll_until, Cmd};
use tracing::{debug, info, warn};
use uname::uname;

use crate::{FlashError, FlashResult};

const MODULE_POLL_TIMEOUT: Duration = Duration::from_secs(10);
const MODULE_POLL_INTERVAL: Duration = Duration::from_millis(250);
const MODPROBE_TIMEOUT: Duration = Duration::from_secs(30);
const BUILD_TIMEOUT: Duration = Duration::from_secs(300);

/// Kernel module lifecycle as this manager tracks it. Only used for
/// audit logging; the loaded-module list is the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Unloaded,
    Loading,
    Loaded,
    Unloading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    /// The flashing module was already loaded (and the normal driver
    /// was not) when we arrived; do nothing and clean up nothing.
    AlreadyReady,
    /// We swapped drivers ourselves and owe a restore.
    Swapped,
}

/// Swaps a NIC's normal driver for the vendor flashing driver and back.
/// Module state is a host-global singleton: a load and an unload of the
/// same target are never overlapped.
pub struct DriverLifecycle {
    normal_driver: String,
    flash_driver: String,
    driver_dir: PathBuf,
    entry: Option<EntryState>,
}

impl DriverLifecycle {
    pub fn new(normal_driver: &str, flash_driver: &str, driver_dir: &Path) -> Self {
        Self {
            normal_driver: normal_driver.to_string(),
            flash_driver: flash_driver.to_string(),
            driver_dir: driver_dir.to_path_buf(),
            entry: None,
        }
    }

    /// Brings the flashing module up, resolving whatever driver state
    /// the machine is in:
    /// - flashing module loaded, normal driver not: already ready,
    ///   nothing to do (and nothing to clean up);
    /// - both loaded: unload both, then load the flashing module;
    /// - otherwise: unload the normal driver, load the flashing module.
    pub async fn prepare(&mut self) -> FlashResult<()> {
        let flash = self.flash_driver.clone();
        let normal = self.normal_driver.clone();

        let flash_loaded = module_loaded(&flash).await;
        let normal_loaded = module_loaded(&normal).await;

        if flash_loaded && !normal_loaded {
            info!(module = %flash, "flashing module already loaded, skipping driver swap");
            self.entry = Some(EntryState::AlreadyReady);
            return Ok(());
        }

        self.entry = Some(EntryState::Swapped);
        if flash_loaded && normal_loaded {
            self.unload(&flash).await?;
            self.unload(&normal).await?;
        } else if normal_loaded {
            self.unload(&normal).await?;
        }
        self.load_flash_module().await
    }

    /// Restores the machine: unloads the flashing module and loads the
    /// normal driver back. A no-op when `prepare` found the machine
    /// already ready. Always leaves exactly one of the two loaded.
    pub async fn cleanup(&mut self) -> FlashResult<()> {
        match self.entry {
            Some(EntryState::AlreadyReady) => {
                debug!("driver state was untouched, cleanup is a no-op");
                return Ok(());
            }
            Some(EntryState::Swapped) | None => {}
        }
        let flash = self.flash_driver.clone();
        let normal = self.normal_driver.clone();
        if let Err(e) = self.unload(&flash).await {
            warn!(module = %flash, "unload during cleanup failed: {e}");
        }
        let result = self.load(&normal).await;
        self.entry = None;
        result
    }

    pub async fn unload(&self, name: &str) -> FlashResult<()> {
        if !module_loaded(name).await {
            return Ok(());
        }
        debug!(module = name, state = ?ModuleState::Unloading, "unloading kernel module");
        let report = Cmd::new("modprobe")
            .args(["-r", name])
            .timeout(MODPROBE_TIMEOUT)
            .run()
            .await;
        if !report.passed() {
            return Err(FlashError::Execution(format!(
                "modprobe -r {name}: {}",
                report.error_summary.unwrap_or_default()
            )));
        }
        let gone = poll_until(
            || async move { !module_loaded(name).await },
            MODULE_POLL_TIMEOUT,
            MODULE_POLL_INTERVAL,
        )
        .await;
        if !gone {
            // Non-fatal: the module list can lag while references drain.
            warn!(module = name, "module still listed after unload, continuing");
        } else {
            debug!(module = name, state = ?ModuleState::Unloaded, "module unloaded");
        }
        Ok(())
    }

    pub async fn load(&self, name: &str) -> FlashResult<()> {
        if module_loaded(name).await {
            return Ok(());
        }
        debug!(module = name, state = ?ModuleState::Loading, "loading kernel module");
        let report = Cmd::new("modprobe")
            .arg(name)
            .timeout(MODPROBE_TIMEOUT)
            .run()
            .await;
        if !report.passed() {
            return Err(FlashError::Execution(format!(
                "modprobe {name}: {}",
                report.error_summary.unwrap_or_default()
            )));
        }
        let present = poll_until(
            || async move { module_loaded(name).await },
            MODULE_POLL_TIMEOUT,
            MODULE_POLL_INTERVAL,
        )
        .await;
        if !present {
            return Err(FlashError::Execution(format!(
                "module {name} not listed after load"
            )));
        }
        debug!(module = name, state = ?ModuleState::Loaded, "module loaded");
        Ok(())
    }

    /// Loads the vendor flashing module: first the cached object keyed
    /// by the running kernel version, then a from-source build when the
    /// cache misses or the cached object is rejected.
    async fn load_flash_module(&self) -> FlashResult<()> {
        let release = kernel_release()?;
        let cached = self
            .driver_dir
            .join(format!("{}-{release}.ko", self.flash_driver));

        if tokio::fs::try_exists(&cached).await.unwrap_or(false) {
            if self.insmod(&cached).await.is_ok() {
                return Ok(());
            }
            warn!(path = %cached.display(), "cached flashing module rejected, rebuilding");
        }

        self.build_flash_module(&release, &cached).await?;
        self.insmod(&cached).await
    }

    async fn insmod(&self, path: &Path) -> FlashResult<()> {
        let report = Cmd::new("insmod")
            .arg(path)
            .timeout(MODPROBE_TIMEOUT)
            .run()
            .await;
        if !report.passed() {
            return Err(FlashError::Execution(format!(
                "insmod {}: {}",
                path.display(),
                report.error_summary.unwrap_or_default()
            )));
        }
        let present = poll_until(
            || async { module_loaded(&self.flash_driver).await },
            MODULE_POLL_TIMEOUT,
            MODULE_POLL_INTERVAL,
        )
        .await;
        if !present {
            return Err(FlashError::Execution(format!(
                "module {} not listed after insmod",
                self.flash_driver
            )));
        }
        Ok(())
    }

    async fn build_flash_module(&self, release: &str, cached: &Path) -> FlashResult<()> {
        let headers = PathBuf::from(format!("/lib/modules/{release}/build"));
        if !headers.is_dir() {
            return Err(FlashError::Precondition(format!(
                "kernel headers missing at {}",
                headers.display()
            )));
        }
        let gcc = Cmd::new("gcc").arg("--version").run().await;
        if !gcc.passed() {
            return Err(FlashError::Precondition(
                "no working C compiler for the flashing module build".to_string(),
            ));
        }

        info!(release, dir = %self.driver_dir.display(), "building flashing module from source");
        let report = Cmd::new("make")
            .args(["-C"])
            .arg(&self.driver_dir)
            .timeout(BUILD_TIMEOUT)
            .run()
            .await;
        if !report.passed() {
            return Err(FlashError::Execution(format!(
                "flashing module build failed: {}",
                report.error_summary.unwrap_or_default()
            )));
        }

        let built = self.driver_dir.join(format!("{}.ko", self.flash_driver));
        tokio::fs::copy(&built, cached).await?;
        info!(path = %cached.display(), "cached flashing module for this kernel");
        Ok(())
    }
}

/// Checks `/proc/modules` for a module. Dashes and underscores are
/// interchangeable in module names.
pub async fn module_loaded(name: &str) -> bool {
    let Ok(modules) = tokio::fs::read_to_string("/proc/modules").await else {
        return false;
    };
    let needle = name.replace('-', "_");
    modules
        .lines()
        .any(|line| line.split_whitespace().next() == Some(needle.as_str()))
}

fn kernel_release() -> FlashResult<String> {
    let info =
        uname().map_err(|e| FlashError::Execution(format!("uname failed: {e}")))?;
    Ok(info.release)
}
