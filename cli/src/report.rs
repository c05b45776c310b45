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

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anvil_testrun::TestResult;
use anvil_utils::Cmd;
use serde::Serialize;
use tracing::{info, warn};

use crate::cfg::LogConfig;
use crate::sysinfo::SystemInfo;
use crate::AnvilResult;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Pass,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Pass => write!(f, "pass"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashRecordStatus {
    Pass,
    Failed,
    Skipped,
}

/// Outcome of one flashing operation as persisted into the record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashRecord {
    pub name: String,
    pub status: FlashRecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FlashRecord {
    pub fn failed(&self) -> bool {
        self.status == FlashRecordStatus::Failed
    }
}

/// Built once at the end of the session and never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub timestamp: String,
    pub state: SessionState,
    /// Phases that actually ran, in order.
    pub pipeline: Vec<String>,
    pub system_info: SystemInfo,
    pub test_results: Vec<TestResult>,
    pub flash_results: Vec<FlashRecord>,
}

impl SessionRecord {
    pub fn new(
        state: SessionState,
        pipeline: Vec<String>,
        system_info: SystemInfo,
        test_results: Vec<TestResult>,
        flash_results: Vec<FlashRecord>,
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Local::now().format("%Y%m%d-%H%M%S").to_string(),
            state,
            pipeline,
            system_info,
            test_results,
            flash_results,
        }
    }

    pub fn filename(&self, product: &str, serial: &str) -> String {
        format!(
            "{}_{}_{}_{}.yaml",
            sanitize(product),
            sanitize(serial),
            self.timestamp,
            self.state
        )
    }

    pub async fn save_local(&self, log_dir: &Path, filename: &str) -> AnvilResult<PathBuf> {
        tokio::fs::create_dir_all(log_dir).await?;
        let path = log_dir.join(filename);
        let text = serde_yaml::to_string(self).map_err(crate::AnvilError::Yaml)?;
        tokio::fs::write(&path, text).await?;
        info!(path = %path.display(), "session record saved");
        Ok(path)
    }
}

/// The session state is `failed` iff any required test failed or timed
/// out, or any flash operation failed. Skips and non-required failures
/// do not count.
pub fn compute_state(tests: &[TestResult], flash: &[FlashRecord]) -> SessionState {
    let test_failed = tests.iter().any(|t| t.counts_as_failure());
    let flash_failed = flash.iter().any(|f| f.failed());
    if test_failed || flash_failed {
        SessionState::Failed
    } else {
        SessionState::Pass
    }
}

/// Copies the record to `{server}:{server_dir}/{product}/{op_name}/`.
/// Upload problems never fail the session; the local copy is the record
/// of truth.
pub async fn upload(path: &Path, log: &LogConfig, product: &str) {
    let Some(server) = &log.server else {
        warn!("log upload requested but no server is configured");
        return;
    };
    let remote_dir = format!("{}/{}/{}", log.server_dir, sanitize(product), log.op_name);

    let report = Cmd::new("ssh")
        .args([server.as_str(), "mkdir", "-p", remote_dir.as_str()])
        .timeout(UPLOAD_TIMEOUT)
        .run()
        .await;
    if !report.passed() {
        warn!(%server, "could not create remote log directory, skipping upload");
        return;
    }

    let destination = format!("{server}:{remote_dir}/");
    let report = Cmd::new("scp")
        .arg(path)
        .arg(&destination)
        .timeout(UPLOAD_TIMEOUT)
        .run()
        .await;
    if report.passed() {
        info!(%destination, "session record uploaded");
    } else {
        warn!(
            %destination,
            "session record upload failed: {}",
            report.error_summary.unwrap_or_default()
        );
    }
}

/// Keeps filenames and remote paths shell-safe.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}
