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

use anvil_utils::{CmdReport, CmdStatus};
use serde::{Deserialize, Serialize};

use crate::spec::TestSpec;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Timeout,
    Skipped,
}

/// The kept result for one test. Replaced wholesale on every retry,
/// never merged. `output` is operator-facing only and is not persisted
/// into the session record.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub name: String,
    pub required: bool,
    pub status: TestStatus,
    pub duration_secs: f64,
    pub error: Option<String>,
    pub attempts: u32,
    #[serde(skip)]
    pub output: String,
}

impl TestResult {
    pub fn from_report(spec: &TestSpec, report: &CmdReport, attempts: u32) -> Self {
        let status = match report.status {
            CmdStatus::Passed => TestStatus::Passed,
            CmdStatus::Failed => TestStatus::Failed,
            CmdStatus::Timeout => TestStatus::Timeout,
        };
        Self {
            name: spec.name.clone(),
            required: spec.required,
            status,
            duration_secs: report.duration.as_secs_f64(),
            error: report.error_summary.clone(),
            attempts,
            output: report.output.clone(),
        }
    }

    pub fn skipped(spec: &TestSpec, attempts: u32) -> Self {
        Self {
            name: spec.name.clone(),
            required: spec.required,
            status: TestStatus::Skipped,
            duration_secs: 0.0,
            error: None,
            attempts,
            output: String::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }

    /// Whether this result should count against the session: only
    /// required tests that failed or timed out do.
    pub fn counts_as_failure(&self) -> bool {
        self.required && matches!(self.status, TestStatus::Failed | TestStatus::Timeout)
    }
}
