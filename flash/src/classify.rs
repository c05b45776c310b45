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

use tracing::{debug, info};

/// Judgment over one vendor-tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Success,
    /// The tool signalled that its flashing driver is not loaded. A
    /// benign condition for tools that fall back to another path, not
    /// a failure.
    DriverAbsent,
    Failure(String),
}

/// Per-tool outcome judgment, kept behind a trait so output-format
/// drift in a vendor tool never touches the orchestration core.
pub trait OutcomeClassifier: Send + Sync {
    fn classify(&self, exit_code: Option<i32>, output: &str) -> ToolOutcome;
}

/// Output with no marker at all must be at least this long to count as
/// success on the strength of its volume alone.
const AMBIGUOUS_OUTPUT_MIN: usize = 80;

/// Classifier for marker-printing flash tools. Textual markers take
/// precedence over the exit code, because the tools in question exit
/// non-zero for conditions they describe as successful in their output.
/// `benign_exit_codes` is the configured allow-list of exit codes that
/// signal "driver absent" rather than failure.
pub struct MarkerClassifier {
    benign_exit_codes: Vec<i32>,
}

impl MarkerClassifier {
    pub fn new(benign_exit_codes: Vec<i32>) -> Self {
        Self { benign_exit_codes }
    }
}

impl OutcomeClassifier for MarkerClassifier {
    fn classify(&self, exit_code: Option<i32>, output: &str) -> ToolOutcome {
        let lowered = output.to_lowercase();

        if lowered.contains("error") {
            let reason = output
                .lines()
                .find(|line| line.to_lowercase().contains("error"))
                .unwrap_or("error marker in output")
                .trim()
                .to_string();
            return ToolOutcome::Failure(reason);
        }
        if lowered.contains("done") || lowered.contains("success") {
            return ToolOutcome::Success;
        }

        match exit_code {
            Some(0) => ToolOutcome::Success,
            Some(code) if self.benign_exit_codes.contains(&code) => {
                debug!(code, "exit code on the benign allow-list, treating as driver-absent");
                ToolOutcome::DriverAbsent
            }
            _ => {
                if output.trim().len() >= AMBIGUOUS_OUTPUT_MIN {
                    // Substantial output without an error marker; the
                    // tool most likely did its work. Logged for audit.
                    info!(
                        exit_code,
                        output_len = output.len(),
                        "ambiguous tool signal resolved as success"
                    );
                    return ToolOutcome::Success;
                }
                ToolOutcome::Failure(format!(
                    "exit code {exit_code:?} with no success marker"
                ))
            }
        }
    }
}
