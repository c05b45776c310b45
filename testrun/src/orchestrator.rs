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

use std::sync::Arc;
use std::time::Duration;

use anvil_utils::{Cmd, CmdReport, DecisionContext, DecisionProvider, TestDecision};
use tracing::{error, info};

use crate::console::Console;
use crate::result::{TestResult, TestStatus};
use crate::spec::TestSpec;

/// Retries count toward this ceiling; once an attempt with this number
/// has failed, exactly one more run happens and its result is accepted
/// without further prompting.
pub const MAX_PROMPTED_ATTEMPTS: u32 = 5;

/// Drives the configured test groups. Parallel groups run one tokio
/// task per member and synchronize on a completion barrier; retries and
/// all sequential groups run single-flight on the caller's task.
pub struct TestOrchestrator {
    default_timeout: Duration,
    decisions: Arc<dyn DecisionProvider>,
    console: Arc<Console>,
}

#[derive(Debug)]
pub struct RunSummary {
    pub results: Vec<TestResult>,
}

impl RunSummary {
    pub fn has_required_failure(&self) -> bool {
        self.results.iter().any(|r| r.counts_as_failure())
    }
}

impl TestOrchestrator {
    pub fn new(default_timeout: Duration, decisions: Arc<dyn DecisionProvider>) -> Self {
        Self {
            default_timeout,
            decisions,
            console: Arc::new(Console::new()),
        }
    }

    pub async fn run(
        &self,
        parallel_groups: &[Vec<TestSpec>],
        sequential_groups: &[Vec<TestSpec>],
    ) -> RunSummary {
        let mut results = Vec::new();
        for (index, group) in parallel_groups.iter().enumerate() {
            info!(group = index, size = group.len(), "running parallel test group");
            results.extend(self.run_parallel_group(group).await);
        }
        for (index, group) in sequential_groups.iter().enumerate() {
            info!(group = index, size = group.len(), "running sequential test group");
            for spec in group {
                results.push(self.run_with_retries(spec, None).await);
            }
        }
        RunSummary { results }
    }

    async fn run_parallel_group(&self, group: &[TestSpec]) -> Vec<TestResult> {
        let mut handles = Vec::with_capacity(group.len());
        for spec in group {
            let spec = spec.clone();
            let timeout = self.timeout_for(&spec);
            let console = Arc::clone(&self.console);
            handles.push(tokio::spawn(async move {
                let report = run_once(&spec, timeout).await;
                print_attempt(&console, &spec, &report, 1);
                TestResult::from_report(&spec, &report, 1)
            }));
        }

        // Completion barrier: the whole batch finishes before any
        // failure is looked at. A deadline cancels only its own test.
        let mut first_pass = Vec::with_capacity(group.len());
        for (spec, handle) in group.iter().zip(handles) {
            match handle.await {
                Ok(result) => first_pass.push(result),
                Err(e) => {
                    error!(test = %spec.name, "test task failed: {e}");
                    first_pass.push(TestResult {
                        name: spec.name.clone(),
                        required: spec.required,
                        status: TestStatus::Failed,
                        duration_secs: 0.0,
                        error: Some(format!("task failed: {e}")),
                        attempts: 1,
                        output: String::new(),
                    });
                }
            }
        }

        // Failing members are processed one at a time, in group order.
        let mut results = Vec::with_capacity(first_pass.len());
        for (spec, result) in group.iter().zip(first_pass) {
            if result.passed() {
                results.push(result);
            } else {
                results.push(self.run_with_retries(spec, Some(result)).await);
            }
        }
        results
    }

    /// Inline retry loop for one test. `first` carries an already
    /// executed first attempt from a parallel batch.
    async fn run_with_retries(&self, spec: &TestSpec, first: Option<TestResult>) -> TestResult {
        let timeout = self.timeout_for(spec);
        let mut result = match first {
            Some(result) => result,
            None => {
                let report = run_once(spec, timeout).await;
                print_attempt(&self.console, spec, &report, 1);
                TestResult::from_report(spec, &report, 1)
            }
        };

        loop {
            if result.passed() {
                return result;
            }
            if result.attempts >= MAX_PROMPTED_ATTEMPTS {
                let attempts = result.attempts + 1;
                self.console.line(&format!(
                    "[{}] attempt ceiling reached, running one final time",
                    spec.name
                ));
                let report = run_once(spec, timeout).await;
                print_attempt(&self.console, spec, &report, attempts);
                // Accepted unconditionally, pass or fail.
                return TestResult::from_report(spec, &report, attempts);
            }

            let detail = result
                .error
                .clone()
                .unwrap_or_else(|| "failed".to_string());
            let ctx = DecisionContext {
                name: &spec.name,
                attempt: result.attempts,
                detail: &detail,
            };
            match self.decisions.decide_test(&ctx) {
                TestDecision::Retry => {
                    let attempts = result.attempts + 1;
                    let report = run_once(spec, timeout).await;
                    print_attempt(&self.console, spec, &report, attempts);
                    result = TestResult::from_report(spec, &report, attempts);
                }
                TestDecision::Skip => return TestResult::skipped(spec, result.attempts),
                TestDecision::Continue => return result,
            }
        }
    }

    fn timeout_for(&self, spec: &TestSpec) -> Duration {
        spec.timeout
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
    }
}

async fn run_once(spec: &TestSpec, timeout: Duration) -> CmdReport {
    Cmd::new(&spec.command)
        .args(&spec.args)
        .timeout(timeout)
        .run()
        .await
}

fn print_attempt(console: &Console, spec: &TestSpec, report: &CmdReport, attempt: u32) {
    let secs = report.duration.as_secs_f64();
    if report.passed() {
        if spec.collapse_output_on_success {
            console.line(&format!(
                "[{}] passed (attempt {attempt}, {secs:.1}s)",
                spec.name
            ));
            return;
        }
        console.block(
            &format!("[{}] passed (attempt {attempt}, {secs:.1}s)", spec.name),
            &report.output,
        );
        return;
    }
    let reason = report.error_summary.as_deref().unwrap_or("failed");
    console.block(
        &format!(
            "[{}] {reason} (attempt {attempt}, {secs:.1}s)",
            spec.name
        ),
        &report.output,
    );
}
