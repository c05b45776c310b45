use std::io::{BufRead, Write};

use tracing::info;

/// Operator decision after a test attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestDecision {
    Retry,
    Skip,
    Continue,
}

/// Operator decision after a flashing operation exhausted its automatic
/// attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashDecision {
    Retry,
    Abort,
    Skip,
}

/// What the operator gets to see before deciding. The full command
/// output has already been printed by the caller; `detail` is the short
/// failure reason.
#[derive(Debug)]
pub struct DecisionContext<'a> {
    pub name: &'a str,
    pub attempt: u32,
    pub detail: &'a str,
}

/// Seam for operator interaction. The orchestration code never touches
/// stdin directly, so headless runs swap in [`AutoDecisions`] and tests
/// swap in scripted providers.
pub trait DecisionProvider: Send + Sync {
    fn decide_test(&self, ctx: &DecisionContext<'_>) -> TestDecision;
    fn decide_flash(&self, ctx: &DecisionContext<'_>) -> FlashDecision;
}

/// Interactive provider backed by stdin. Prompts block the whole run;
/// nothing else executes while a prompt is pending.
pub struct ConsoleDecisions;

impl ConsoleDecisions {
    fn read_line(prompt: &str) -> String {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{prompt}");
        let _ = stdout.flush();
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        line.trim().to_lowercase()
    }
}

impl DecisionProvider for ConsoleDecisions {
    fn decide_test(&self, ctx: &DecisionContext<'_>) -> TestDecision {
        loop {
            let answer = Self::read_line(&format!(
                "'{}' failed (attempt {}): {}\n[R]etry / [S]kip / [C]ontinue (default retry): ",
                ctx.name, ctx.attempt, ctx.detail
            ));
            match answer.as_str() {
                "" | "r" | "retry" => return TestDecision::Retry,
                "s" | "skip" => return TestDecision::Skip,
                "c" | "continue" => return TestDecision::Continue,
                other => println!("unrecognized answer '{other}'"),
            }
        }
    }

    fn decide_flash(&self, ctx: &DecisionContext<'_>) -> FlashDecision {
        loop {
            let answer = Self::read_line(&format!(
                "'{}' failed (attempt {}): {}\n[R]etry / [A]bort / [S]kip (default retry): ",
                ctx.name, ctx.attempt, ctx.detail
            ));
            match answer.as_str() {
                "" | "r" | "retry" => return FlashDecision::Retry,
                "a" | "abort" => return FlashDecision::Abort,
                "s" | "skip" => return FlashDecision::Skip,
                other => println!("unrecognized answer '{other}'"),
            }
        }
    }
}

/// Non-interactive provider for headless runs: keep failed test results
/// and move on, never half-apply a flashing operation.
pub struct AutoDecisions;

impl DecisionProvider for AutoDecisions {
    fn decide_test(&self, ctx: &DecisionContext<'_>) -> TestDecision {
        info!(test = ctx.name, "headless run, keeping failed result");
        TestDecision::Continue
    }

    fn decide_flash(&self, ctx: &DecisionContext<'_>) -> FlashDecision {
        info!(operation = ctx.name, "headless run, aborting flash operation");
        FlashDecision::Abort
    }
}
