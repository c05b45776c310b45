use std::ffi::{OsStr, OsString};
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command as TokioCommand;
use tracing::debug;

/// Outcome classification for a finished (or killed) subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmdStatus {
    Passed,
    Failed,
    Timeout,
}

/// Everything observed about one subprocess invocation. `output` is
/// stdout followed by stderr; `error_summary` is a short operator-facing
/// reason when the command did not pass.
#[derive(Debug, Clone)]
pub struct CmdReport {
    pub status: CmdStatus,
    pub duration: Duration,
    pub exit_code: Option<i32>,
    pub output: String,
    pub error_summary: Option<String>,
}

impl CmdReport {
    pub fn passed(&self) -> bool {
        self.status == CmdStatus::Passed
    }
}

/// Builder for a subprocess invocation with an optional deadline.
/// `run()` never fails: spawn errors, bad exits and deadline overruns
/// are all folded into the report so callers deal with exactly one
/// result shape.
#[derive(Debug)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    timeout: Option<Duration>,
}

impl Cmd {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn display(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().to_string()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().to_string()));
        parts.join(" ")
    }

    pub async fn run(self) -> CmdReport {
        let rendered = self.display();
        debug!(command = %rendered, "running subprocess");

        let started = Instant::now();
        let mut command = TokioCommand::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return CmdReport {
                    status: CmdStatus::Failed,
                    duration: started.elapsed(),
                    exit_code: None,
                    output: String::new(),
                    error_summary: Some(format!("failed to spawn {rendered}: {e}")),
                };
            }
        };

        // The pipes are drained concurrently with the wait, so a
        // deadline kill still leaves everything the child printed up
        // to that point for the operator to look at.
        let stdout_task = tokio::spawn(drain(child.stdout.take()));
        let stderr_task = tokio::spawn(drain(child.stderr.take()));

        let mut deadline_hit = None;
        let wait_result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    let _ = child.kill().await;
                    deadline_hit = Some(limit);
                    child.wait().await
                }
            },
            None => child.wait().await,
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let mut combined = String::from_utf8_lossy(&stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&stderr));
        let duration = started.elapsed();

        if let Some(limit) = deadline_hit {
            return CmdReport {
                status: CmdStatus::Timeout,
                duration,
                exit_code: None,
                output: combined,
                error_summary: Some(format!("timed out after {}s", limit.as_secs_f64())),
            };
        }

        let exit_status = match wait_result {
            Ok(status) => status,
            Err(e) => {
                return CmdReport {
                    status: CmdStatus::Failed,
                    duration,
                    exit_code: None,
                    output: combined,
                    error_summary: Some(format!("could not wait for {rendered}: {e}")),
                };
            }
        };

        if exit_status.success() {
            return CmdReport {
                status: CmdStatus::Passed,
                duration,
                exit_code: exit_status.code(),
                output: combined,
                error_summary: None,
            };
        }

        let stderr_text = String::from_utf8_lossy(&stderr);
        let summary = stderr_text
            .lines()
            .find(|line| line.trim_start().starts_with("ERROR:"))
            .map(|line| line.trim().to_string())
            .unwrap_or_else(|| match exit_status.code() {
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_string(),
            });

        CmdReport {
            status: CmdStatus::Failed,
            duration,
            exit_code: exit_status.code(),
            output: combined,
            error_summary: Some(summary),
        }
    }
}

async fn drain<R>(pipe: Option<R>) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    use tokio::io::AsyncReadExt;
    let Some(mut pipe) = pipe else {
        return Vec::new();
    };
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    buf
}
