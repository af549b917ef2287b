use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{ActionOutcome, Executor};
use crate::catalog::PrimitiveAction;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;
const TYPE_DELAY_MS: u32 = 100;
/// How long to keep reading output after the command exits.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Executes actions on the local desktop: shell commands through `sh -c`
/// (or `sudo -u <user> bash -c`), keystrokes through `xdotool`.
pub struct ShellExecutor {
    /// Run shell commands as this user instead of the agent's own.
    run_as: Option<String>,
    command_timeout: Duration,
    max_output_bytes: usize,
}

impl ShellExecutor {
    pub fn new(run_as: Option<String>) -> Self {
        Self {
            run_as: run_as.filter(|u| !u.is_empty()),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    #[cfg(test)]
    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    /// Program and arguments for an action; `None` for actions that spawn nothing.
    pub fn build_command(&self, action: &PrimitiveAction) -> Option<(String, Vec<String>)> {
        match action {
            PrimitiveAction::RunShell { command } => match &self.run_as {
                Some(user) => Some((
                    "sudo".to_string(),
                    vec![
                        "-u".to_string(),
                        user.clone(),
                        "bash".to_string(),
                        "-c".to_string(),
                        command.clone(),
                    ],
                )),
                None => Some(("sh".to_string(), vec!["-c".to_string(), command.clone()])),
            },
            PrimitiveAction::TypeText { text } => Some((
                "xdotool".to_string(),
                vec![
                    "type".to_string(),
                    "--delay".to_string(),
                    TYPE_DELAY_MS.to_string(),
                    text.clone(),
                ],
            )),
            PrimitiveAction::Sleep { .. } => None,
        }
    }

    async fn spawn_and_wait(&self, program: &str, args: &[String]) -> ActionOutcome {
        let started = Instant::now();
        let deadline = started + self.command_timeout;

        let mut child = match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return ActionOutcome::failed(format!("spawn failed: {e}"), started.elapsed());
            }
        };

        let max_bytes = self.max_output_bytes;
        let mut stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(collect_bounded(out, max_bytes)));
        let mut stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(collect_bounded(err, max_bytes)));

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                abort_all([&stdout_task, &stderr_task]);
                return ActionOutcome::failed(format!("wait failed: {e}"), started.elapsed());
            }
            Err(_) => {
                let _ = child.kill().await;
                abort_all([&stdout_task, &stderr_task]);
                return ActionOutcome::failed(
                    format!("timed out after {}s", self.command_timeout.as_secs_f64()),
                    started.elapsed(),
                );
            }
        };

        // A background process started by the command can hold the pipes
        // open after the command itself exits.
        let drain_deadline = deadline.min(Instant::now() + OUTPUT_DRAIN_GRACE);
        let drained = tokio::time::timeout_at(drain_deadline, async {
            let stdout = join_output(stdout_task.as_mut()).await;
            let stderr = join_output(stderr_task.as_mut()).await;
            (stdout, stderr)
        })
        .await;
        let (stdout, stderr) = match drained {
            Ok(output) => output,
            Err(_) => {
                abort_all([&stdout_task, &stderr_task]);
                tracing::debug!(program, "output still open after exit, left to a background process");
                (String::new(), String::new())
            }
        };
        let duration = started.elapsed();

        if status.success() {
            ActionOutcome::ok(stdout.trim(), duration)
        } else {
            let detail = if stderr.trim().is_empty() {
                format!("exited with {status}")
            } else {
                stderr.trim().to_string()
            };
            ActionOutcome::failed(detail, duration)
        }
    }
}

async fn collect_bounded<R: AsyncRead + Unpin>(mut reader: R, max_bytes: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = max_bytes.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    buf
}

fn abort_all<const N: usize>(tasks: [&Option<JoinHandle<Vec<u8>>>; N]) {
    for task in tasks.into_iter().flatten() {
        task.abort();
    }
}

async fn join_output(task: Option<&mut JoinHandle<Vec<u8>>>) -> String {
    match task {
        Some(handle) => String::from_utf8_lossy(&handle.await.unwrap_or_default()).into_owned(),
        None => String::new(),
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn execute(&self, action: &PrimitiveAction) -> ActionOutcome {
        if let PrimitiveAction::Sleep { duration } = action {
            let started = Instant::now();
            tokio::time::sleep(*duration).await;
            return ActionOutcome::ok("", started.elapsed());
        }

        match self.build_command(action) {
            Some((program, args)) => self.spawn_and_wait(&program, &args).await,
            None => ActionOutcome::ok("", Duration::ZERO),
        }
    }
}
