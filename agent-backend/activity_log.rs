//! Append-only JSON-lines record of everything the agent did.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::agent::events::AgentEvent;

pub const LOG_FILE_NAME: &str = "activity_agent.log";

fn open_in(dir: &Path) -> Result<(PathBuf, File)> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(LOG_FILE_NAME);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    Ok((path, file))
}

/// Open the activity log in `preferred`, or in `fallback` when `preferred`
/// is not writable.
pub fn open_log(preferred: &Path, fallback: &Path) -> Result<(PathBuf, File)> {
    match open_in(preferred) {
        Ok(opened) => Ok(opened),
        Err(e) => {
            tracing::warn!(
                dir = %preferred.display(),
                fallback = %fallback.display(),
                error = %e,
                "Log directory not writable, using fallback"
            );
            open_in(fallback)
        }
    }
}

/// The fallback used by the binary: `activity_agent` under the system temp dir.
pub fn temp_fallback_dir() -> PathBuf {
    std::env::temp_dir().join("activity_agent")
}

/// Write every event from `rx` to `file` as one JSON line until the channel closes.
pub fn spawn_writer(mut rx: broadcast::Receiver<AgentEvent>, mut file: File) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let line = match serde_json::to_string(&event) {
                        Ok(line) => line,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to serialize activity event");
                            continue;
                        }
                    };
                    if let Err(e) = writeln!(file, "{line}") {
                        tracing::warn!(error = %e, "failed to append to activity log");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "activity log writer lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        let _ = file.flush();
    })
}
