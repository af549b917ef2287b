use std::time::Duration;

use async_trait::async_trait;

use super::{ActionOutcome, Executor};
use crate::catalog::PrimitiveAction;

/// Logs actions without touching the desktop.
///
/// `Sleep` actions are still honored, so a dry run paces itself like the
/// real agent. Nothing is retained between calls.
#[derive(Debug, Default)]
pub struct DryRunExecutor;

impl DryRunExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for DryRunExecutor {
    async fn execute(&self, action: &PrimitiveAction) -> ActionOutcome {
        tracing::info!(action = %action.summary(), "dry run");

        match action {
            PrimitiveAction::Sleep { duration } => {
                tokio::time::sleep(*duration).await;
                ActionOutcome::ok("", *duration)
            }
            _ => ActionOutcome::ok("", Duration::ZERO),
        }
    }
}
