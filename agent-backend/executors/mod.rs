pub mod dry_run;
pub mod shell;

use std::time::Duration;

use async_trait::async_trait;

use crate::catalog::PrimitiveAction;

#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub success: bool,
    pub output: String,
    pub duration: Duration,
}

impl ActionOutcome {
    pub fn ok(output: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: true,
            output: output.into(),
            duration,
        }
    }

    pub fn failed(output: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            output: output.into(),
            duration,
        }
    }
}

/// Runs one primitive action.
///
/// Implementations report every failure through [`ActionOutcome`] and never
/// return an error or panic, so a bad step cannot abort an activity script.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, action: &PrimitiveAction) -> ActionOutcome;
}
