pub mod events;
pub mod scheduler;
pub mod session;
pub mod timing;

use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::watch;

use self::timing::InvalidRange;

#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    /// The stop signal fired at a suspension point. Not a failure.
    #[error("shutdown requested")]
    Shutdown,

    /// A pause range that cannot be sampled. Fatal for the loop.
    #[error("invalid timing: {0}")]
    Timing(#[from] InvalidRange),
}

impl AgentError {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, AgentError::Shutdown)
    }
}

/// Source of local wall-clock time for schedule decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Sending half of the stop signal.
#[derive(Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving half of the stop signal, checked at every suspension point.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the trigger fires. Never resolves if every trigger was dropped.
    pub async fn triggered(&mut self) {
        if self.rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Sleep for `duration` unless the stop signal fires first.
    pub async fn pause(&mut self, duration: Duration) -> Result<(), AgentError> {
        if self.is_triggered() {
            return Err(AgentError::Shutdown);
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.triggered() => Err(AgentError::Shutdown),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pause_completes_without_trigger() {
        let (_trigger, mut signal) = shutdown_channel();
        assert!(signal.pause(Duration::from_millis(5)).await.is_ok());
    }

    #[tokio::test]
    async fn pause_returns_shutdown_when_already_triggered() {
        let (trigger, mut signal) = shutdown_channel();
        trigger.trigger();
        let err = signal.pause(Duration::from_secs(3600)).await.unwrap_err();
        assert!(err.is_shutdown());
    }

    #[tokio::test]
    async fn trigger_interrupts_a_long_pause() {
        let (trigger, mut signal) = shutdown_channel();
        let handle = tokio::spawn(async move { signal.pause(Duration::from_secs(3600)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.trigger();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("pause should stop promptly")
            .unwrap();
        assert!(matches!(result, Err(AgentError::Shutdown)));
    }

    #[tokio::test]
    async fn dropped_trigger_does_not_stop_the_agent() {
        let (trigger, mut signal) = shutdown_channel();
        drop(trigger);
        assert!(signal.pause(Duration::from_millis(5)).await.is_ok());
        assert!(!signal.is_triggered());
    }

    #[test]
    fn timing_errors_convert() {
        let err: AgentError = InvalidRange {
            name: "warmup",
            min: 2.0,
            max: 1.0,
        }
        .into();
        assert!(err.to_string().starts_with("invalid timing: warmup range is invalid"));
        assert!(!err.is_shutdown());
    }
}
