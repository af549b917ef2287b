use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::catalog::PrimitiveAction;
use crate::executors::ActionOutcome;

#[derive(Debug, Clone, Serialize)]
pub struct AgentEvent {
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub event_type: AgentEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventType {
    AgentStarted,
    AgentStopped,
    ScheduleChanged,
    AppOpened,
    AppClosed,
    ActivityChosen,
    ActionCompleted,
    ActionFailed,
    LookupMiss,
}

impl AgentEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentEventType::AgentStarted => "agent_started",
            AgentEventType::AgentStopped => "agent_stopped",
            AgentEventType::ScheduleChanged => "schedule_changed",
            AgentEventType::AppOpened => "app_opened",
            AgentEventType::AppClosed => "app_closed",
            AgentEventType::ActivityChosen => "activity_chosen",
            AgentEventType::ActionCompleted => "action_completed",
            AgentEventType::ActionFailed => "action_failed",
            AgentEventType::LookupMiss => "lookup_miss",
        }
    }
}

impl AgentEvent {
    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    pub fn with_session(mut self, session_id: Option<&str>) -> Self {
        self.session_id = session_id.map(String::from);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_outcome(mut self, action: &PrimitiveAction, outcome: &ActionOutcome) -> Self {
        self.command = Some(action.summary());
        self.success = Some(outcome.success);
        self.duration_ms = Some(duration_ms(outcome.duration));
        self
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Publishes agent events to subscribers and mirrors them to `tracing`.
#[derive(Clone)]
pub struct EventPublisher {
    username: String,
    tx: Option<broadcast::Sender<AgentEvent>>,
}

impl EventPublisher {
    pub fn new(username: impl Into<String>, tx: Option<broadcast::Sender<AgentEvent>>) -> Self {
        Self {
            username: username.into(),
            tx,
        }
    }

    pub fn event(&self, event_type: AgentEventType, message: impl Into<String>) -> AgentEvent {
        AgentEvent {
            timestamp: Utc::now(),
            username: self.username.clone(),
            event_type,
            session_id: None,
            app: None,
            description: None,
            command: None,
            success: None,
            duration_ms: None,
            message: message.into(),
        }
    }

    pub fn emit(&self, event: AgentEvent) {
        let kind = event.event_type.as_str();
        let app = event.app.as_deref().unwrap_or("-");
        match event.event_type {
            AgentEventType::ActionFailed | AgentEventType::LookupMiss => {
                tracing::warn!(
                    kind,
                    app,
                    command = event.command.as_deref().unwrap_or(""),
                    "{}",
                    event.message
                );
            }
            AgentEventType::ActionCompleted => {
                tracing::info!(
                    kind,
                    app,
                    command = event.command.as_deref().unwrap_or(""),
                    duration_ms = event.duration_ms.unwrap_or(0),
                    "{}",
                    event.message
                );
            }
            _ => {
                tracing::info!(kind, app, "{}", event.message);
            }
        }

        if let Some(tx) = &self.tx {
            // No subscribers is fine; events are best-effort.
            let _ = tx.send(event);
        }
    }
}
