use super::AgentError;
use super::events::AgentEventType;
use super::session::{ActivitySession, CloseReason};
use crate::schedule::{ScheduleState, WorkSchedule, classify};

/// Drives one simulated user: classifies the clock against the work schedule
/// and hands working time to the session.
pub struct Scheduler {
    schedule: WorkSchedule,
    session: ActivitySession,
    last_state: Option<ScheduleState>,
}

impl Scheduler {
    pub fn new(schedule: WorkSchedule, session: ActivitySession) -> Self {
        Self {
            schedule,
            session,
            last_state: None,
        }
    }

    #[cfg(test)]
    pub fn session(&self) -> &ActivitySession {
        &self.session
    }

    /// Run until the stop signal fires or the loop hits a fault.
    ///
    /// A stop is a clean exit. Either way the open application, if any, gets
    /// one close attempt bounded by the shutdown timeout.
    pub async fn run(&mut self) -> Result<(), AgentError> {
        let events = self.session.events().clone();
        events.emit(events.event(
            AgentEventType::AgentStarted,
            format!(
                "Agent started (work hours {}-{})",
                self.schedule.start_time.format("%H:%M"),
                self.schedule.end_time.format("%H:%M")
            ),
        ));

        let stopped = loop {
            if let Err(e) = self.iterate().await {
                break e;
            }
        };

        let result = match stopped {
            stop if stop.is_shutdown() => {
                tracing::info!("Stop requested, shutting down");
                self.close_bounded(CloseReason::Shutdown).await;
                Ok(())
            }
            fault => {
                tracing::error!(
                    error = %fault,
                    app = self.session.state().current_app().unwrap_or("-"),
                    "Activity loop failed"
                );
                self.close_bounded(CloseReason::Fault).await;
                Err(fault)
            }
        };

        let message = match &result {
            Ok(()) => "Agent stopped".to_string(),
            Err(e) => format!("Agent stopped after error: {e}"),
        };
        events.emit(events.event(AgentEventType::AgentStopped, message));
        result
    }

    /// One pass of the loop. Returns the schedule state it acted on.
    pub async fn iterate(&mut self) -> Result<ScheduleState, AgentError> {
        let now = self.session.now();
        let state = classify(now, &self.schedule);

        if self.last_state != Some(state) {
            let events = self.session.events();
            events.emit(events.event(
                AgentEventType::ScheduleChanged,
                format!("Schedule state is now {state} at {}", now.format("%H:%M:%S")),
            ));
            self.last_state = Some(state);
        }

        match state {
            ScheduleState::OffHours | ScheduleState::OnBreak => {
                let reason = if state == ScheduleState::OffHours {
                    CloseReason::OffHours
                } else {
                    CloseReason::OnBreak
                };
                self.session.close_application(reason).await;
                let poll = self.session.timing().off_hours_poll();
                tracing::debug!(state = %state, poll_secs = poll.as_secs(), "Idle until next check");
                self.session.pause(poll).await?;
            }
            ScheduleState::Working => {
                self.session.work().await?;
                let pause = self.session.between_activity_pause()?;
                tracing::debug!(pause_secs = pause.as_secs(), "Pausing between activities");
                self.session.pause(pause).await?;
            }
        }

        Ok(state)
    }

    async fn close_bounded(&mut self, reason: CloseReason) {
        let timeout = self.session.timing().shutdown_timeout();
        let app = self.session.state().current_app().map(String::from);
        if tokio::time::timeout(timeout, self.session.close_application(reason))
            .await
            .is_err()
        {
            tracing::warn!(
                app = app.as_deref().unwrap_or("-"),
                timeout_secs = timeout.as_secs(),
                "Close command did not finish in time, abandoning it"
            );
        }
    }
}
