//! The activity session state machine.
//!
//! Tracks the one application the simulated user has open, decides when to
//! switch to another, and drives the executor through the catalog's scripts.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use uuid::Uuid;

use super::events::{AgentEventType, EventPublisher};
use super::timing::TimingConfig;
use super::{AgentError, Clock, ShutdownSignal, SystemClock};
use crate::catalog::{ActivityCatalog, PrimitiveAction};
use crate::executors::Executor;

/// Why an application was closed. Recorded in the log only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Switching,
    OffHours,
    OnBreak,
    Shutdown,
    Fault,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CloseReason::Switching => "switching applications",
            CloseReason::OffHours => "work time ended",
            CloseReason::OnBreak => "break time",
            CloseReason::Shutdown => "agent stopping",
            CloseReason::Fault => "scheduler fault",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone)]
struct OpenApp {
    name: String,
    started_at: NaiveDateTime,
    session_id: String,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    current: Option<OpenApp>,
    target_session_length: Duration,
}

impl SessionState {
    pub fn current_app(&self) -> Option<&str> {
        self.current.as_ref().map(|app| app.name.as_str())
    }

    pub fn app_start_time(&self) -> Option<NaiveDateTime> {
        self.current.as_ref().map(|app| app.started_at)
    }

    pub fn target_session_length(&self) -> Duration {
        self.target_session_length
    }

    fn session_id(&self) -> Option<&str> {
        self.current.as_ref().map(|app| app.session_id.as_str())
    }
}

pub struct ActivitySession {
    applications: Vec<String>,
    catalog: Arc<ActivityCatalog>,
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    timing: TimingConfig,
    events: EventPublisher,
    shutdown: ShutdownSignal,
    rng: StdRng,
    state: SessionState,
}

impl ActivitySession {
    pub fn new(
        applications: Vec<String>,
        catalog: Arc<ActivityCatalog>,
        executor: Arc<dyn Executor>,
        timing: TimingConfig,
        events: EventPublisher,
        shutdown: ShutdownSignal,
    ) -> Result<Self, AgentError> {
        let mut rng = StdRng::from_entropy();
        let target_session_length = timing.session_length.sample("session_length", &mut rng)?;
        Ok(Self {
            applications,
            catalog,
            executor,
            clock: Arc::new(SystemClock),
            timing,
            events,
            shutdown,
            rng,
            state: SessionState {
                current: None,
                target_session_length,
            },
        })
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[cfg(test)]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    /// Sleep unless the stop signal fires first.
    pub async fn pause(&mut self, duration: Duration) -> Result<(), AgentError> {
        self.shutdown.pause(duration).await
    }

    /// Draw the pause that separates two activities.
    pub fn between_activity_pause(&mut self) -> Result<Duration, AgentError> {
        Ok(self
            .timing
            .between_activity_pause
            .sample("between_activity_pause", &mut self.rng)?)
    }

    pub fn should_switch_app(&self) -> bool {
        match self.state.app_start_time() {
            None => true,
            Some(started_at) => {
                // A clock that moved backwards counts as no time elapsed.
                let elapsed = (self.clock.now() - started_at).to_std().unwrap_or_default();
                elapsed >= self.state.target_session_length()
            }
        }
    }

    /// Pick the next application, avoiding the current one when there is a choice.
    pub fn next_app(&mut self) -> Option<String> {
        if self.applications.is_empty() {
            return None;
        }

        let current = self.state.current_app();
        let others: Vec<&String> = self
            .applications
            .iter()
            .filter(|app| Some(app.as_str()) != current)
            .collect();

        let picked = if others.is_empty() {
            self.applications.choose(&mut self.rng)
        } else {
            others.choose(&mut self.rng).copied()
        };
        picked.cloned()
    }

    /// Open `app_name`, closing whatever is open first.
    ///
    /// Returns `false` without touching state when the catalog has no profile
    /// for the application. The open command's outcome is logged but not
    /// checked: the application counts as open once the command was issued.
    pub async fn open_application(&mut self, app_name: &str) -> Result<bool, AgentError> {
        let catalog = Arc::clone(&self.catalog);
        let Some(profile) = catalog.lookup(app_name) else {
            self.events.emit(
                self.events
                    .event(AgentEventType::LookupMiss, "No profile for application, cannot open")
                    .with_app(app_name),
            );
            return Ok(false);
        };

        if self.state.current.is_some() {
            self.close_application(CloseReason::Switching).await;
        }

        let target = self.timing.session_length.sample("session_length", &mut self.rng)?;
        let session_id = Uuid::new_v4().to_string();

        self.events.emit(
            self.events
                .event(
                    AgentEventType::AppOpened,
                    format!(
                        "Opening application (session target {}s)",
                        target.as_secs()
                    ),
                )
                .with_app(app_name)
                .with_session(Some(&session_id)),
        );

        // The session starts when the open is issued, not when it returns.
        let started_at = self.clock.now();
        let action = PrimitiveAction::shell(profile.open_command.clone());
        self.run_action(app_name, Some(&session_id), &action).await;

        self.state.current = Some(OpenApp {
            name: app_name.to_string(),
            started_at,
            session_id,
        });
        self.state.target_session_length = target;
        Ok(true)
    }

    /// Close the current application. A no-op when nothing is open.
    ///
    /// State is cleared before the close command runs, so a caller that gives
    /// up waiting on the command never sees a half-closed session.
    pub async fn close_application(&mut self, reason: CloseReason) {
        let Some(open) = self.state.current.take() else {
            return;
        };

        let catalog = Arc::clone(&self.catalog);
        let Some(profile) = catalog.lookup(&open.name) else {
            self.events.emit(
                self.events
                    .event(
                        AgentEventType::LookupMiss,
                        format!("No profile for application, dropping it without a close command ({reason})"),
                    )
                    .with_app(&open.name)
                    .with_session(Some(&open.session_id)),
            );
            return;
        };

        self.events.emit(
            self.events
                .event(AgentEventType::AppClosed, format!("Closing application: {reason}"))
                .with_app(&open.name)
                .with_session(Some(&open.session_id)),
        );

        let action = PrimitiveAction::shell(profile.close_command.clone());
        self.run_action(&open.name, Some(&open.session_id), &action).await;
    }

    /// Run one randomly chosen activity script in the current application.
    ///
    /// Every step runs regardless of earlier failures, with a jittered pause
    /// after each. Returns the activity description, or `None` when there was
    /// nothing to simulate.
    pub async fn simulate_activity(&mut self) -> Result<Option<String>, AgentError> {
        let Some(app_name) = self.state.current_app().map(String::from) else {
            return Ok(None);
        };
        let session_id = self.state.session_id().map(String::from);

        let catalog = Arc::clone(&self.catalog);
        let Some(profile) = catalog.lookup(&app_name) else {
            self.events.emit(
                self.events
                    .event(AgentEventType::LookupMiss, "No profile for application, nothing to simulate")
                    .with_app(&app_name),
            );
            return Ok(None);
        };

        let Some(activity) = profile.choose_activity(&mut self.rng) else {
            tracing::warn!(app = %app_name, "Application profile has no activities");
            return Ok(None);
        };

        self.events.emit(
            self.events
                .event(
                    AgentEventType::ActivityChosen,
                    format!("Simulating activity: {}", activity.description),
                )
                .with_app(&app_name)
                .with_session(session_id.as_deref())
                .with_description(&activity.description),
        );

        for step in &activity.steps {
            self.run_action(&app_name, session_id.as_deref(), step).await;
            let pause = self.timing.step_pause.sample("step_pause", &mut self.rng)?;
            self.pause(pause).await?;
        }

        Ok(Some(activity.description.clone()))
    }

    /// One working-time turn: switch applications if the session ran out,
    /// then simulate an activity in whatever is open.
    pub async fn work(&mut self) -> Result<(), AgentError> {
        if self.should_switch_app() {
            self.close_application(CloseReason::Switching).await;

            let pause = self
                .timing
                .between_app_pause
                .sample("between_app_pause", &mut self.rng)?;
            tracing::info!(pause_secs = pause.as_secs(), "Pausing between applications");
            self.pause(pause).await?;

            match self.next_app() {
                Some(next) => {
                    if self.open_application(&next).await? {
                        let warmup = self.timing.warmup.sample("warmup", &mut self.rng)?;
                        self.pause(warmup).await?;
                    }
                }
                None => tracing::warn!("No applications configured, staying idle"),
            }
        }

        if self.state.current.is_some() {
            self.simulate_activity().await?;
        }
        Ok(())
    }

    async fn run_action(&self, app: &str, session_id: Option<&str>, action: &PrimitiveAction) {
        let outcome = self.executor.execute(action).await;
        let (event_type, message) = if outcome.success {
            (
                AgentEventType::ActionCompleted,
                format!("SUCCESS (duration: {:.2}s)", outcome.duration.as_secs_f64()),
            )
        } else {
            (
                AgentEventType::ActionFailed,
                format!("COMMAND FAILED: {}", outcome.output),
            )
        };
        self.events.emit(
            self.events
                .event(event_type, message)
                .with_app(app)
                .with_session(session_id)
                .with_outcome(action, &outcome),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::events::AgentEvent;
    use crate::agent::shutdown_channel;
    use crate::agent::testing::{ManualClock, RecordingExecutor, at};
    use crate::agent::timing::JitterRange;
    use crate::catalog::{ActivityScript, ApplicationProfile};
    use chrono::TimeDelta;
    use tokio::sync::broadcast;

    fn profile(name: &str, steps: usize) -> ApplicationProfile {
        ApplicationProfile {
            name: name.to_string(),
            open_command: format!("open {name}"),
            close_command: format!("close {name}"),
            activities: vec![ActivityScript {
                description: format!("{name} work"),
                steps: (0..steps)
                    .map(|i| PrimitiveAction::shell(format!("{name} step {i}")))
                    .collect(),
            }],
        }
    }

    struct Harness {
        session: ActivitySession,
        executor: Arc<RecordingExecutor>,
        clock: Arc<ManualClock>,
        events: broadcast::Receiver<AgentEvent>,
    }

    fn harness_with(apps: &[&str], executor: RecordingExecutor, timing: TimingConfig) -> Harness {
        let catalog = Arc::new(ActivityCatalog::from_profiles(vec![
            profile("A", 3),
            profile("B", 2),
            profile("C", 1),
        ]));
        let executor = Arc::new(executor);
        let clock = Arc::new(ManualClock::new(at(10, 0)));
        let (tx, events) = broadcast::channel(256);
        // A dropped trigger never fires, so the session runs undisturbed.
        let (_, signal) = shutdown_channel();
        let session = ActivitySession::new(
            apps.iter().map(|a| a.to_string()).collect(),
            catalog,
            executor.clone(),
            timing,
            EventPublisher::new("tester", Some(tx)),
            signal,
        )
        .unwrap()
        .with_clock(clock.clone())
        .with_rng(StdRng::seed_from_u64(11));
        Harness {
            session,
            executor,
            clock,
            events,
        }
    }

    fn harness(apps: &[&str]) -> Harness {
        harness_with(apps, RecordingExecutor::new(), TimingConfig::immediate())
    }

    fn drain(rx: &mut broadcast::Receiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn close_with_nothing_open_is_a_noop() {
        let mut h = harness(&["A", "B"]);
        let target_before = h.session.state().target_session_length();
        h.session.close_application(CloseReason::Switching).await;
        assert!(h.executor.calls().is_empty());
        assert!(h.session.state().current_app().is_none());
        assert_eq!(h.session.state().target_session_length(), target_before);
    }

    #[tokio::test]
    async fn session_start_is_taken_before_a_slow_open() {
        let clock = Arc::new(ManualClock::new(at(10, 0)));
        let executor = Arc::new(
            RecordingExecutor::new().advancing(clock.clone(), TimeDelta::minutes(3)),
        );
        let (_, signal) = shutdown_channel();
        let mut session = ActivitySession::new(
            vec!["A".to_string()],
            Arc::new(ActivityCatalog::from_profiles(vec![profile("A", 1)])),
            executor.clone(),
            TimingConfig::immediate(),
            EventPublisher::new("tester", None),
            signal,
        )
        .unwrap()
        .with_clock(clock.clone())
        .with_rng(StdRng::seed_from_u64(11));

        assert!(session.open_application("A").await.unwrap());
        assert_eq!(executor.commands(), vec!["open A"]);
        assert_eq!(clock.now(), at(10, 3));
        assert_eq!(session.state().app_start_time(), Some(at(10, 0)));
    }

    #[tokio::test]
    async fn open_sets_state_and_issues_open_command() {
        let mut h = harness(&["A", "B"]);
        assert!(h.session.open_application("A").await.unwrap());
        assert_eq!(h.session.state().current_app(), Some("A"));
        assert_eq!(h.session.state().app_start_time(), Some(at(10, 0)));
        assert_eq!(h.executor.commands(), vec!["open A"]);
    }

    #[tokio::test]
    async fn open_unknown_app_changes_nothing() {
        let mut h = harness(&["A", "Ghost"]);
        assert!(!h.session.open_application("Ghost").await.unwrap());
        assert!(h.session.state().current_app().is_none());
        assert!(h.executor.calls().is_empty());

        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| e.event_type == AgentEventType::LookupMiss));
    }

    #[tokio::test]
    async fn failed_open_still_counts_as_open() {
        let mut h = harness_with(
            &["A"],
            RecordingExecutor::failing_on(&["open A"]),
            TimingConfig::immediate(),
        );
        assert!(h.session.open_application("A").await.unwrap());
        assert_eq!(h.session.state().current_app(), Some("A"));
    }

    #[tokio::test]
    async fn opening_over_an_open_app_closes_it_first() {
        let mut h = harness(&["A", "B"]);
        h.session.open_application("A").await.unwrap();
        h.session.open_application("B").await.unwrap();
        assert_eq!(h.executor.commands(), vec!["open A", "close A", "open B"]);
        assert_eq!(h.session.state().current_app(), Some("B"));
    }

    #[tokio::test]
    async fn close_clears_state_and_issues_close_command() {
        let mut h = harness(&["A"]);
        h.session.open_application("A").await.unwrap();
        h.session.close_application(CloseReason::OnBreak).await;
        assert!(h.session.state().current_app().is_none());
        assert!(h.session.state().app_start_time().is_none());
        assert_eq!(h.executor.commands(), vec!["open A", "close A"]);

        let closed = drain(&mut h.events)
            .into_iter()
            .find(|e| e.event_type == AgentEventType::AppClosed)
            .unwrap();
        assert!(closed.message.contains("break time"));
    }

    #[tokio::test]
    async fn next_app_never_repeats_current_with_two_apps() {
        let mut h = harness(&["A", "B"]);
        h.session.open_application("A").await.unwrap();
        for _ in 0..100 {
            assert_eq!(h.session.next_app().as_deref(), Some("B"));
        }
    }

    #[tokio::test]
    async fn next_app_excludes_current_among_many() {
        let mut h = harness(&["A", "B", "C"]);
        h.session.open_application("B").await.unwrap();
        for _ in 0..100 {
            assert_ne!(h.session.next_app().as_deref(), Some("B"));
        }
    }

    #[tokio::test]
    async fn next_app_single_entry_falls_back_to_itself() {
        let mut h = harness(&["A"]);
        h.session.open_application("A").await.unwrap();
        assert_eq!(h.session.next_app().as_deref(), Some("A"));
    }

    #[test]
    fn next_app_with_empty_list_is_none() {
        let mut h = harness(&[]);
        assert!(h.session.next_app().is_none());
    }

    #[tokio::test]
    async fn should_switch_when_idle_or_session_expired() {
        let timing = TimingConfig {
            session_length: JitterRange::fixed(600.0),
            ..TimingConfig::immediate()
        };
        let mut h = harness_with(&["A", "B"], RecordingExecutor::new(), timing);
        assert!(h.session.should_switch_app());

        h.session.open_application("A").await.unwrap();
        assert_eq!(h.session.state().target_session_length(), Duration::from_secs(600));
        assert!(!h.session.should_switch_app());

        h.clock.advance(TimeDelta::seconds(599));
        assert!(!h.session.should_switch_app());

        h.clock.advance(TimeDelta::seconds(1));
        assert!(h.session.should_switch_app());
    }

    #[tokio::test]
    async fn clock_going_backwards_does_not_switch() {
        let timing = TimingConfig {
            session_length: JitterRange::fixed(600.0),
            ..TimingConfig::immediate()
        };
        let mut h = harness_with(&["A", "B"], RecordingExecutor::new(), timing);
        h.session.open_application("A").await.unwrap();
        h.clock.set(at(9, 0));
        assert!(!h.session.should_switch_app());
    }

    #[tokio::test]
    async fn session_length_is_redrawn_on_every_open() {
        let timing = TimingConfig {
            session_length: JitterRange::between(300.0, 900.0),
            ..TimingConfig::immediate()
        };
        let mut h = harness_with(&["A", "B"], RecordingExecutor::new(), timing);
        let mut lengths = Vec::new();
        for app in ["A", "B", "A", "B", "A", "B"] {
            h.session.open_application(app).await.unwrap();
            let length = h.session.state().target_session_length();
            assert!(length >= Duration::from_secs(300) && length <= Duration::from_secs(900));
            lengths.push(length);
        }
        lengths.dedup();
        assert!(lengths.len() > 1);
    }

    #[tokio::test]
    async fn failing_step_does_not_stop_the_script() {
        let mut h = harness_with(
            &["A"],
            RecordingExecutor::failing_on(&["A step 0", "A step 1"]),
            TimingConfig::immediate(),
        );
        h.session.open_application("A").await.unwrap();
        drain(&mut h.events);

        let description = h.session.simulate_activity().await.unwrap();
        assert_eq!(description.as_deref(), Some("A work"));
        assert_eq!(
            h.executor.commands(),
            vec!["open A", "A step 0", "A step 1", "A step 2"]
        );

        let events = drain(&mut h.events);
        let failed = events
            .iter()
            .filter(|e| e.event_type == AgentEventType::ActionFailed)
            .count();
        let completed = events
            .iter()
            .filter(|e| e.event_type == AgentEventType::ActionCompleted)
            .count();
        assert_eq!(failed, 2);
        assert_eq!(completed, 1);
    }

    #[tokio::test]
    async fn simulate_without_open_app_does_nothing() {
        let mut h = harness(&["A"]);
        assert!(h.session.simulate_activity().await.unwrap().is_none());
        assert!(h.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn activity_events_carry_description_and_session() {
        let mut h = harness(&["B"]);
        h.session.open_application("B").await.unwrap();
        h.session.simulate_activity().await.unwrap();

        let events = drain(&mut h.events);
        let opened = events
            .iter()
            .find(|e| e.event_type == AgentEventType::AppOpened)
            .unwrap();
        let chosen = events
            .iter()
            .find(|e| e.event_type == AgentEventType::ActivityChosen)
            .unwrap();
        assert_eq!(chosen.description.as_deref(), Some("B work"));
        assert_eq!(chosen.app.as_deref(), Some("B"));
        assert!(opened.session_id.is_some());
        assert_eq!(chosen.session_id, opened.session_id);
    }

    #[tokio::test]
    async fn work_from_idle_opens_and_simulates() {
        let mut h = harness(&["C"]);
        h.session.work().await.unwrap();
        assert_eq!(h.executor.commands(), vec!["open C", "C step 0"]);
        assert_eq!(h.session.state().current_app(), Some("C"));
    }

    #[tokio::test]
    async fn work_inside_session_only_simulates() {
        let timing = TimingConfig {
            session_length: JitterRange::fixed(600.0),
            ..TimingConfig::immediate()
        };
        let mut h = harness_with(&["C", "B"], RecordingExecutor::new(), timing);
        h.session.open_application("C").await.unwrap();
        h.session.work().await.unwrap();
        assert_eq!(h.executor.commands(), vec!["open C", "C step 0"]);
    }

    #[tokio::test]
    async fn work_after_expiry_switches_to_the_other_app() {
        let timing = TimingConfig {
            session_length: JitterRange::fixed(60.0),
            ..TimingConfig::immediate()
        };
        let mut h = harness_with(&["C", "B"], RecordingExecutor::new(), timing);
        h.session.open_application("C").await.unwrap();
        h.clock.advance(TimeDelta::seconds(61));
        h.session.work().await.unwrap();
        assert_eq!(
            h.executor.commands(),
            vec!["open C", "close C", "open B", "B step 0", "B step 1"]
        );
    }

    #[tokio::test]
    async fn work_with_no_apps_stays_idle() {
        let mut h = harness(&[]);
        h.session.work().await.unwrap();
        assert!(h.executor.calls().is_empty());
        assert!(h.session.state().current_app().is_none());
    }

    #[tokio::test]
    async fn opens_and_closes_alternate_over_many_turns() {
        let mut h = harness(&["A", "B", "C"]);
        for _ in 0..25 {
            h.session.work().await.unwrap();
        }
        let mut open: Option<String> = None;
        for command in h.executor.commands() {
            if let Some(app) = command.strip_prefix("open ") {
                assert!(open.is_none(), "opened {app} while {open:?} was open");
                open = Some(app.to_string());
            } else if let Some(app) = command.strip_prefix("close ") {
                assert_eq!(open.as_deref(), Some(app));
                open = None;
            }
        }
    }

    #[tokio::test]
    async fn invalid_timing_surfaces_as_error() {
        let timing = TimingConfig {
            between_app_pause: JitterRange::between(5.0, 1.0),
            ..TimingConfig::immediate()
        };
        let mut h = harness_with(&["A"], RecordingExecutor::new(), timing);
        let err = h.session.work().await.unwrap_err();
        assert!(matches!(err, AgentError::Timing(_)));
    }
}
