use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Upper bound for every configured duration: one week.
pub const MAX_PAUSE_SECS: f64 = 7.0 * 24.0 * 3600.0;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{name} range is invalid: min={min}s, max={max}s")]
pub struct InvalidRange {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
}

/// Uniform range of seconds a pause is drawn from. `min == max` is a fixed pause.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JitterRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl JitterRange {
    pub const fn between(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    pub const fn fixed(secs: f64) -> Self {
        Self::between(secs, secs)
    }

    pub fn check(&self, name: &'static str) -> Result<(), InvalidRange> {
        let valid = self.min_secs.is_finite()
            && self.max_secs.is_finite()
            && self.min_secs >= 0.0
            && self.min_secs <= self.max_secs
            && self.max_secs <= MAX_PAUSE_SECS;
        if valid {
            Ok(())
        } else {
            Err(InvalidRange {
                name,
                min: self.min_secs,
                max: self.max_secs,
            })
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, name: &'static str, rng: &mut R) -> Result<Duration, InvalidRange> {
        self.check(name)?;
        let secs = if self.min_secs == self.max_secs {
            self.min_secs
        } else {
            rng.gen_range(self.min_secs..=self.max_secs)
        };
        Ok(Duration::from_secs_f64(secs))
    }
}

/// Independent jitter for every suspension point of the agent loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub session_length: JitterRange,
    pub between_app_pause: JitterRange,
    pub warmup: JitterRange,
    pub step_pause: JitterRange,
    pub between_activity_pause: JitterRange,
    pub off_hours_poll_secs: f64,
    pub shutdown_timeout_secs: f64,
    /// Limit on a single shell or typing command.
    pub command_timeout_secs: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            session_length: JitterRange::between(300.0, 900.0),
            between_app_pause: JitterRange::between(30.0, 120.0),
            warmup: JitterRange::fixed(5.0),
            step_pause: JitterRange::between(1.0, 3.0),
            between_activity_pause: JitterRange::between(10.0, 60.0),
            off_hours_poll_secs: 300.0,
            shutdown_timeout_secs: 30.0,
            command_timeout_secs: 300.0,
        }
    }
}

impl TimingConfig {
    /// Everything zero. Used to drive the loop without real waiting.
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            session_length: JitterRange::fixed(0.0),
            between_app_pause: JitterRange::fixed(0.0),
            warmup: JitterRange::fixed(0.0),
            step_pause: JitterRange::fixed(0.0),
            between_activity_pause: JitterRange::fixed(0.0),
            off_hours_poll_secs: 0.0,
            shutdown_timeout_secs: 5.0,
            command_timeout_secs: 5.0,
        }
    }

    pub fn validate(&self) -> Result<(), InvalidRange> {
        self.session_length.check("session_length")?;
        self.between_app_pause.check("between_app_pause")?;
        self.warmup.check("warmup")?;
        self.step_pause.check("step_pause")?;
        self.between_activity_pause.check("between_activity_pause")?;
        JitterRange::fixed(self.off_hours_poll_secs).check("off_hours_poll_secs")?;
        JitterRange::fixed(self.shutdown_timeout_secs).check("shutdown_timeout_secs")?;
        JitterRange::fixed(self.command_timeout_secs).check("command_timeout_secs")?;
        Ok(())
    }

    pub fn off_hours_poll(&self) -> Duration {
        bounded_secs(self.off_hours_poll_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        bounded_secs(self.shutdown_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        bounded_secs(self.command_timeout_secs)
    }
}

/// Clamp into `0..=MAX_PAUSE_SECS`; NaN counts as zero.
fn bounded_secs(secs: f64) -> Duration {
    Duration::from_secs_f64(secs.max(0.0).min(MAX_PAUSE_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn samples_stay_inside_range() {
        let range = JitterRange::between(1.0, 3.0);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let d = range.sample("step_pause", &mut rng).unwrap();
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(3));
        }
    }

    #[test]
    fn samples_are_not_constant() {
        let range = JitterRange::between(300.0, 900.0);
        let mut rng = StdRng::seed_from_u64(3);
        let first = range.sample("session_length", &mut rng).unwrap();
        let varied = (0..20).any(|_| range.sample("session_length", &mut rng).unwrap() != first);
        assert!(varied);
    }

    #[test]
    fn fixed_range_is_exact() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            JitterRange::fixed(5.0).sample("warmup", &mut rng).unwrap(),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn inverted_range_is_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = JitterRange::between(10.0, 1.0)
            .sample("between_app_pause", &mut rng)
            .unwrap_err();
        assert_eq!(err.name, "between_app_pause");
        assert_eq!(err.to_string(), "between_app_pause range is invalid: min=10s, max=1s");
    }

    #[test]
    fn negative_and_nan_bounds_are_rejected() {
        assert!(JitterRange::between(-1.0, 1.0).check("x").is_err());
        assert!(JitterRange::between(0.0, f64::NAN).check("x").is_err());
    }

    #[test]
    fn defaults_match_office_rhythm() {
        let timing = TimingConfig::default();
        assert!(timing.validate().is_ok());
        assert_eq!(timing.session_length, JitterRange::between(300.0, 900.0));
        assert_eq!(timing.off_hours_poll(), Duration::from_secs(300));
        assert_eq!(timing.shutdown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_timing_fills_defaults() {
        let timing: TimingConfig = serde_json::from_str(
            r#"{ "step_pause": { "min_secs": 0.5, "max_secs": 1.0 }, "off_hours_poll_secs": 60 }"#,
        )
        .unwrap();
        assert_eq!(timing.step_pause, JitterRange::between(0.5, 1.0));
        assert_eq!(timing.off_hours_poll(), Duration::from_secs(60));
        assert_eq!(timing.warmup, JitterRange::fixed(5.0));
    }

    #[test]
    fn huge_values_are_rejected_not_panicking() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = JitterRange::between(1.0, 1e30)
            .sample("session_length", &mut rng)
            .unwrap_err();
        assert_eq!(err.name, "session_length");

        let timing = TimingConfig {
            off_hours_poll_secs: 1e30,
            ..TimingConfig::default()
        };
        assert_eq!(timing.validate().unwrap_err().name, "off_hours_poll_secs");
        // Accessors saturate even when validation was skipped.
        assert_eq!(timing.off_hours_poll(), Duration::from_secs_f64(MAX_PAUSE_SECS));
    }

    #[test]
    fn one_week_is_the_longest_allowed_pause() {
        assert!(JitterRange::fixed(MAX_PAUSE_SECS).check("warmup").is_ok());
        assert!(JitterRange::fixed(MAX_PAUSE_SECS + 1.0).check("warmup").is_err());
    }

    #[test]
    fn command_timeout_is_configurable() {
        let timing: TimingConfig = serde_json::from_str(r#"{ "command_timeout_secs": 20 }"#).unwrap();
        assert_eq!(timing.command_timeout(), Duration::from_secs(20));
        assert_eq!(TimingConfig::default().command_timeout(), Duration::from_secs(300));

        let bad = TimingConfig {
            command_timeout_secs: f64::NAN,
            ..TimingConfig::default()
        };
        assert_eq!(bad.validate().unwrap_err().name, "command_timeout_secs");
        assert_eq!(bad.command_timeout(), Duration::ZERO);
    }

    #[test]
    fn validate_names_the_bad_field() {
        let timing = TimingConfig {
            off_hours_poll_secs: -5.0,
            ..TimingConfig::default()
        };
        assert_eq!(timing.validate().unwrap_err().name, "off_hours_poll_secs");
    }
}
