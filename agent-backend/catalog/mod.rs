pub mod builtin;

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Longest pause a single script step may ask for.
pub const MAX_SLEEP_SECS: f64 = 3600.0;

fn is_valid_sleep(secs: f64) -> bool {
    secs.is_finite() && (0.0..=MAX_SLEEP_SECS).contains(&secs)
}

/// The smallest unit of simulated input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrimitiveAction {
    RunShell {
        command: String,
    },
    TypeText {
        text: String,
    },
    Sleep {
        #[serde(rename = "secs", with = "secs")]
        duration: Duration,
    },
}

impl PrimitiveAction {
    pub fn shell(command: impl Into<String>) -> Self {
        PrimitiveAction::RunShell {
            command: command.into(),
        }
    }

    pub fn type_text(text: impl Into<String>) -> Self {
        PrimitiveAction::TypeText { text: text.into() }
    }

    pub fn sleep_secs(secs: f64) -> Self {
        PrimitiveAction::Sleep {
            duration: Duration::from_secs_f64(secs.max(0.0).min(MAX_SLEEP_SECS)),
        }
    }

    /// Convert a plain-string profile step into a structured action.
    ///
    /// `sleep N` and `type: text` are recognized, as is the common
    /// `xdotool type 'text'` form. Everything else runs through the shell.
    pub fn from_legacy(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let Some(text) = trimmed.strip_prefix("type:") {
            return PrimitiveAction::type_text(text.trim());
        }

        if let Some(arg) = trimmed.strip_prefix("sleep ") {
            if let Ok(secs) = arg.trim().parse::<f64>() {
                if is_valid_sleep(secs) {
                    return PrimitiveAction::sleep_secs(secs);
                }
            }
        }

        if let Some(arg) = trimmed.strip_prefix("xdotool type ") {
            if let Some(text) = unquote(arg.trim()) {
                return PrimitiveAction::type_text(text);
            }
        }

        PrimitiveAction::shell(trimmed)
    }

    /// Short human-readable rendering used in logs and events.
    pub fn summary(&self) -> String {
        match self {
            PrimitiveAction::RunShell { command } => command.clone(),
            PrimitiveAction::TypeText { text } => format!("type: {text}"),
            PrimitiveAction::Sleep { duration } => format!("sleep {:.1}s", duration.as_secs_f64()),
        }
    }
}

/// Strip one pair of matching single or double quotes with no inner quote of the same kind.
fn unquote(arg: &str) -> Option<&str> {
    for quote in ['\'', '"'] {
        if let Some(inner) = arg.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            if !inner.contains(quote) {
                return Some(inner);
            }
        }
    }
    None
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !super::is_valid_sleep(secs) {
            return Err(serde::de::Error::custom(format!(
                "sleep duration must be between 0 and {} seconds, got {secs}",
                super::MAX_SLEEP_SECS
            )));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

/// One believable in-app behavior: an ordered list of actions.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityScript {
    pub description: String,
    pub steps: Vec<PrimitiveAction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationProfile {
    pub name: String,
    pub open_command: String,
    pub close_command: String,
    pub activities: Vec<ActivityScript>,
}

impl ApplicationProfile {
    /// Uniform pick among the profile's scripts. Repeats are allowed.
    pub fn choose_activity<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&ActivityScript> {
        self.activities.choose(rng)
    }
}

// --- On-disk profile overrides (`custom_commands` in an agent profile) ---

/// A step as written in a profile: either a tagged action or a legacy string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepSpec {
    Action(PrimitiveAction),
    Legacy(String),
}

impl StepSpec {
    pub fn into_action(self) -> PrimitiveAction {
        match self {
            StepSpec::Action(action) => action,
            StepSpec::Legacy(raw) => PrimitiveAction::from_legacy(&raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySpec {
    pub description: String,
    #[serde(alias = "steps")]
    pub commands: Vec<StepSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSpec {
    pub open: String,
    pub close: String,
    #[serde(default)]
    pub activities: Vec<ActivitySpec>,
}

impl ProfileSpec {
    pub fn into_profile(self, name: impl Into<String>) -> ApplicationProfile {
        ApplicationProfile {
            name: name.into(),
            open_command: self.open,
            close_command: self.close,
            activities: self
                .activities
                .into_iter()
                .map(|activity| ActivityScript {
                    description: activity.description,
                    steps: activity.commands.into_iter().map(StepSpec::into_action).collect(),
                })
                .collect(),
        }
    }
}

/// Immutable application-name to profile lookup.
///
/// Overrides are merged once at construction; lookups never consult them
/// separately.
#[derive(Debug, Clone)]
pub struct ActivityCatalog {
    profiles: HashMap<String, ApplicationProfile>,
}

impl ActivityCatalog {
    pub fn builtin() -> Self {
        Self::from_profiles(builtin::profiles())
    }

    /// Built-in profiles with `overrides` replacing any profile of the same name.
    pub fn with_overrides(overrides: impl IntoIterator<Item = ApplicationProfile>) -> Self {
        let mut catalog = Self::builtin();
        for profile in overrides {
            tracing::debug!(app = %profile.name, "custom profile overrides catalog entry");
            catalog.insert(profile);
        }
        catalog
    }

    pub fn from_profiles(profiles: impl IntoIterator<Item = ApplicationProfile>) -> Self {
        let mut catalog = Self {
            profiles: HashMap::new(),
        };
        for profile in profiles {
            catalog.insert(profile);
        }
        catalog
    }

    fn insert(&mut self, profile: ApplicationProfile) {
        if profile.activities.is_empty() {
            tracing::warn!(app = %profile.name, "application profile has no activities");
        }
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn lookup(&self, name: &str) -> Option<&ApplicationProfile> {
        self.profiles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Application names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
