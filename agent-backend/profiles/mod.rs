pub mod file_repository;
pub mod repository;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::agent::timing::TimingConfig;
use crate::catalog::{ActivityCatalog, ProfileSpec};
use crate::schedule::WorkSchedule;

/// Keys a profile is expected to set itself. Missing ones fall back to the
/// default profile with a warning.
pub const REQUIRED_FIELDS: [&str; 3] = ["username", "work_schedule", "applications_used"];

/// One simulated user: identity, office hours, and the applications they use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub operating_system: String,
    /// Free text, informational only.
    #[serde(default)]
    pub activity_pattern: String,
    pub work_schedule: WorkSchedule,
    pub applications_used: Vec<String>,
    /// Per-application overrides of the built-in catalog, keyed by app name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_commands: BTreeMap<String, ProfileSpec>,
    /// Run shell steps as this OS user via `sudo -u`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as: Option<String>,
    #[serde(default)]
    pub timing: TimingConfig,
}

impl AgentConfig {
    /// The built-in profile used when no file is found, as raw JSON so that
    /// file contents can be merged over it key by key.
    pub fn default_value() -> Value {
        json!({
            "user_id": "USR0012345",
            "username": "john_doe",
            "full_name": "John Doe",
            "role": "Junior Developer",
            "work_schedule": {
                "start_time": "09:00",
                "end_time": "18:00",
                "breaks": [
                    { "start": "13:00", "duration_minutes": 60 }
                ]
            },
            "operating_system": "Linux Ubuntu 22.04",
            "applications_used": [
                "Visual Studio Code",
                "Google Chrome",
                "Slack",
                "Docker Desktop"
            ],
            "activity_pattern": "Regular office hours with lunch break",
            "department": "Development",
            "location": "Headquarters"
        })
    }

    pub fn builtin_default() -> Result<Self> {
        serde_json::from_value(Self::default_value()).context("built-in default profile is invalid")
    }

    /// Shallow-merge `raw` over the default profile and deserialize the result.
    ///
    /// Each top-level key in `raw` replaces the default's key wholesale; nested
    /// objects such as `work_schedule` are not merged field by field.
    pub fn from_value(raw: Value) -> Result<Self> {
        let Value::Object(overrides) = raw else {
            anyhow::bail!("profile must be a JSON object");
        };

        for field in REQUIRED_FIELDS {
            if !overrides.contains_key(field) {
                tracing::warn!(field, "profile is missing a required field, using default");
            }
        }

        let mut merged = Self::default_value();
        if let Value::Object(base) = &mut merged {
            base.extend(overrides);
        }

        let config: Self = serde_json::from_value(merged).context("profile has invalid fields")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            anyhow::bail!("username must not be empty");
        }
        if self.applications_used.is_empty() {
            tracing::warn!(username = %self.username, "profile lists no applications, the agent will stay idle");
        }
        self.timing
            .validate()
            .with_context(|| format!("invalid timing in profile for {}", self.username))?;
        Ok(())
    }

    /// Built-in catalog with this profile's `custom_commands` layered on top.
    pub fn catalog(&self) -> ActivityCatalog {
        ActivityCatalog::with_overrides(
            self.custom_commands
                .iter()
                .map(|(name, spec)| spec.clone().into_profile(name.clone())),
        )
    }

    /// Applications the catalog has no profile for. These are skipped at open time.
    pub fn unknown_applications<'a>(&'a self, catalog: &ActivityCatalog) -> Vec<&'a str> {
        self.applications_used
            .iter()
            .map(String::as_str)
            .filter(|app| !catalog.contains(app))
            .collect()
    }

    /// The profile written by `sample-config`.
    pub fn sample_value() -> Value {
        json!({
            "user_id": "USR0067890",
            "username": "alice_smith",
            "full_name": "Alice Smith",
            "role": "Senior Developer",
            "work_schedule": {
                "start_time": "08:30",
                "end_time": "17:30",
                "breaks": [
                    { "start": "12:30", "duration_minutes": 45 },
                    { "start": "15:30", "duration_minutes": 15 }
                ]
            },
            "operating_system": "Linux Ubuntu 22.04",
            "applications_used": [
                "Visual Studio Code",
                "Firefox",
                "Slack",
                "Docker Desktop",
                "Terminal"
            ],
            "activity_pattern": "Early start with coffee breaks",
            "department": "Engineering",
            "location": "Remote",
            "custom_commands": {
                "Terminal": {
                    "open": "setsid -f gnome-terminal >/dev/null 2>&1",
                    "close": "pkill -f gnome-terminal",
                    "activities": [
                        {
                            "description": "Checking system status",
                            "commands": [
                                "uptime",
                                "sleep 5",
                                "df -h"
                            ]
                        }
                    ]
                }
            }
        })
    }
}
