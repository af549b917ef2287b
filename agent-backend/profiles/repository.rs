use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;

use super::AgentConfig;

/// Where a loaded profile came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileSource {
    File(PathBuf),
    BuiltinDefault,
}

impl fmt::Display for ProfileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileSource::File(path) => write!(f, "{}", path.display()),
            ProfileSource::BuiltinDefault => f.write_str("built-in default"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedProfile {
    pub config: AgentConfig,
    pub source: ProfileSource,
}

/// A profile file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Path of the profile called `name`, if any search directory has one.
    async fn find(&self, name: &str) -> Option<PathBuf>;
    /// Resolve a profile, falling back to any profile on disk and then to the
    /// built-in default.
    async fn load(&self, name: Option<&str>) -> Result<LoadedProfile>;
    async fn list(&self) -> Vec<ProfileEntry>;
    /// Write the sample profile and return where it landed.
    async fn save_sample(&self, name: &str) -> Result<PathBuf>;
}
