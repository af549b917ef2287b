use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::AgentConfig;
use super::repository::{LoadedProfile, ProfileEntry, ProfileRepository, ProfileSource};

pub const DEFAULT_CONFIG_DIR: &str = "/opt/linux_agent/configs";
pub const SYSTEM_CONFIG_DIR: &str = "/etc/activity_agent";

const PROFILE_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// Profiles stored as JSON (or YAML) files across an ordered list of
/// directories. Earlier directories win.
pub struct FileProfileRepository {
    search_dirs: Vec<PathBuf>,
    sample_dirs: Vec<PathBuf>,
}

/// `~/.config/activity_agent`, when a home directory is known.
pub fn user_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("activity_agent"))
}

impl FileProfileRepository {
    pub fn new(search_dirs: Vec<PathBuf>, sample_dirs: Vec<PathBuf>) -> Self {
        Self {
            search_dirs,
            sample_dirs,
        }
    }

    /// The standard layout: `extra_dir` first, then the install, system and
    /// user directories. Samples go to the user directory, else the install one.
    pub fn standard(extra_dir: Option<PathBuf>) -> Self {
        let user_dir = user_config_dir();

        let mut search_dirs: Vec<PathBuf> = extra_dir.into_iter().collect();
        search_dirs.push(PathBuf::from(DEFAULT_CONFIG_DIR));
        search_dirs.push(PathBuf::from(SYSTEM_CONFIG_DIR));
        search_dirs.extend(user_dir.clone());

        let mut sample_dirs: Vec<PathBuf> = user_dir.into_iter().collect();
        sample_dirs.push(PathBuf::from(DEFAULT_CONFIG_DIR));

        Self::new(search_dirs, sample_dirs)
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    fn candidate_names(name: &str) -> Vec<String> {
        let stems = [
            name.to_string(),
            format!("{name}_config"),
            format!("user_{name}"),
        ];
        let mut names = Vec::with_capacity(stems.len() * PROFILE_EXTENSIONS.len());
        for ext in PROFILE_EXTENSIONS {
            for stem in &stems {
                names.push(format!("{stem}.{ext}"));
            }
        }
        names
    }

    /// Profile files in `dir`, sorted by file name. A missing directory is empty.
    fn profile_files(dir: &Path) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_profile_file(path))
            .collect();
        files.sort();
        files
    }

    fn discover(&self) -> Option<LoadedProfile> {
        for dir in &self.search_dirs {
            for path in Self::profile_files(dir) {
                match read_profile(&path) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "Auto-loaded profile");
                        return Some(LoadedProfile {
                            config,
                            source: ProfileSource::File(path),
                        });
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %format!("{e:#}"), "Skipping unreadable profile");
                    }
                }
            }
        }
        None
    }
}

fn is_profile_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| PROFILE_EXTENSIONS.contains(&ext))
}

fn is_yaml(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"))
}

/// Read a profile file and merge it over the default profile.
pub fn read_profile(path: &Path) -> Result<AgentConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile {}", path.display()))?;
    let raw: Value = if is_yaml(path) {
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse YAML profile {}", path.display()))?
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse JSON profile {}", path.display()))?
    };
    AgentConfig::from_value(raw).with_context(|| format!("invalid profile {}", path.display()))
}

#[async_trait]
impl ProfileRepository for FileProfileRepository {
    async fn find(&self, name: &str) -> Option<PathBuf> {
        let candidates = Self::candidate_names(name);
        for dir in &self.search_dirs {
            for candidate in &candidates {
                let path = dir.join(candidate);
                if path.is_file() {
                    tracing::debug!(path = %path.display(), "Found profile file");
                    return Some(path);
                }
            }
        }
        None
    }

    async fn load(&self, name: Option<&str>) -> Result<LoadedProfile> {
        if let Some(name) = name {
            match self.find(name).await {
                Some(path) => {
                    let config = read_profile(&path)?;
                    tracing::info!(path = %path.display(), username = %config.username, "Loaded profile");
                    return Ok(LoadedProfile {
                        config,
                        source: ProfileSource::File(path),
                    });
                }
                None => {
                    tracing::warn!(profile = %name, "Profile not found, looking for any profile on disk");
                }
            }
        }

        if let Some(loaded) = self.discover() {
            return Ok(loaded);
        }

        tracing::info!("No profile files found, using the built-in default");
        Ok(LoadedProfile {
            config: AgentConfig::builtin_default()?,
            source: ProfileSource::BuiltinDefault,
        })
    }

    async fn list(&self) -> Vec<ProfileEntry> {
        let mut entries = Vec::new();
        for dir in &self.search_dirs {
            for path in Self::profile_files(dir) {
                let size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                entries.push(ProfileEntry {
                    name,
                    path,
                    size_bytes,
                });
            }
        }
        entries
    }

    async fn save_sample(&self, name: &str) -> Result<PathBuf> {
        let content = serde_json::to_string_pretty(&AgentConfig::sample_value())?;

        let mut last_error = None;
        for dir in &self.sample_dirs {
            let path = dir.join(format!("{name}.json"));
            match write_atomic(dir, &path, &content) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "Saved sample profile");
                    return Ok(path);
                }
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Cannot write sample profile here");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e.context("no writable profile directory")),
            None => anyhow::bail!("no profile directory configured"),
        }
    }
}

fn write_atomic(dir: &Path, path: &Path, content: &str) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, content)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to move profile into {}", path.display()))?;
    Ok(())
}
