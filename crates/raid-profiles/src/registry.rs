//! Profile registry over a directory of YAML files
//!
//! Reads are lock-free; saves serialise under a registry-level mutex so two
//! dynamic creations cannot interleave a partial write.

use crate::profile::Profile;
use raid_core::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Fixed in-container path a worker loads its own profile from.
pub const CONTAINER_PROFILE_FILE: &str = "profile.yaml";

pub struct ProfileRegistry {
    profiles_dir: PathBuf,
    /// Tool names resolvable at load time; empty disables tool validation.
    known_tools: Vec<String>,
    write_lock: Mutex<()>,
}

impl ProfileRegistry {
    pub fn new(profiles_dir: impl AsRef<Path>) -> Self {
        Self {
            profiles_dir: profiles_dir.as_ref().to_path_buf(),
            known_tools: Vec::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_known_tools(mut self, tools: &[&str]) -> Self {
        self.known_tools = tools.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn profiles_dir(&self) -> &Path {
        &self.profiles_dir
    }

    /// Load a profile by name.
    ///
    /// Falls back to the fixed container path (`profile.yaml` in the
    /// profiles directory) so a worker can load itself inside its image,
    /// where only its own profile is present.
    pub fn load(&self, name: &str) -> Result<Profile> {
        let candidate = self.profiles_dir.join(format!("{name}.yaml"));
        let path = if candidate.exists() {
            candidate
        } else {
            let container = self.profiles_dir.join(CONTAINER_PROFILE_FILE);
            if container.exists() {
                container
            } else {
                return Err(Error::ProfileNotFound(name.to_string()));
            }
        };

        let profile = Profile::from_yaml_file(&path)?;
        let known: Vec<&str> = self.known_tools.iter().map(|s| s.as_str()).collect();
        profile.validate(&known)?;
        Ok(profile)
    }

    /// Save (overwrite) a profile. Overwrite confirmation is the caller's
    /// concern; the registry never prompts.
    pub fn save(&self, profile: &Profile) -> Result<()> {
        let known: Vec<&str> = self.known_tools.iter().map(|s| s.as_str()).collect();
        profile.validate(&known)?;

        let _guard = self.write_lock.lock().expect("registry write lock");
        std::fs::create_dir_all(&self.profiles_dir)?;
        let path = self.profiles_dir.join(format!("{}.yaml", profile.name));
        std::fs::write(&path, profile.to_yaml()?)?;
        Ok(())
    }

    /// Delete a profile file. Missing files are a no-op.
    pub fn remove(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().expect("registry write lock");
        let path = self.profiles_dir.join(format!("{name}.yaml"));
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of every profile file in the directory.
    pub fn list(&self) -> Vec<String> {
        let mut names = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.profiles_dir) else {
            return names;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "yaml").unwrap_or(false) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        names
    }

    /// Load every profile, skipping (and logging) unparseable files.
    pub fn all(&self) -> HashMap<String, Profile> {
        let mut profiles = HashMap::new();
        for name in self.list() {
            match self.load(&name) {
                Ok(profile) => {
                    profiles.insert(name, profile);
                }
                Err(e) => warn!("failed to load profile '{}': {}", name, e),
            }
        }
        profiles
    }
}
