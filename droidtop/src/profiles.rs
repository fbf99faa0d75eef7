//! Connection profiles: load/save a simple JSON mapping of profile name -> { url }
//! Stored under the XDG config dir: $XDG_CONFIG_HOME/droidtop/profiles.json
//! (fallback ~/.config/droidtop/profiles.json)

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProfileEntry {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileEntry>,
    #[serde(default)]
    pub version: u32,
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("droidtop")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("droidtop")
    }
}

pub fn profiles_path() -> PathBuf {
    config_dir().join("profiles.json")
}

pub fn load_profiles() -> ProfilesFile {
    let path = profiles_path();
    match fs::read_to_string(&path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
        Err(_) => ProfilesFile::default(),
    }
}

pub fn save_profiles(p: &ProfilesFile) -> std::io::Result<()> {
    let path = profiles_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(p).map_err(std::io::Error::other)?;
    fs::write(path, data)
}

pub enum ResolveTarget {
    /// Use the URL given on the command line (maybe saved by the caller).
    Direct(String),
    /// Loaded from an existing profile entry.
    Loaded(String),
    /// A profile name with no stored entry and no URL to create it from.
    Unknown(String),
    /// Nothing to connect to.
    None,
}

pub struct TargetRequest {
    pub profile_name: Option<String>,
    pub url: Option<String>,
}

impl TargetRequest {
    pub fn resolve(self, pf: &ProfilesFile) -> ResolveTarget {
        if let Some(url) = self.url {
            return ResolveTarget::Direct(url);
        }
        if let Some(name) = self.profile_name {
            return match pf.profiles.get(&name) {
                Some(entry) => ResolveTarget::Loaded(entry.url.clone()),
                None => ResolveTarget::Unknown(name),
            };
        }
        ResolveTarget::None
    }
}
