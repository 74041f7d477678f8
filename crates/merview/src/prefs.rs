//! Persisted local preferences (editor/preview split ratio).

use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Key the split ratio is stored under.
pub const SPLIT_KEY: &str = "viewerSplit";
pub const DEFAULT_SPLIT: f64 = 0.5;
pub const MIN_SPLIT: f64 = 0.2;
pub const MAX_SPLIT: f64 = 0.8;
/// Distance drag values keep from the load bounds, so a stored drag always reloads.
const DRAG_INSET: f64 = 0.001;

#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("failed to read preferences {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write preferences {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode preferences: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Platform preference file: `$XDG_CONFIG_HOME/merview/prefs.json` and equivalents.
pub fn default_prefs_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("merview").join("prefs.json");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("merview")
                .join("prefs.json");
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("merview").join("prefs.json");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join(".config")
                .join("merview")
                .join("prefs.json");
        }
    }

    PathBuf::from(".merview-prefs.json")
}

/// A small JSON key/value store. Unknown keys are preserved on save.
#[derive(Debug, Clone)]
pub struct Preferences {
    path: PathBuf,
    values: Map<String, Value>,
}

impl Preferences {
    /// Loads `path`. A missing file is empty; an unreadable JSON document is treated as empty too,
    /// the same way a browser ignores garbage in local storage.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PrefsError> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    tracing::warn!(path = %path.display(), "ignoring malformed preferences");
                    Map::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(source) => return Err(PrefsError::Read { path, source }),
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored split ratio when strictly inside `(MIN_SPLIT, MAX_SPLIT)`, else [`DEFAULT_SPLIT`].
    pub fn split_ratio(&self) -> f64 {
        let stored = match self.values.get(SPLIT_KEY) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        stored
            .filter(|v| *v > MIN_SPLIT && *v < MAX_SPLIT)
            .unwrap_or(DEFAULT_SPLIT)
    }

    /// Records the ratio at the end of a resize drag and persists it. Returns the stored value.
    ///
    /// Values are clamped just inside `(MIN_SPLIT, MAX_SPLIT)` (0.201 to 0.799), the window
    /// [`Preferences::split_ratio`] accepts, so a drag against either edge survives a reload.
    pub fn set_split_ratio(&mut self, ratio: f64) -> Result<f64, PrefsError> {
        let ratio = if ratio.is_finite() {
            ratio.clamp(MIN_SPLIT + DRAG_INSET, MAX_SPLIT - DRAG_INSET)
        } else {
            DEFAULT_SPLIT
        };
        self.values.insert(SPLIT_KEY.to_string(), Value::from(ratio));
        self.save()?;
        Ok(ratio)
    }

    fn save(&self) -> Result<(), PrefsError> {
        let text = serde_json::to_string_pretty(&self.values)?;
        let write_err = |source| PrefsError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&self.path, format!("{text}\n")).map_err(write_err)
    }
}
