//! Viewer configuration, read from a JSON5 file.
//!
//! ```json5
//! {
//!   theme: "dark",
//!   scale: 3,
//!   background: "#ffffff",
//!   downloads: "~/Downloads",
//!   share_base_url: "https://viewer.example/",
//! }
//! ```

use crate::render::Theme;
use crate::session::DEFAULT_ZOOM;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: json5::Error,
    },
}

/// `config.json5` next to the default preference file.
pub fn default_config_path() -> PathBuf {
    crate::prefs::default_prefs_path().with_file_name("config.json5")
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub theme: Theme,
    /// PNG export scale; also the initial preview zoom.
    pub scale: f32,
    /// Opaque raster background: hex (`#fff`, `#ffffff`), `rgb()`/`rgba()`, `white` or `black`.
    pub background: Option<String>,
    /// Download directory. Defaults to the current directory.
    pub downloads: Option<PathBuf>,
    /// Viewer URL share links are built on. Empty means a bare `#code=` hash.
    pub share_base_url: String,
    /// Preference file location. Defaults to the platform config directory.
    pub prefs: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            scale: DEFAULT_ZOOM,
            background: None,
            downloads: None,
            share_base_url: String::new(),
            prefs: None,
        }
    }
}

impl ViewerConfig {
    pub fn from_json5(text: &str) -> Result<Self, json5::Error> {
        json5::from_str(text)
    }

    /// Loads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_json5(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.downloads.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn prefs_path(&self) -> PathBuf {
        self.prefs
            .clone()
            .unwrap_or_else(crate::prefs::default_prefs_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json5_with_comments_and_trailing_commas() {
        let config = ViewerConfig::from_json5(
            r##"{
                // preview theme
                theme: "dark",
                scale: 3,
                background: "#fafafa",
                share_base_url: "https://viewer.example/",
            }"##,
        )
        .unwrap();
        assert_eq!(config.theme, Theme::Dark);
        assert_eq!(config.scale, 3.0);
        assert_eq!(config.background.as_deref(), Some("#fafafa"));
        assert_eq!(config.share_base_url, "https://viewer.example/");
        assert_eq!(config.downloads, None);
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(ViewerConfig::from_json5("{}").unwrap(), ViewerConfig::default());
        assert_eq!(ViewerConfig::default().scale, 2.0);
        assert_eq!(ViewerConfig::default().theme, Theme::Neutral);
    }

    #[test]
    fn documented_background_forms_are_usable() {
        for bg in ["#fafafa", "#fff", "rgb(250, 250, 250)", "rgba(250, 250, 250, 1)", "white"] {
            let config =
                ViewerConfig::from_json5(&format!("{{ background: {bg:?} }}")).unwrap();
            let parsed = config
                .background
                .as_deref()
                .and_then(crate::export::parse_color)
                .unwrap_or_else(|| panic!("{bg} does not parse"));
            assert_eq!(parsed.alpha(), 1.0, "{bg}");
        }
    }

    #[test]
    fn unknown_keys_and_bad_themes_are_rejected() {
        assert!(ViewerConfig::from_json5("{ zoom: 2 }").is_err());
        assert!(ViewerConfig::from_json5(r#"{ theme: "solarized" }"#).is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ViewerConfig::load(&dir.path().join("absent.json5")).unwrap();
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merview.json5");
        fs::write(&path, "{ theme: ").unwrap();
        let err = ViewerConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("merview.json5"), "{err}");
    }
}
