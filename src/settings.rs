use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::components::history::DEFAULT_UNDO_MAX;

pub const MAX_UNDO_MAX: usize = 200;
pub const DEFAULT_STROKE_MERGE_TIME: Duration = Duration::from_millis(150);
pub const MAX_STROKE_MERGE_TIME: Duration = Duration::from_millis(500);

/// Editor settings that bound the history engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Settings {
    /// Undo capacity, 0 ..= 200.
    pub undo_max: usize,
    /// Window within which mergeable edits collapse, 0 ..= 500 ms.
    pub stroke_merge_time: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self { undo_max: DEFAULT_UNDO_MAX, stroke_merge_time: DEFAULT_STROKE_MERGE_TIME }
    }
}

/// On-disk form: `{ "undoMax": n, "strokeMergeTime": ms }`.
#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct SettingsFile {
    undo_max: Option<f64>,
    stroke_merge_time: Option<f64>,
}

impl From<SettingsFile> for Settings {
    fn from(file: SettingsFile) -> Self {
        let defaults = Settings::default();
        let undo_max = file
            .undo_max
            .filter(|v| v.is_finite())
            .map(|v| v.round().clamp(0.0, MAX_UNDO_MAX as f64) as usize)
            .unwrap_or(defaults.undo_max);
        let stroke_merge_time = file
            .stroke_merge_time
            .filter(|v| v.is_finite())
            .map(|ms| Duration::from_millis(ms.round().clamp(0.0, MAX_STROKE_MERGE_TIME.as_millis() as f64) as u64))
            .unwrap_or(defaults.stroke_merge_time);
        Settings { undo_max, stroke_merge_time }
    }
}

impl Settings {
    /// Clamp both fields into their documented ranges.
    pub fn clamped(self) -> Self {
        Self {
            undo_max: self.undo_max.min(MAX_UNDO_MAX),
            stroke_merge_time: self.stroke_merge_time.min(MAX_STROKE_MERGE_TIME),
        }
    }

    /// Parse settings JSON. Missing fields default; out-of-range values clamp.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: SettingsFile = serde_json::from_str(json)?;
        Ok(file.into())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let file = SettingsFile {
            undo_max: Some(self.undo_max as f64),
            stroke_merge_time: Some(self.stroke_merge_time.as_millis() as f64),
        };
        serde_json::to_string_pretty(&file)
    }

    /// Platform settings file location.
    ///
    /// `$XDG_CONFIG_HOME/sketchpad/settings.json`            (Linux)
    /// `%APPDATA%\sketchpad\settings.json`                   (Windows)
    /// `~/Library/Application Support/sketchpad/settings.json` (macOS)
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        let dir = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok().map(PathBuf::from);
        #[cfg(target_os = "macos")]
        let dir = std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join("Library").join("Application Support"));
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
            .ok();
        dir.map(|d| d.join("sketchpad").join("settings.json"))
    }

    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Read settings from `path`, falling back to defaults when the file is
    /// missing or malformed.
    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "could not read settings");
                }
                return Self::default();
            }
        };
        Self::from_json(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "malformed settings, using defaults");
            Self::default()
        })
    }

    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::settings_path()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no settings directory"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.to_json()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        assert_eq!(Settings::from_json("{}").unwrap(), Settings::default());
        let s = Settings::from_json(r#"{"undoMax": 5}"#).unwrap();
        assert_eq!(s.undo_max, 5);
        assert_eq!(s.stroke_merge_time, DEFAULT_STROKE_MERGE_TIME);
    }

    #[test]
    fn values_clamp_to_range() {
        let s = Settings::from_json(r#"{"undoMax": 999, "strokeMergeTime": -40}"#).unwrap();
        assert_eq!(s.undo_max, 200);
        assert_eq!(s.stroke_merge_time, Duration::ZERO);
        let s = Settings::from_json(r#"{"strokeMergeTime": 9000}"#).unwrap();
        assert_eq!(s.stroke_merge_time, MAX_STROKE_MERGE_TIME);
    }

    #[test]
    fn file_round_trip_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let s = Settings { undo_max: 42, stroke_merge_time: Duration::from_millis(300) };
        s.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), s);

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
        assert_eq!(Settings::load_from(&dir.path().join("absent.json")), Settings::default());
    }

    #[test]
    fn json_uses_camel_case_milliseconds() {
        let s = Settings { undo_max: 7, stroke_merge_time: Duration::from_millis(250) };
        let json = s.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["undoMax"], 7.0);
        assert_eq!(value["strokeMergeTime"], 250.0);
        assert_eq!(Settings::from_json(&json).unwrap(), s);
    }
}
