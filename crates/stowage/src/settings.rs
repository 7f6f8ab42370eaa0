use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use stowage_core::StepTimeouts;
use stowage_filesystem::DEFAULT_REPOSITORY_PATH;
use stowage_platform::AppPaths;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub debug_logging: bool,

    /// Language code used when neither `--lang` nor the locale picks one.
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default = "default_repository_path")]
    pub default_repository_path: String,

    #[serde(default = "default_quick_step_timeout")]
    pub quick_step_timeout_secs: u64,

    #[serde(default = "default_package_step_timeout")]
    pub package_step_timeout_secs: u64,

    #[serde(default = "default_retry_delays")]
    pub retry_delays_secs: Vec<u64>,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_repository_path() -> String {
    DEFAULT_REPOSITORY_PATH.to_string()
}

fn default_quick_step_timeout() -> u64 {
    30
}

fn default_package_step_timeout() -> u64 {
    60
}

fn default_retry_delays() -> Vec<u64> {
    vec![0, 2, 5]
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            debug_logging: false,
            language: None,
            default_repository_path: default_repository_path(),
            quick_step_timeout_secs: default_quick_step_timeout(),
            package_step_timeout_secs: default_package_step_timeout(),
            retry_delays_secs: default_retry_delays(),
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl AppSettings {
    pub fn load(paths: &AppPaths) -> Self {
        Self::load_from(&paths.settings_file())
    }

    fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|error| {
                log::warn!("Ignoring unreadable settings {}: {error}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, paths: &AppPaths) -> Result<(), std::io::Error> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.settings_file(), content)?;
        Ok(())
    }

    pub fn step_timeouts(&self) -> StepTimeouts {
        StepTimeouts {
            quick: Duration::from_secs(self.quick_step_timeout_secs),
            package: Duration::from_secs(self.package_step_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::time::Duration;

    use super::AppSettings;
    use stowage_platform::AppPaths;

    #[test]
    fn defaults_match_installer_timeouts() {
        let settings = AppSettings::default();

        assert_eq!(settings.quick_step_timeout_secs, 30);
        assert_eq!(settings.package_step_timeout_secs, 60);
        assert_eq!(settings.retry_delays_secs, vec![0, 2, 5]);
        assert_eq!(settings.max_log_size_bytes, 5 * 1024 * 1024);
        assert_eq!(settings.default_repository_path, "/backup/kopia-repository");
        assert_eq!(settings.step_timeouts().package, Duration::from_secs(60));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: AppSettings = serde_json::from_value(json!({
            "debug_logging": true,
            "package_step_timeout_secs": 300
        }))
        .expect("partial settings should deserialize");

        assert!(settings.debug_logging);
        assert_eq!(settings.package_step_timeout_secs, 300);
        assert_eq!(settings.quick_step_timeout_secs, 30);
        assert!(settings.language.is_none());
    }

    #[test]
    fn save_then_load_preserves_changes() {
        let root = tempfile::tempdir().expect("temporary directory should be created");
        let paths = AppPaths {
            config_dir: root.path().join("config"),
            data_dir: root.path().join("data"),
        };
        let settings = AppSettings {
            language: Some("de".to_string()),
            default_repository_path: "/mnt/usb/repo".to_string(),
            ..AppSettings::default()
        };

        settings.save(&paths).expect("settings should save");

        assert_eq!(AppSettings::load(&paths), settings);
    }

    #[test]
    fn corrupt_settings_load_as_default() {
        let root = tempfile::tempdir().expect("temporary directory should be created");
        let path = root.path().join("settings.json");
        std::fs::write(&path, "{ not json").expect("settings file should be written");

        assert_eq!(AppSettings::load_from(&path), AppSettings::default());
    }
}
