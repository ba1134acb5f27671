//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, RangeConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/marksman/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("marksman/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("marksman.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a config file as a raw TOML table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    contents
        .parse::<toml::Table>()
        .map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Load a single config file on top of compiled defaults.
pub fn load_from_file(path: &Path) -> Result<RangeConfig, ConfigError> {
    let table = load_table(path)?;
    table_to_config(table, path)
}

pub(crate) fn table_to_config(table: toml::Table, path: &Path) -> Result<RangeConfig, ConfigError> {
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Merge `overlay` into `base`; nested tables merge key by key, everything
/// else is replaced.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut RangeConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("MARKSMAN_CAPTURES_DIR") {
        config.paths.captures_dir = expand_path(&v);
        sources.env_overrides.push("MARKSMAN_CAPTURES_DIR".to_string());
    }

    if let Ok(v) = env::var("MARKSMAN_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("MARKSMAN_LOG_LEVEL".to_string());
    }

    if let Ok(v) = env::var("MARKSMAN_TOTAL_AMMO") {
        if let Ok(ammo) = v.parse() {
            config.session.total_ammo = ammo;
            sources.env_overrides.push("MARKSMAN_TOTAL_AMMO".to_string());
        }
    }

    if let Ok(v) = env::var("MARKSMAN_SESSION_DURATION_SECS") {
        if let Ok(secs) = v.parse() {
            config.session.duration_secs = secs;
            sources
                .env_overrides
                .push("MARKSMAN_SESSION_DURATION_SECS".to_string());
        }
    }

    if let Ok(v) = env::var("MARKSMAN_TRIGGER_DEVICE") {
        config.trigger.device_name = v;
        sources.env_overrides.push("MARKSMAN_TRIGGER_DEVICE".to_string());
    }

    if let Ok(v) = env::var("MARKSMAN_TRIGGER_KEY") {
        config.trigger.key_name = v;
        sources.env_overrides.push("MARKSMAN_TRIGGER_KEY".to_string());
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Backpressure;
    use std::time::Duration;

    fn table(contents: &str) -> toml::Table {
        contents.parse().unwrap()
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/range/captures");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().ends_with("range/captures"));
    }

    #[test]
    fn test_expand_path_absolute() {
        assert_eq!(expand_path("/srv/captures"), PathBuf::from("/srv/captures"));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = table_to_config(table("[session]\nduration_secs = 115\n"), Path::new("t.toml"))
            .unwrap();
        assert_eq!(config.session.duration_secs, 115);
        assert_eq!(config.session.total_ammo, 16);
        assert_eq!(config.trigger.device_name, "AB Shutter");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[paths]
captures_dir = "/data/captures"

[telemetry]
log_level = "debug"

[camera]
capture_width = 1280
capture_height = 720
fps = 10

[session]
total_ammo = 10
duration_secs = 60
shot_interval_ms = 150
pipeline_capacity = 8
backpressure = "drop_newest"

[achievement]
top_hits = 6
second_hits = 5
third_hits = 2
high_value_marker = "commander"

[trigger]
device_name = "Shutter"
key_name = "KEY_ENTER"
"#;
        let config = table_to_config(table(toml), Path::new("t.toml")).unwrap();
        assert_eq!(config.paths.captures_dir, PathBuf::from("/data/captures"));
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.camera.frame_width(), 720);
        assert_eq!(config.camera.frame_interval(), Duration::from_millis(100));
        assert_eq!(config.session.total_ammo, 10);
        assert_eq!(config.session.backpressure, Backpressure::DropNewest);
        assert_eq!(config.achievement.high_value_marker, "commander");
        assert_eq!(config.trigger.key_name, "KEY_ENTER");
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        let result = table_to_config(table("[session]\ntotal_ammo = \"lots\"\n"), Path::new("bad.toml"));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_merge_keeps_sibling_keys() {
        let mut base = table("[session]\ntotal_ammo = 10\nduration_secs = 60\n");
        merge_tables(&mut base, table("[session]\nduration_secs = 90\n"));

        let config = table_to_config(base, Path::new("merged")).unwrap();
        assert_eq!(config.session.total_ammo, 10);
        assert_eq!(config.session.duration_secs, 90);
    }

    #[test]
    fn test_load_from_file_missing() {
        let result = load_from_file(Path::new("/nonexistent/marksman.toml"));
        assert!(matches!(result, Err(ConfigError::FileRead { .. })));
    }

    #[test]
    fn test_discover_prefers_cli_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "").unwrap();

        let files = discover_config_files_with_override(Some(&path));
        assert_eq!(files.last(), Some(&path));
    }
}
