// NetGather - platform/config.rs
//
// Platform-specific paths and config.toml loading with startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for NetGather configuration and data.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/netgather/ or %APPDATA%\NetGather\config\)
    pub config_dir: PathBuf,

    /// Data directory; user template sets live under `templates/` here.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                data_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                data_dir: fallback,
            }
        }
    }

    /// Default location of `config.toml`.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }

    /// Template directory used when neither the CLI nor the config names one.
    /// Only returned if it actually exists.
    pub fn default_template_dir(&self) -> Option<PathBuf> {
        let dir = self.data_dir.join(constants::TEMPLATES_DIR_NAME);
        dir.is_dir().then_some(dir)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[collection]` section.
    pub collection: CollectionSection,
    /// `[templates]` section.
    pub templates: TemplatesSection,
    /// `[provider]` section.
    pub provider: ProviderSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[collection]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct CollectionSection {
    /// Concurrent sessions.
    pub workers: Option<usize>,
    /// Per-target timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Target type used for template lookup.
    pub device_type: Option<String>,
    /// Send the paging-disable command before the target command.
    pub disable_paging: Option<bool>,
}

/// `[templates]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct TemplatesSection {
    /// Template directory or bundle (.zip).
    pub directory: Option<String>,
}

/// `[provider]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    /// ssh client program.
    pub ssh_program: Option<String>,
    /// sshpass program.
    pub sshpass_program: Option<String>,
    /// ssh port.
    pub port: Option<u16>,
    /// Extra arguments passed to ssh before the host.
    pub extra_args: Option<Vec<String>>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    // -- Collection --
    pub workers: usize,
    pub timeout_secs: u64,
    pub device_type: String,
    pub disable_paging: bool,

    // -- Templates --
    pub template_dir: Option<PathBuf>,

    // -- Provider --
    pub ssh_program: String,
    pub sshpass_program: String,
    pub ssh_port: u16,
    pub ssh_extra_args: Vec<String>,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workers: constants::DEFAULT_WORKERS,
            timeout_secs: constants::DEFAULT_TIMEOUT_SECS,
            device_type: constants::DEFAULT_DEVICE_TYPE.to_string(),
            disable_paging: true,
            template_dir: None,
            ssh_program: constants::DEFAULT_SSH_PROGRAM.to_string(),
            sshpass_program: constants::DEFAULT_SSHPASS_PROGRAM.to_string(),
            ssh_port: constants::DEFAULT_SSH_PORT,
            ssh_extra_args: Vec::new(),
            log_level: None,
        }
    }
}

/// Load and validate a config file.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// A missing file yields defaults with no warnings (first run). An unreadable
/// or unparseable file yields defaults and a warning; the run still goes ahead.
pub fn load_config(config_path: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(e) => {
            let err = ConfigError::Io {
                path: config_path.to_path_buf(),
                source: e,
            };
            let msg = format!("{err}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    let (config, mut parse_warnings) = parse_config(&content, config_path);
    warnings.append(&mut parse_warnings);
    (config, warnings)
}

/// Validate config text. `origin` is only used in messages.
pub fn parse_config(content: &str, origin: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    let raw: RawConfig = match toml::from_str(content) {
        Ok(r) => r,
        Err(e) => {
            let err = ConfigError::TomlParse {
                path: origin.to_path_buf(),
                source: e,
            };
            let msg = format!("{err}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %origin.display(), "Loaded config.toml");

    let mut config = AppConfig::default();

    // -- Collection: workers --
    if let Some(workers) = raw.collection.workers {
        if (constants::MIN_WORKERS..=constants::MAX_WORKERS).contains(&workers) {
            config.workers = workers;
        } else {
            warnings.push(out_of_range(
                "collection.workers",
                workers,
                format!("{}-{}", constants::MIN_WORKERS, constants::MAX_WORKERS),
                constants::DEFAULT_WORKERS,
            ));
        }
    }

    // -- Collection: timeout_secs --
    if let Some(secs) = raw.collection.timeout_secs {
        if (constants::MIN_TIMEOUT_SECS..=constants::MAX_TIMEOUT_SECS).contains(&secs) {
            config.timeout_secs = secs;
        } else {
            warnings.push(out_of_range(
                "collection.timeout_secs",
                secs,
                format!("{}-{}", constants::MIN_TIMEOUT_SECS, constants::MAX_TIMEOUT_SECS),
                constants::DEFAULT_TIMEOUT_SECS,
            ));
        }
    }

    // -- Collection: device_type --
    if let Some(ref device_type) = raw.collection.device_type {
        let trimmed = device_type.trim();
        if trimmed.is_empty() {
            warnings.push(format!(
                "[collection] device_type is empty. Using default ({}).",
                constants::DEFAULT_DEVICE_TYPE,
            ));
        } else {
            config.device_type = trimmed.to_string();
        }
    }

    if let Some(disable) = raw.collection.disable_paging {
        config.disable_paging = disable;
    }

    // -- Templates: directory --
    if let Some(ref dir) = raw.templates.directory {
        if !dir.trim().is_empty() {
            config.template_dir = Some(PathBuf::from(dir.trim()));
        }
    }

    // -- Provider --
    if let Some(ref program) = raw.provider.ssh_program {
        if !program.trim().is_empty() {
            config.ssh_program = program.trim().to_string();
        }
    }
    if let Some(ref program) = raw.provider.sshpass_program {
        if !program.trim().is_empty() {
            config.sshpass_program = program.trim().to_string();
        }
    }
    if let Some(port) = raw.provider.port {
        if port == 0 {
            warnings.push(out_of_range(
                "provider.port",
                port,
                "1-65535".to_string(),
                constants::DEFAULT_SSH_PORT,
            ));
        } else {
            config.ssh_port = port;
        }
    }
    if let Some(args) = raw.provider.extra_args {
        config.ssh_extra_args = args;
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.to_lowercase());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}

fn out_of_range(
    field: &str,
    value: impl ToString,
    expected: String,
    default: impl std::fmt::Display,
) -> String {
    let err = ConfigError::ValueOutOfRange {
        field: field.to_string(),
        value: value.to_string(),
        expected,
    };
    format!("{err}. Using default ({default}).")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> (AppConfig, Vec<String>) {
        parse_config(text, Path::new("config.toml"))
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = load_config(&dir.path().join("config.toml"));
        assert_eq!(config, AppConfig::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_valid_sections_are_applied() {
        let (config, warnings) = parse(
            r#"
[collection]
workers = 8
timeout_secs = 60
device_type = "arista_eos"
disable_paging = false

[templates]
directory = "/opt/ntc-templates"

[provider]
port = 2222
extra_args = ["-o", "StrictHostKeyChecking=no"]

[logging]
level = "DEBUG"
"#,
        );
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(config.workers, 8);
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.device_type, "arista_eos");
        assert!(!config.disable_paging);
        assert_eq!(config.template_dir, Some(PathBuf::from("/opt/ntc-templates")));
        assert_eq!(config.ssh_port, 2222);
        assert_eq!(config.ssh_extra_args.len(), 2);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_out_of_range_values_warn_and_fall_back() {
        let (config, warnings) = parse(
            "[collection]\nworkers = 0\ntimeout_secs = 1000\n\n[logging]\nlevel = \"loud\"\n",
        );
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("'collection.workers' = '0' is out of range"));
        assert_eq!(config.workers, constants::DEFAULT_WORKERS);
        assert_eq!(config.timeout_secs, constants::DEFAULT_TIMEOUT_SECS);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_unparseable_file_warns() {
        let (config, warnings) = parse("[collection\nworkers = ");
        assert_eq!(config, AppConfig::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Config parse error"));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let (_, warnings) = parse("[future]\nshiny = true\n[collection]\nretries = 3\n");
        assert!(warnings.is_empty());
    }
}
