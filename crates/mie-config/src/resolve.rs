//! Settings file discovery.
//!
//! Resolution order: CLI argument → environment variables → XDG paths → defaults.

use std::path::{Path, PathBuf};

/// Where the settings file was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/mie-credit-platform/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable names.
pub const ENV_CONFIG_PATH: &str = "MIE_CONFIG";
pub const ENV_CONFIG_DIR: &str = "MIE_CONFIG_DIR";

/// Standard settings file name.
pub const SETTINGS_FILENAME: &str = "audit.json";

/// Application name for XDG directories.
const APP_NAME: &str = "mie-credit-platform";

/// Resolve the settings file.
///
/// 1. Explicit CLI path (returned even if missing, so loading reports it)
/// 2. `MIE_CONFIG` (direct path)
/// 3. `MIE_CONFIG_DIR` + `audit.json`
/// 4. XDG config directory (~/.config/mie-credit-platform/)
/// 5. System config (/etc/mie-credit-platform/)
/// 6. Built-in defaults (None)
pub fn resolve_settings_path(cli_path: Option<&Path>) -> (Option<PathBuf>, ConfigSource) {
    resolve_with(cli_path, |name| std::env::var(name).ok())
}

pub(crate) fn resolve_with(
    cli_path: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> (Option<PathBuf>, ConfigSource) {
    // 1. CLI argument
    if let Some(path) = cli_path {
        return (Some(path.to_path_buf()), ConfigSource::CliArgument);
    }

    // 2. Environment variable (direct path)
    if let Some(env_path) = lookup(ENV_CONFIG_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return (Some(path), ConfigSource::Environment);
        }
    }

    // 3. Environment variable (config dir)
    if let Some(config_dir) = lookup(ENV_CONFIG_DIR) {
        let path = PathBuf::from(config_dir).join(SETTINGS_FILENAME);
        if path.exists() {
            return (Some(path), ConfigSource::Environment);
        }
    }

    // 4. XDG config directory
    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(SETTINGS_FILENAME);
        if path.exists() {
            return (Some(path), ConfigSource::XdgConfig);
        }
    }

    // 5. System config
    let system_path = system_config_dir().join(SETTINGS_FILENAME);
    if system_path.exists() {
        return (Some(system_path), ConfigSource::SystemConfig);
    }

    // 6. Built-in default (None)
    (None, ConfigSource::BuiltinDefault)
}

/// Get the XDG config directory for the platform.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_source_display() {
        assert_eq!(format!("{}", ConfigSource::CliArgument), "CLI argument");
        assert_eq!(
            format!("{}", ConfigSource::Environment),
            "environment variable"
        );
        assert_eq!(
            format!("{}", ConfigSource::BuiltinDefault),
            "builtin default"
        );
    }

    #[test]
    fn test_cli_path_wins_even_if_missing() {
        let (path, source) = resolve_with(Some(Path::new("/nonexistent/audit.json")), |_| None);
        assert_eq!(path, Some(PathBuf::from("/nonexistent/audit.json")));
        assert_eq!(source, ConfigSource::CliArgument);
    }

    #[test]
    fn test_env_path_then_dir() {
        let tmp = TempDir::new().unwrap();
        let direct = tmp.path().join("direct.toml");
        std::fs::write(&direct, "").unwrap();
        std::fs::write(tmp.path().join(SETTINGS_FILENAME), "{}").unwrap();
        let dir = tmp.path().display().to_string();
        let direct_str = direct.display().to_string();

        let (path, source) = resolve_with(None, |name| match name {
            ENV_CONFIG_PATH => Some(direct_str.clone()),
            ENV_CONFIG_DIR => Some(dir.clone()),
            _ => None,
        });
        assert_eq!(path, Some(direct.clone()));
        assert_eq!(source, ConfigSource::Environment);

        let (path, _) = resolve_with(None, |name| match name {
            ENV_CONFIG_PATH => Some("/nonexistent.json".to_string()),
            ENV_CONFIG_DIR => Some(dir.clone()),
            _ => None,
        });
        assert_eq!(path, Some(tmp.path().join(SETTINGS_FILENAME)));
    }

    #[test]
    fn test_system_config_dir() {
        assert_eq!(system_config_dir(), PathBuf::from("/etc/mie-credit-platform"));
    }
}
