//! Log level and format selection from `MIE_LOG`, `MIE_LOG_FORMAT`,
//! `RUST_LOG` and the global CLI flags.

use std::fmt;
use std::str::FromStr;

/// Where log lines go is fixed (stderr); this only picks their shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Jsonl,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" | "text" => Ok(LogFormat::Human),
            "jsonl" | "json" => Ok(LogFormat::Jsonl),
            _ => Err(format!("unknown log format '{s}' (expected human or jsonl)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    /// stdout carries command results, so stderr stays quiet by default.
    #[default]
    Warn,
    Error,
    Off,
}

impl LogLevel {
    const ALL: [LogLevel; 6] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Off,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }

    /// Most verbose level named anywhere in a `RUST_LOG` directive string.
    fn from_directives(directives: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .filter(|level| *level != LogLevel::Off)
            .find(|level| directives.contains(level.as_str()))
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        if lowered == "warning" {
            return Ok(LogLevel::Warn);
        }
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == lowered)
            .ok_or_else(|| format!("unknown log level '{s}'"))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
}

impl LogConfig {
    /// Resolve from the process environment; CLI values win.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        Self::from_lookup(cli_level, cli_format, |name| std::env::var(name).ok())
    }

    /// `MIE_LOG` beats `RUST_LOG`; unparseable values are ignored.
    pub(crate) fn from_lookup(
        cli_level: Option<LogLevel>,
        cli_format: Option<LogFormat>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let env_level = match lookup("MIE_LOG") {
            Some(value) => value.parse().ok(),
            None => lookup("RUST_LOG").and_then(|value| LogLevel::from_directives(&value)),
        };
        let env_format = lookup("MIE_LOG_FORMAT").and_then(|value| value.parse().ok());

        LogConfig {
            level: cli_level.or(env_level).unwrap_or_default(),
            format: cli_format.or(env_format).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn test_defaults_without_env() {
        let config = LogConfig::from_lookup(None, None, env(&[]));
        assert_eq!(config, LogConfig::default());
        assert_eq!(config.level, LogLevel::Warn);
    }

    #[test]
    fn test_level_names() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("off".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_mie_log_beats_rust_log() {
        let config = LogConfig::from_lookup(
            None,
            None,
            env(&[("MIE_LOG", "error"), ("RUST_LOG", "debug"), ("MIE_LOG_FORMAT", "jsonl")]),
        );
        assert_eq!(config.level, LogLevel::Error);
        assert_eq!(config.format, LogFormat::Jsonl);
    }

    #[test]
    fn test_rust_log_directives() {
        let config = LogConfig::from_lookup(None, None, env(&[("RUST_LOG", "mie_audit=info,hyper=error")]));
        assert_eq!(config.level, LogLevel::Info);
    }

    #[test]
    fn test_cli_wins() {
        let config = LogConfig::from_lookup(
            Some(LogLevel::Debug),
            Some(LogFormat::Human),
            env(&[("MIE_LOG", "error"), ("MIE_LOG_FORMAT", "jsonl")]),
        );
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Human);
    }
}
