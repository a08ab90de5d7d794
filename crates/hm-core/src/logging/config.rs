//! Log level and format selection.
//!
//! Sources, lowest to highest precedence: the command's base level,
//! `RUST_LOG`, `HPCMAIL_LOG` / `HPCMAIL_LOG_FORMAT`, then `-v` / `-q`.

use std::str::FromStr;

/// Where log lines go and how they look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Console text.
    #[default]
    Human,
    /// One JSON object per line.
    Jsonl,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "text" | "console" => Ok(LogFormat::Human),
            "jsonl" | "json" => Ok(LogFormat::Jsonl),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Minimum level, ordered from silent to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

const LEVELS: [LogLevel; 6] = [
    LogLevel::Off,
    LogLevel::Error,
    LogLevel::Warn,
    LogLevel::Info,
    LogLevel::Debug,
    LogLevel::Trace,
];

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Move `steps` positions along the verbosity scale, saturating.
    fn shifted(self, steps: i32) -> LogLevel {
        let idx = (self as i32 + steps).clamp(0, LEVELS.len() as i32 - 1);
        LEVELS[idx as usize]
    }

    /// Most verbose level named anywhere in a `RUST_LOG` directive string.
    fn from_directives(directives: &str) -> Option<LogLevel> {
        let lower = directives.to_ascii_lowercase();
        LEVELS
            .iter()
            .rev()
            .copied()
            .filter(|level| *level != LogLevel::Off)
            .find(|level| lower.contains(level.as_str()))
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warning" => Ok(LogLevel::Warn),
            "none" | "quiet" => Ok(LogLevel::Off),
            other => LEVELS
                .iter()
                .copied()
                .find(|level| level.as_str() == other)
                .ok_or_else(|| format!("unknown log level '{}'", other)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Prefix human lines with a timestamp.
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LogLevel::Info,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Settings for a command whose default level is `base`, after the
    /// process environment is applied.
    pub fn from_env(base: LogLevel) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), base)
    }

    /// Like [`LogConfig::from_env`], reading variables through `lookup`.
    /// Unparseable values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, base: LogLevel) -> Self {
        let explicit = lookup("HPCMAIL_LOG").and_then(|v| v.parse().ok());
        let level = explicit
            .or_else(|| lookup("RUST_LOG").and_then(|v| LogLevel::from_directives(&v)))
            .unwrap_or(base);
        let format = lookup("HPCMAIL_LOG_FORMAT")
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();

        LogConfig {
            format,
            level,
            ..LogConfig::default()
        }
    }

    /// Apply `-v` / `-q` counts.
    pub fn with_verbosity(mut self, verbose: u8, quiet: u8) -> Self {
        self.level = self.level.shifted(i32::from(verbose) - i32::from(quiet));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert!("xml".parse::<LogFormat>().is_err());

        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("Warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("quiet".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Trace.to_string(), "trace");
    }

    #[test]
    fn test_base_level_without_env() {
        let config = LogConfig::from_lookup(env(&[]), LogLevel::Warn);
        assert_eq!(config, LogConfig { level: LogLevel::Warn, ..LogConfig::default() });
    }

    #[test]
    fn test_env_precedence() {
        let config = LogConfig::from_lookup(
            env(&[("HPCMAIL_LOG", "error"), ("RUST_LOG", "hm_core=trace")]),
            LogLevel::Info,
        );
        assert_eq!(config.level, LogLevel::Error);

        let config = LogConfig::from_lookup(env(&[("RUST_LOG", "warn,hm_core=debug")]), LogLevel::Info);
        assert_eq!(config.level, LogLevel::Debug);

        // A bad HPCMAIL_LOG falls through to RUST_LOG.
        let config = LogConfig::from_lookup(
            env(&[("HPCMAIL_LOG", "loud"), ("RUST_LOG", "trace"), ("HPCMAIL_LOG_FORMAT", "json")]),
            LogLevel::Warn,
        );
        assert_eq!(config.level, LogLevel::Trace);
        assert_eq!(config.format, LogFormat::Jsonl);
    }

    #[test]
    fn test_verbosity_saturates() {
        let info = LogConfig::default();
        assert_eq!(info.clone().with_verbosity(0, 0).level, LogLevel::Info);
        assert_eq!(info.clone().with_verbosity(1, 0).level, LogLevel::Debug);
        assert_eq!(info.clone().with_verbosity(5, 0).level, LogLevel::Trace);
        assert_eq!(info.clone().with_verbosity(0, 2).level, LogLevel::Error);
        assert_eq!(info.with_verbosity(0, 9).level, LogLevel::Off);
    }
}
