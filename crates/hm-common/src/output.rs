//! Output format selection.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Supported output formats for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Structured JSON (default for machine consumption)
    #[default]
    Json,

    /// Human-readable Markdown
    Md,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Md => write!(f, "md"),
        }
    }
}

impl OutputFormat {
    /// Whether this format is intended for machines rather than people.
    pub fn is_machine(&self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_value_names() {
        assert_eq!(OutputFormat::Json.to_string(), "json");
        assert_eq!(OutputFormat::Md.to_string(), "md");
    }

    #[test]
    fn test_default_is_json() {
        assert_eq!(OutputFormat::default(), OutputFormat::Json);
        assert!(OutputFormat::default().is_machine());
        assert!(!OutputFormat::Md.is_machine());
    }
}
