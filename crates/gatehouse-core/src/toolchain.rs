//! Toolchain specifications and release channel parsing.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ProvisionError;

fn default_toolchain_name() -> String {
    "rust".to_string()
}

/// A toolchain that must be active before a job's commands run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ToolchainSpec {
    /// Toolchain family. Only used for labelling; the installer decides what it means.
    #[serde(default = "default_toolchain_name")]
    pub name: String,

    /// Release channel or pinned version (`stable`, `nightly-2024-01-15`, `1.85.0`, ...).
    pub channel: String,

    /// Extra components to install alongside the toolchain.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
}

impl ToolchainSpec {
    /// Create a spec for the default toolchain family on `channel`.
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            name: default_toolchain_name(),
            channel: channel.into(),
            components: Vec::new(),
        }
    }

    /// Add a component to install.
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.components.push(component.into());
        self
    }

    /// Parse the channel and check every component name.
    pub fn validate(&self) -> Result<Channel, ProvisionError> {
        let channel = Channel::parse(&self.channel)?;
        for component in &self.components {
            let valid = !component.is_empty()
                && component
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                return Err(ProvisionError::InvalidComponent(component.clone()));
            }
        }
        Ok(channel)
    }

    /// Components sorted and deduplicated, so equivalent specs compare equal.
    pub fn normalized_components(&self) -> Vec<String> {
        let mut components = self.components.clone();
        components.sort();
        components.dedup();
        components
    }

    /// Identity used to recognise an already-provisioned toolchain.
    pub fn key(&self) -> String {
        format!(
            "{}:{}+{}",
            self.name,
            self.channel,
            self.normalized_components().join(",")
        )
    }
}

impl fmt::Display for ToolchainSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.channel)?;
        if !self.components.is_empty() {
            write!(f, "+{}", self.components.join(","))?;
        }
        Ok(())
    }
}

/// A parsed release channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Stable,
    Beta,
    Nightly,
    DatedBeta(NaiveDate),
    DatedNightly(NaiveDate),
    Version {
        major: u32,
        minor: u32,
        patch: Option<u32>,
    },
}

impl Channel {
    /// Parse a channel string.
    ///
    /// Accepts the three release tracks, dated `beta`/`nightly` builds
    /// (`nightly-YYYY-MM-DD`) and numeric versions (`1.85`, `1.85.0`).
    pub fn parse(raw: &str) -> Result<Self, ProvisionError> {
        let unknown = || ProvisionError::UnknownChannel(raw.to_string());
        let trimmed = raw.trim();

        match trimmed {
            "stable" => return Ok(Channel::Stable),
            "beta" => return Ok(Channel::Beta),
            "nightly" => return Ok(Channel::Nightly),
            _ => {}
        }

        if let Some(date) = trimmed.strip_prefix("nightly-") {
            return parse_date(date).map(Channel::DatedNightly).ok_or_else(unknown);
        }
        if let Some(date) = trimmed.strip_prefix("beta-") {
            return parse_date(date).map(Channel::DatedBeta).ok_or_else(unknown);
        }

        let parts: Vec<&str> = trimmed.split('.').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(unknown());
        }
        let mut numbers = Vec::with_capacity(parts.len());
        for part in parts {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(unknown());
            }
            numbers.push(part.parse::<u32>().map_err(|_| unknown())?);
        }
        Ok(Channel::Version {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers.get(2).copied(),
        })
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Stable => write!(f, "stable"),
            Channel::Beta => write!(f, "beta"),
            Channel::Nightly => write!(f, "nightly"),
            Channel::DatedBeta(date) => write!(f, "beta-{}", date.format("%Y-%m-%d")),
            Channel::DatedNightly(date) => write!(f, "nightly-{}", date.format("%Y-%m-%d")),
            Channel::Version {
                major,
                minor,
                patch: Some(patch),
            } => write!(f, "{major}.{minor}.{patch}"),
            Channel::Version {
                major,
                minor,
                patch: None,
            } => write!(f, "{major}.{minor}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_release_tracks() {
        assert_eq!(Channel::parse("stable").unwrap(), Channel::Stable);
        assert_eq!(Channel::parse("beta").unwrap(), Channel::Beta);
        assert_eq!(Channel::parse("nightly").unwrap(), Channel::Nightly);
    }

    #[test]
    fn parses_dated_nightly() {
        let channel = Channel::parse("nightly-2024-01-15").unwrap();
        assert_eq!(channel.to_string(), "nightly-2024-01-15");
    }

    #[test]
    fn rejects_nightly_with_garbage_suffix() {
        let err = Channel::parse("nightly-invalid").unwrap_err();
        assert_eq!(err, ProvisionError::UnknownChannel("nightly-invalid".to_string()));
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(Channel::parse("nightly-2024-02-30").is_err());
    }

    #[test]
    fn parses_numeric_versions() {
        assert_eq!(
            Channel::parse("1.85.0").unwrap(),
            Channel::Version {
                major: 1,
                minor: 85,
                patch: Some(0)
            }
        );
        assert_eq!(Channel::parse("1.85").unwrap().to_string(), "1.85");
        assert!(Channel::parse("1").is_err());
        assert!(Channel::parse("1.x.0").is_err());
        assert!(Channel::parse("1.2.3.4").is_err());
    }

    #[test]
    fn validate_rejects_bad_component() {
        let spec = ToolchainSpec::new("stable").with_component("rust fmt");
        assert!(matches!(
            spec.validate(),
            Err(ProvisionError::InvalidComponent(_))
        ));
    }

    #[test]
    fn key_ignores_component_order() {
        let a = ToolchainSpec::new("stable")
            .with_component("rustfmt")
            .with_component("clippy");
        let b = ToolchainSpec::new("stable")
            .with_component("clippy")
            .with_component("rustfmt");
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn display_lists_components() {
        let spec = ToolchainSpec::new("stable").with_component("rustfmt");
        assert_eq!(spec.to_string(), "stable+rustfmt");
    }
}
