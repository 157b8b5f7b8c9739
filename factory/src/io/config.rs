//! Factory configuration stored in `factory.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::persona::DEFAULT_MODEL;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "factory.toml";

/// Factory configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values the
/// pipeline prompts were tuned against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FactoryConfig {
    /// Model identifier bound to every persona.
    pub model: String,

    /// Base URL of the generative language API.
    pub api_base: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Total timeout per model call in seconds. `0` waits indefinitely.
    pub request_timeout_secs: u64,

    /// When the developer persona receives the reference code.
    pub reference_policy: ReferencePolicy,

    pub iterations: IterationBounds,
}

/// Controls reference-code injection into developer prompts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReferencePolicy {
    /// Inject whenever the request carried reference code.
    #[default]
    Explicit,
    /// Inject only when the developer input contains the `APLICÁVEL` marker.
    Marker,
}

/// Iteration limits offered to the operator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IterationBounds {
    pub default: u32,
    pub min: u32,
    pub max: u32,
}

impl Default for IterationBounds {
    fn default() -> Self {
        Self {
            default: 10,
            min: 5,
            max: 30,
        }
    }
}

impl IterationBounds {
    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            request_timeout_secs: 0,
            reference_policy: ReferencePolicy::default(),
            iterations: IterationBounds::default(),
        }
    }
}

impl FactoryConfig {
    /// Per-call timeout handed to the HTTP client, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(anyhow!("api_base must be an http(s) URL"));
        }
        if self.api_key_env.trim().is_empty() {
            return Err(anyhow!("api_key_env must be non-empty"));
        }
        let bounds = &self.iterations;
        if bounds.min == 0 {
            return Err(anyhow!("iterations.min must be > 0"));
        }
        if bounds.min > bounds.max {
            return Err(anyhow!("iterations.min must be <= iterations.max"));
        }
        if !bounds.contains(bounds.default) {
            return Err(anyhow!(
                "iterations.default must be within [{}, {}]",
                bounds.min,
                bounds.max
            ));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FactoryConfig::default()`.
pub fn load_config(path: &Path) -> Result<FactoryConfig> {
    if !path.exists() {
        let cfg = FactoryConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FactoryConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &FactoryConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, FactoryConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("factory.toml");
        let cfg = FactoryConfig {
            model: "gemini-2.5-pro".to_string(),
            reference_policy: ReferencePolicy::Marker,
            ..FactoryConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("factory.toml");
        fs::write(&path, "reference_policy = \"marker\"\n[iterations]\nmax = 12\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.reference_policy, ReferencePolicy::Marker);
        assert_eq!(cfg.iterations.max, 12);
        assert_eq!(cfg.iterations.default, 10);
        assert_eq!(cfg.model, DEFAULT_MODEL);
    }

    #[test]
    fn request_timeout_zero_means_none() {
        assert_eq!(FactoryConfig::default().request_timeout(), None);
        let cfg: FactoryConfig = toml::from_str("request_timeout_secs = 120\n").expect("parse");
        assert_eq!(cfg.request_timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn rejects_default_outside_bounds() {
        let cfg = FactoryConfig {
            iterations: IterationBounds {
                default: 40,
                min: 5,
                max: 30,
            },
            ..FactoryConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("iterations.default"));
    }

    #[test]
    fn rejects_zero_minimum() {
        let cfg = FactoryConfig {
            iterations: IterationBounds {
                default: 1,
                min: 0,
                max: 3,
            },
            ..FactoryConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
