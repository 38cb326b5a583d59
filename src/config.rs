use crate::lint::{LintSettings, LintSeverity};
use crate::terraform::CallModuleType;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = ".tflint.toml";

/// The `[settings]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Which module calls are loaded; `local` unless set
    pub call_module_type: Option<CallModuleType>,
    /// Values files read after the automatically loaded ones
    pub varfile: Vec<String>,
    /// `key=value` variable assignments, applied after all values files
    pub variables: Vec<String>,
    /// Module sources that are never loaded when set to `true`
    pub ignore_module: HashMap<String, bool>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    /// Severity per rule name
    #[serde(default)]
    pub rules: HashMap<String, LintSeverity>,
}

impl Config {
    pub fn lint_settings(&self) -> LintSettings {
        LintSettings {
            severity: self.rules.clone(),
        }
    }

    pub fn ignored_modules(&self) -> impl Iterator<Item = &str> {
        self.settings
            .ignore_module
            .iter()
            .filter(|(_, ignored)| **ignored)
            .map(|(source, _)| source.as_str())
    }
}

/// Load configuration from `.tflint.toml` in `dir`, if present
pub fn load_config(dir: &Path) -> Result<Option<Config>> {
    load_config_from_path(&dir.join(DEFAULT_CONFIG_FILE))
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config = parse_config(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(config))
}

pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}
