//! Bundle definition files.
//!
//! A definition file lists commands (and optionally the output) so a bundle
//! can be rebuilt without retyping the command list. Relative paths are
//! resolved against the directory holding the file.
use crate::commands::CommandSpec;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current schema version for bundle definition files.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BundleConfig {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    pub commands: Vec<CommandConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CommandConfig {
    pub name: String,
    pub path: PathBuf,
}

/// A loaded definition with paths resolved.
#[derive(Debug)]
pub struct LoadedConfig {
    pub commands: CommandSpec,
    pub output: Option<PathBuf>,
}

/// Load and validate a definition file.
pub fn load_config(path: &Path) -> Result<LoadedConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: BundleConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse bundle config {}", path.display()))?;
    validate_config(&config)?;
    let base = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    resolve_config(config, base)
}

/// Validate schema and required fields.
pub fn validate_config(config: &BundleConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported bundle config schema_version {}",
            config.schema_version
        ));
    }
    if config.commands.is_empty() {
        return Err(anyhow!("bundle config lists no commands"));
    }
    Ok(())
}

fn resolve_config(config: BundleConfig, base: &Path) -> Result<LoadedConfig> {
    let mut commands = CommandSpec::new();
    for command in config.commands {
        commands
            .insert(&command.name, command.path)
            .context("bundle config commands")?;
    }
    let output = config.output.map(|output| {
        if output.is_relative() {
            base.join(output)
        } else {
            output
        }
    });
    Ok(LoadedConfig {
        commands: commands.resolve_against(base),
        output,
    })
}
