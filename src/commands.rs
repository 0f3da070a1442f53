//! Command-to-script mapping supplied at build time.
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

/// One `command -> source script` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    pub name: String,
    pub source: PathBuf,
}

impl CommandEntry {
    /// Basename of the source path; this becomes the archive member name.
    pub fn basename(&self) -> Option<&str> {
        self.source.file_name().and_then(|name| name.to_str())
    }
}

/// Ordered mapping from command name to source path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    entries: Vec<CommandEntry>,
}

impl CommandSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command, rejecting empty and duplicate names.
    pub fn insert(&mut self, name: &str, source: impl Into<PathBuf>) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("command name must be non-empty"));
        }
        if self.get(name).is_some() {
            return Err(anyhow!("duplicate command name {name:?}"));
        }
        self.entries.push(CommandEntry {
            name: name.to_string(),
            source: source.into(),
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CommandEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Rebase relative source paths onto `base`.
    pub fn resolve_against(mut self, base: &Path) -> Self {
        for entry in &mut self.entries {
            if entry.source.is_relative() {
                entry.source = base.join(&entry.source);
            }
        }
        self
    }
}

/// Parse `command:path[,command:path...]` into a spec.
///
/// The first `:` separates the command from the path, so paths may contain
/// colons. Empty items between commas are ignored.
pub fn parse_command_list(input: &str) -> Result<CommandSpec> {
    let mut spec = CommandSpec::new();
    for item in input.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let (name, path) = item
            .split_once(':')
            .ok_or_else(|| anyhow!("expected command:path, got {item:?}"))?;
        let path = path.trim();
        if path.is_empty() {
            return Err(anyhow!("command {name:?} has an empty script path"));
        }
        spec.insert(name, path)?;
    }
    Ok(spec)
}

/// Merge two specs, keeping the order of `first` then `second`.
pub fn merge(first: CommandSpec, second: CommandSpec) -> Result<CommandSpec> {
    let mut merged = first;
    for entry in second.entries {
        merged.insert(&entry.name, entry.source)?;
    }
    Ok(merged)
}
