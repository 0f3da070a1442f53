//! Manifest member: the command table that drives dispatch.
//!
//! The manifest is bash that the bundle's runtime evaluates. It only carries
//! data (percent-encoded, single-quoted literals) plus one call into the fixed
//! dispatch routine, so no command name can inject shell syntax. The native
//! runtime parses the same text back into a [`Manifest`].
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fmt::Write as _;

/// Reserved archive member name holding the manifest.
pub const MANIFEST_MEMBER: &str = "__manifest__";
/// Routine registering one command in the runtime's table.
pub const REGISTER_ROUTINE: &str = "scriptpack_register";
/// Routine matching argv[1] against the table.
pub const DISPATCH_ROUTINE: &str = "scriptpack_dispatch";

const HEADER: &str = "# scriptpack manifest v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub command: String,
    pub member: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.command.as_str())
    }

    pub fn lookup(&self, command: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|entry| entry.command == command)
    }

    /// Render the manifest member text.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str(HEADER);
        out.push('\n');
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "{REGISTER_ROUTINE} '{}' '{}'",
                urlencoding::encode(&entry.command),
                urlencoding::encode(&entry.member)
            );
        }
        let _ = writeln!(out, "{DISPATCH_ROUTINE} \"$@\"");
        out
    }

    /// Parse manifest member text produced by [`Manifest::serialize`].
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        let mut dispatches = false;
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if dispatches {
                return Err(anyhow!(
                    "manifest line {}: unexpected content after dispatch",
                    line_no + 1
                ));
            }
            let words = shell_words::split(line)
                .with_context(|| format!("manifest line {}: tokenize", line_no + 1))?;
            match words.as_slice() {
                [routine, command, member] if routine == REGISTER_ROUTINE => {
                    entries.push(ManifestEntry {
                        command: decode(command, line_no)?,
                        member: decode(member, line_no)?,
                    });
                }
                [routine, args] if routine == DISPATCH_ROUTINE && args == "$@" => {
                    dispatches = true;
                }
                _ => {
                    return Err(anyhow!(
                        "manifest line {}: unrecognized entry {line:?}",
                        line_no + 1
                    ))
                }
            }
        }
        if !dispatches {
            return Err(anyhow!("manifest has no {DISPATCH_ROUTINE} call"));
        }
        Ok(Self { entries })
    }

    /// Usage banner listing every command, one per line.
    pub fn render_usage(&self, program: &str) -> String {
        let mut out = format!("Usage: {program} <command> [args...]\n\nAvailable commands:\n");
        for command in self.commands() {
            let _ = writeln!(out, "  {command}");
        }
        out
    }
}

fn decode(value: &str, line_no: usize) -> Result<String> {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .with_context(|| format!("manifest line {}: decode {value:?}", line_no + 1))
}
