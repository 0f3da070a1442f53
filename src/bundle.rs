//! Bundle assembly: validate inputs, stage scripts, pack, publish.
use crate::codec;
use crate::commands::CommandSpec;
use crate::credential::Credential;
use crate::manifest::{Manifest, ManifestEntry, MANIFEST_MEMBER};
use crate::prologue;
use crate::staging::{publish_artifact, StagingArea};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Build-time input errors. All are reported before anything is written.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("no commands given (use --commands or --config)")]
    NoCommands,
    #[error("script for command {command:?} not found: {}", path.display())]
    MissingSource { command: String, path: PathBuf },
    #[error("script for command {command:?} is not readable: {}: {reason}", path.display())]
    UnreadableSource {
        command: String,
        path: PathBuf,
        reason: String,
    },
    #[error("scripts {} and {} share the basename {basename:?}", first.display(), second.display())]
    DuplicateBasename {
        basename: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("script {} has a basename that cannot be an archive member name", path.display())]
    InvalidMemberName { path: PathBuf },
    #[error("{kind} {name:?} collides with the reserved manifest member name")]
    ReservedName { kind: &'static str, name: String },
    #[error("output {} already exists (use --force to overwrite)", .0.display())]
    OutputExists(PathBuf),
}

/// Inputs that passed validation, ready to assemble.
#[derive(Debug)]
pub struct BuildPlan {
    commands: CommandSpec,
    manifest: Manifest,
    output: PathBuf,
}

impl BuildPlan {
    pub fn output(&self) -> &Path {
        &self.output
    }
}

/// What a successful build produced.
#[derive(Debug, Serialize)]
pub struct BuildSummary {
    pub output: PathBuf,
    pub protected: bool,
    pub bytes: usize,
    pub commands: Vec<ManifestEntry>,
}

/// Check build preconditions in order; the first failure wins.
///
/// 1. every script exists and is readable
/// 2. script basenames are unique and usable as member names
/// 3. no command or basename is the reserved manifest name
/// 4. the output does not exist unless `force` is set
pub fn validate(
    commands: CommandSpec,
    output: &Path,
    force: bool,
) -> Result<BuildPlan, ValidationError> {
    if commands.is_empty() {
        return Err(ValidationError::NoCommands);
    }

    for entry in commands.entries() {
        if !entry.source.is_file() {
            return Err(ValidationError::MissingSource {
                command: entry.name.clone(),
                path: entry.source.clone(),
            });
        }
        if let Err(err) = fs::File::open(&entry.source) {
            return Err(ValidationError::UnreadableSource {
                command: entry.name.clone(),
                path: entry.source.clone(),
                reason: err.to_string(),
            });
        }
    }

    let mut seen: BTreeMap<&str, &Path> = BTreeMap::new();
    let mut entries = Vec::with_capacity(commands.len());
    for entry in commands.entries() {
        let basename = entry
            .basename()
            .filter(|name| is_member_name(name))
            .ok_or_else(|| ValidationError::InvalidMemberName {
                path: entry.source.clone(),
            })?;
        if let Some(first) = seen.insert(basename, &entry.source) {
            return Err(ValidationError::DuplicateBasename {
                basename: basename.to_string(),
                first: first.to_path_buf(),
                second: entry.source.clone(),
            });
        }
        entries.push(ManifestEntry {
            command: entry.name.clone(),
            member: basename.to_string(),
        });
    }

    for entry in commands.entries() {
        if entry.name == MANIFEST_MEMBER {
            return Err(ValidationError::ReservedName {
                kind: "command",
                name: entry.name.clone(),
            });
        }
        if entry.basename() == Some(MANIFEST_MEMBER) {
            return Err(ValidationError::ReservedName {
                kind: "script basename",
                name: MANIFEST_MEMBER.to_string(),
            });
        }
    }

    if output.exists() && !force {
        return Err(ValidationError::OutputExists(output.to_path_buf()));
    }

    Ok(BuildPlan {
        manifest: Manifest::new(entries),
        commands,
        output: output.to_path_buf(),
    })
}

/// Member names are handed to `unzip` as patterns at run time, so pattern
/// metacharacters and leading dashes are refused.
fn is_member_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && !name.contains(['*', '?', '[', ']', '\\'])
        && !name.chars().any(char::is_control)
}

/// Assemble and publish the bundle described by `plan`.
pub fn assemble(plan: &BuildPlan, password: Option<&Credential>) -> Result<BuildSummary> {
    if which::which("unzip").is_err() {
        tracing::warn!("unzip not found in PATH; the bundle will need it at run time");
    }

    let mut staging = StagingArea::new()?;
    staging.write_staged_text(MANIFEST_MEMBER, &plan.manifest.serialize())?;
    for (entry, manifest_entry) in plan.commands.entries().iter().zip(plan.manifest.entries()) {
        staging.stage_file(&entry.source, &manifest_entry.member)?;
    }
    let members = staging.into_members()?;

    let protected = password.is_some();
    let prologue = prologue::render(protected);
    let bytes = codec::pack_onto(
        prologue.into_bytes(),
        &members,
        password.map(Credential::expose),
    )
    .context("pack bundle archive")?;

    publish_artifact(&bytes, &plan.output)?;

    tracing::info!(
        output = %plan.output.display(),
        members = members.len(),
        bytes = bytes.len(),
        protected,
        "bundle written"
    );
    Ok(BuildSummary {
        output: plan.output.clone(),
        protected,
        bytes: bytes.len(),
        commands: plan.manifest.entries().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::parse_command_list;
    use tempfile::TempDir;

    fn scripts_dir() -> TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("speak.sh"), "echo \"speak: $1\"\n").expect("write");
        fs::write(dir.path().join("moo.sh"), "echo moo\n").expect("write");
        fs::create_dir(dir.path().join("other")).expect("mkdir");
        fs::write(dir.path().join("other/speak.sh"), "echo other\n").expect("write");
        dir
    }

    fn spec(dir: &TempDir, list: &str) -> CommandSpec {
        parse_command_list(list)
            .expect("parse")
            .resolve_against(dir.path())
    }

    #[test]
    fn missing_source_is_reported_first() {
        let dir = scripts_dir();
        let commands = spec(&dir, "a:missing.sh,b:speak.sh,c:other/speak.sh");
        let err = validate(commands, &dir.path().join("out"), false).unwrap_err();
        assert!(matches!(err, ValidationError::MissingSource { command, .. } if command == "a"));
    }

    #[test]
    fn duplicate_basenames_fail_even_with_distinct_commands() {
        let dir = scripts_dir();
        let commands = spec(&dir, "speak:speak.sh,yell:other/speak.sh");
        let err = validate(commands, &dir.path().join("out"), false).unwrap_err();
        assert!(
            matches!(err, ValidationError::DuplicateBasename { basename, .. } if basename == "speak.sh")
        );
    }

    #[test]
    fn reserved_command_name_is_rejected() {
        let dir = scripts_dir();
        let commands = spec(&dir, "__manifest__:speak.sh");
        let err = validate(commands, &dir.path().join("out"), false).unwrap_err();
        assert!(matches!(err, ValidationError::ReservedName { kind: "command", .. }));
    }

    #[test]
    fn reserved_basename_is_rejected() {
        let dir = scripts_dir();
        fs::write(dir.path().join("__manifest__"), "echo hi\n").expect("write");
        let commands = spec(&dir, "hi:__manifest__");
        let err = validate(commands, &dir.path().join("out"), false).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::ReservedName {
                kind: "script basename",
                ..
            }
        ));
    }

    #[test]
    fn pattern_characters_in_basenames_are_rejected() {
        let dir = scripts_dir();
        fs::write(dir.path().join("star*.sh"), "echo\n").expect("write");
        let commands = spec(&dir, "star:star*.sh");
        let err = validate(commands, &dir.path().join("out"), false).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidMemberName { .. }));
    }

    #[test]
    fn existing_output_needs_force() {
        let dir = scripts_dir();
        let output = dir.path().join("out");
        fs::write(&output, "old").expect("write");
        let err = validate(spec(&dir, "speak:speak.sh"), &output, false).unwrap_err();
        assert!(matches!(err, ValidationError::OutputExists(_)));
        assert!(validate(spec(&dir, "speak:speak.sh"), &output, true).is_ok());
    }

    #[test]
    fn assembled_bundle_is_prologue_plus_archive() {
        let dir = scripts_dir();
        let output = dir.path().join("tools");
        let plan = validate(spec(&dir, "speak:speak.sh,moo:moo.sh"), &output, false)
            .expect("validate");
        let summary = assemble(&plan, None).expect("assemble");
        assert!(!summary.protected);
        assert_eq!(summary.commands.len(), 2);

        let bytes = fs::read(&output).expect("read bundle");
        assert!(bytes.starts_with(prologue::render(false).as_bytes()));
        let manifest = codec::extract_member(&bytes, MANIFEST_MEMBER, None).expect("manifest");
        let manifest = Manifest::parse(&String::from_utf8_lossy(&manifest)).expect("parse");
        assert_eq!(manifest, plan.manifest);
        assert_eq!(
            codec::extract_member(&bytes, "speak.sh", None).expect("speak"),
            b"echo \"speak: $1\"\n"
        );
    }

    #[test]
    fn protected_bundle_needs_the_password() {
        let dir = scripts_dir();
        let output = dir.path().join("tools");
        let plan = validate(spec(&dir, "moo:moo.sh"), &output, false).expect("validate");
        let password = Credential::new("secret").expect("credential");
        let summary = assemble(&plan, Some(&password)).expect("assemble");
        assert!(summary.protected);

        let bytes = fs::read(&output).expect("read bundle");
        assert!(bytes.starts_with(prologue::render(true).as_bytes()));
        assert!(matches!(
            codec::extract_member(&bytes, "moo.sh", Some("wrong")),
            Err(codec::CodecError::WrongPassword(_))
        ));
        assert_eq!(
            codec::extract_member(&bytes, "moo.sh", Some("secret")).expect("moo"),
            b"echo moo\n"
        );
    }
}
