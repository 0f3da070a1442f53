//! Native bundle runtime.
//!
//! Runs a bundle the same way its embedded prologue does, without needing
//! `unzip`: read the artifact, resolve the credential, load the manifest,
//! then hand the selected member to a fresh interpreter as its command
//! string, with argv[0] and `$0` set to the script's original basename.
//! The script inherits the caller's stdin. Nothing is written to disk.
use crate::codec::{self, ArchiveReader, CodecError};
use crate::credential::{self, Credential};
use crate::manifest::{Manifest, MANIFEST_MEMBER};
use crate::prologue::{self, INTERPRETER, PASSWORD_ENV, SELF_ENV};
use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

/// Exit status for usage errors and unknown commands.
pub const USAGE_EXIT_CODE: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{0} is required to run bundled scripts but was not found in PATH")]
    MissingDependency(&'static str),
    #[error("Password required but not provided (set SCRIPTPACK_PASSWORD)")]
    PasswordRequired,
    #[error("Invalid password")]
    InvalidPassword,
    #[error("bundled script not found: {0}")]
    MemberNotFound(String),
    #[error("corrupt bundle {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

/// Outcome of matching argv against the manifest.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution<'m> {
    Exec {
        member: &'m str,
        args: &'m [String],
    },
    Usage {
        invalid: Option<&'m str>,
    },
}

/// Match `args[0]` against the manifest.
pub fn resolve<'m>(manifest: &'m Manifest, args: &'m [String]) -> Resolution<'m> {
    let Some((command, rest)) = args.split_first() else {
        return Resolution::Usage { invalid: None };
    };
    match manifest.lookup(command) {
        Some(entry) => Resolution::Exec {
            member: entry.member.as_str(),
            args: rest,
        },
        None => Resolution::Usage {
            invalid: Some(command.as_str()),
        },
    }
}

/// An opened bundle artifact.
pub struct Bundle {
    path: PathBuf,
    bytes: Vec<u8>,
    protected: bool,
}

impl Bundle {
    /// Read the artifact and its frozen protection flag.
    pub fn open(path: &Path) -> Result<Self> {
        let path = path
            .canonicalize()
            .with_context(|| format!("resolve bundle path {}", path.display()))?;
        let bytes = fs::read(&path).with_context(|| format!("read bundle {}", path.display()))?;
        let protected = {
            let mut reader =
                ArchiveReader::open(&bytes).map_err(|err| codec_error(&path, err))?;
            let prefix = reader.prefix().map_err(|err| codec_error(&path, err))?;
            match prologue::parse_protected(prefix) {
                Some(flag) => flag,
                None => reader
                    .is_encrypted(MANIFEST_MEMBER)
                    .map_err(|err| codec_error(&path, err))?,
            }
        };
        tracing::debug!(bundle = %path.display(), protected, "opened bundle");
        Ok(Self {
            path,
            bytes,
            protected,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// Extract and parse the manifest member.
    pub fn manifest(&self, credential: Option<&Credential>) -> Result<Manifest> {
        let bytes = self.extract(MANIFEST_MEMBER, credential)?;
        let text = String::from_utf8(bytes).context("manifest is not UTF-8")?;
        Manifest::parse(&text).with_context(|| format!("parse manifest of {}", self.path.display()))
    }

    /// Extract one member, mapping codec failures to runtime errors.
    pub fn extract(&self, member: &str, credential: Option<&Credential>) -> Result<Vec<u8>> {
        let password = credential.map(Credential::expose);
        codec::extract_member(&self.bytes, member, password).map_err(|err| match err {
            CodecError::WrongPassword(_) if password.is_none() => {
                DispatchError::PasswordRequired.into()
            }
            other => codec_error(&self.path, other),
        })
    }
}

fn codec_error(path: &Path, err: CodecError) -> anyhow::Error {
    match err {
        CodecError::WrongPassword(_) => DispatchError::InvalidPassword.into(),
        CodecError::MemberNotFound(name) => DispatchError::MemberNotFound(name).into(),
        CodecError::CorruptArchive(reason) => DispatchError::Corrupt {
            path: path.to_path_buf(),
            reason,
        }
        .into(),
        other => anyhow::Error::new(other),
    }
}

/// Resolve the run-time credential for `bundle`.
pub fn resolve_credential(bundle: &Bundle) -> Result<Option<Credential>> {
    if !bundle.is_protected() {
        return Ok(credential::from_env());
    }
    match credential::resolve_runtime()? {
        Some((credential, source)) => {
            tracing::debug!(?source, "resolved bundle credential");
            Ok(Some(credential))
        }
        None => Err(DispatchError::PasswordRequired.into()),
    }
}

/// Run `args` against the bundle at `path`; returns the exit code.
pub fn run(path: &Path, args: &[String]) -> Result<i32> {
    let interpreter =
        which::which(INTERPRETER).map_err(|_| DispatchError::MissingDependency(INTERPRETER))?;
    let bundle = Bundle::open(path)?;
    let credential = resolve_credential(&bundle)?;
    let manifest = bundle.manifest(credential.as_ref())?;

    match resolve(&manifest, args) {
        Resolution::Usage { invalid } => {
            let program = program_name(bundle.path());
            let mut stderr = io::stderr().lock();
            if let Some(command) = invalid {
                writeln!(stderr, "Invalid command: {command}")?;
            }
            write!(stderr, "{}", manifest.render_usage(&program))?;
            Ok(USAGE_EXIT_CODE)
        }
        Resolution::Exec { member, args } => {
            let script = bundle.extract(member, credential.as_ref())?;
            let status = exec_script(
                &interpreter,
                &bundle,
                member,
                &script,
                args,
                credential.as_ref(),
            )?;
            Ok(exit_code(status))
        }
    }
}

fn program_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Run `script` as `bash -c` under `member`'s basename.
fn exec_script(
    interpreter: &Path,
    bundle: &Bundle,
    member: &str,
    script: &[u8],
    args: &[String],
    credential: Option<&Credential>,
) -> Result<ExitStatus> {
    let name = member.rsplit('/').next().unwrap_or(member);
    let mut command = Command::new(interpreter);
    command
        .arg0(name)
        .arg("-c")
        .arg(OsStr::from_bytes(script))
        .arg(name)
        .args(args)
        .env(SELF_ENV, bundle.path())
        .envs(prologue::exported_functions());
    match credential {
        Some(credential) => command.env(PASSWORD_ENV, credential.expose()),
        None => command.env_remove(PASSWORD_ENV),
    };

    tracing::info!(member, args = args.len(), "dispatching bundled script");
    command
        .status()
        .with_context(|| format!("run {} for {member}", interpreter.display()))
}

fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestEntry;

    fn manifest() -> Manifest {
        Manifest::new(vec![
            ManifestEntry {
                command: "speak".to_string(),
                member: "speak.sh".to_string(),
            },
            ManifestEntry {
                command: "moo".to_string(),
                member: "moo.sh".to_string(),
            },
        ])
    }

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn empty_argv_shows_usage() {
        let manifest = manifest();
        let args = argv(&[]);
        assert_eq!(
            resolve(&manifest, &args),
            Resolution::Usage { invalid: None }
        );
    }

    #[test]
    fn unknown_command_is_reported() {
        let manifest = manifest();
        let args = argv(&["bark", "loud"]);
        assert_eq!(
            resolve(&manifest, &args),
            Resolution::Usage {
                invalid: Some("bark")
            }
        );
    }

    #[test]
    fn known_command_passes_remaining_args() {
        let manifest = manifest();
        let args = argv(&["speak", "hi", "--there"]);
        assert_eq!(
            resolve(&manifest, &args),
            Resolution::Exec {
                member: "speak.sh",
                args: &args[1..],
            }
        );
    }

    #[test]
    fn signals_map_to_shell_exit_codes() {
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
    }
}
