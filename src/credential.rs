//! Bundle password handling.
//!
//! A credential lives only in process memory and is wiped on drop. Its
//! `Debug` output is redacted so it can never reach a log line.
use crate::prologue::PASSWORD_ENV;
use anyhow::{Context, Result};
use dialoguer::Password;
use std::fmt;
use std::io::IsTerminal;
use zeroize::Zeroizing;

pub struct Credential(Zeroizing<String>);

impl Credential {
    /// Wrap a secret; an empty secret means "no password".
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return None;
        }
        Some(Self(Zeroizing::new(secret)))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Where a credential came from, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    Prompt,
}

/// Read the credential from the environment, ignoring empty values.
pub fn from_env() -> Option<Credential> {
    credential_from_lookup(|key| std::env::var(key).ok())
}

fn credential_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Credential> {
    lookup(PASSWORD_ENV).and_then(Credential::new)
}

/// Resolve the build password when `--password` was requested.
///
/// `SCRIPTPACK_PASSWORD` answers the prompt for non-interactive builds.
/// An empty answer disables protection; the caller reports that.
pub fn resolve_build() -> Result<(Option<Credential>, CredentialSource)> {
    if let Some(credential) = from_env() {
        return Ok((Some(credential), CredentialSource::Environment));
    }
    if !std::io::stdin().is_terminal() {
        anyhow::bail!(
            "--password needs an interactive terminal or {PASSWORD_ENV} in the environment"
        );
    }
    let secret = Password::new()
        .with_prompt("Bundle password (empty for none)")
        .allow_empty_password(true)
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()
        .context("read bundle password")?;
    Ok((Credential::new(secret), CredentialSource::Prompt))
}

/// Resolve the run-time password for a protected bundle.
///
/// Returns `None` when no credential is available and no terminal can be
/// prompted; the caller turns that into "password required".
pub fn resolve_runtime() -> Result<Option<(Credential, CredentialSource)>> {
    if let Some(credential) = from_env() {
        return Ok(Some((credential, CredentialSource::Environment)));
    }
    if !std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let secret = Password::new()
        .with_prompt("Password")
        .allow_empty_password(true)
        .interact()
        .context("read bundle password")?;
    Ok(Credential::new(secret).map(|credential| (credential, CredentialSource::Prompt)))
}
