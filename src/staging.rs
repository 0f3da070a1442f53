//! Build-time staging area and atomic artifact publish.
//!
//! Scripts are copied under their basenames into a private temporary
//! directory, so archive member names never carry directories or `..`.
//! The directory is removed when the area is dropped, on success or failure.
use crate::codec::Member;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

pub struct StagingArea {
    dir: TempDir,
    staged: Vec<String>,
}

impl StagingArea {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("scriptpack-stage-")
            .tempdir()
            .context("create staging directory")?;
        tracing::debug!(root = %dir.path().display(), "created staging area");
        Ok(Self {
            dir,
            staged: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Copy `source` into the staging root as `member`.
    pub fn stage_file(&mut self, source: &Path, member: &str) -> Result<PathBuf> {
        let staged_path = self.member_path(member)?;
        fs::copy(source, &staged_path)
            .with_context(|| format!("stage {} as {member}", source.display()))?;
        self.staged.push(member.to_string());
        Ok(staged_path)
    }

    pub fn write_staged_bytes(&mut self, member: &str, bytes: &[u8]) -> Result<()> {
        let staged_path = self.member_path(member)?;
        fs::write(&staged_path, bytes)
            .with_context(|| format!("write {}", staged_path.display()))?;
        self.staged.push(member.to_string());
        Ok(())
    }

    pub fn write_staged_text(&mut self, member: &str, text: &str) -> Result<()> {
        self.write_staged_bytes(member, text.as_bytes())
    }

    /// Read every staged file back, in staging order, then remove the area.
    ///
    /// Members are fully in memory once this returns, so nothing after it
    /// depends on the staging directory.
    pub fn into_members(self) -> Result<Vec<Member>> {
        let members = self
            .staged
            .iter()
            .map(|name| {
                let path = self.root().join(name);
                let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
                Ok(Member::new(name.as_str(), bytes))
            })
            .collect::<Result<Vec<_>>>()?;
        let root = self.dir.path().to_path_buf();
        self.dir
            .close()
            .with_context(|| format!("remove staging directory {}", root.display()))?;
        Ok(members)
    }

    fn member_path(&self, member: &str) -> Result<PathBuf> {
        let rel = Path::new(member);
        let mut components = rel.components();
        match (components.next(), components.next()) {
            (Some(std::path::Component::Normal(_)), None) => Ok(self.root().join(rel)),
            _ => Err(anyhow!("staged member {member:?} must be a plain file name")),
        }
    }
}

/// Write `bytes` to `dest` atomically and mark it executable.
///
/// The bytes land in a temporary file beside `dest` and are renamed into
/// place, so a failed write never leaves a partial artifact at `dest`.
pub fn publish_artifact(bytes: &[u8], dest: &Path) -> Result<()> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = dest
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("bundle");
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("create temporary output in {}", parent.display()))?;
    write_executable(&mut tmp, bytes).with_context(|| format!("write {}", dest.display()))?;
    tmp.persist(dest)
        .map_err(|err| err.error)
        .with_context(|| format!("publish {}", dest.display()))?;
    Ok(())
}

fn write_executable(tmp: &mut NamedTempFile, bytes: &[u8]) -> std::io::Result<()> {
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(0o755))
}
