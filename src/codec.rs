//! Zip archive codec for bundle payloads.
//!
//! Archives are located from their trailing central directory, so readers
//! accept any number of leading bytes (the executable prologue) before the
//! first member.
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use zip::result::ZipError;
use zip::unstable::write::FileOptionsExt;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// One named byte stream stored in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Member {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("member {0:?} not found in archive")]
    MemberNotFound(String),
    #[error("member {0:?} is encrypted and the password is missing or incorrect")]
    WrongPassword(String),
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),
    #[error("failed to write archive member {name:?}")]
    Pack {
        name: String,
        #[source]
        source: ZipError,
    },
}

/// Pack members into an archive written directly after `prefix`.
///
/// Offsets recorded in the archive are absolute within the returned buffer,
/// so readers that trust the central directory need no offset correction.
/// An empty password packs the members unencrypted.
pub fn pack_onto(
    prefix: Vec<u8>,
    members: &[Member],
    password: Option<&str>,
) -> Result<Vec<u8>, CodecError> {
    let password = password.filter(|value| !value.is_empty());
    let mut cursor = Cursor::new(prefix);
    cursor
        .seek(SeekFrom::End(0))
        .map_err(|err| pack_error("<prefix>", ZipError::Io(err)))?;

    let mut zip = ZipWriter::new(cursor);
    let base = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);
    let options = match password {
        Some(password) => base.with_deprecated_encryption(password.as_bytes()),
        None => base,
    };

    for member in members {
        zip.start_file(member.name.as_str(), options)
            .map_err(|err| pack_error(&member.name, err))?;
        zip.write_all(&member.bytes)
            .map_err(|err| pack_error(&member.name, ZipError::Io(err)))?;
        tracing::debug!(
            member = %member.name,
            bytes = member.bytes.len(),
            encrypted = password.is_some(),
            "packed archive member"
        );
    }

    let cursor = zip.finish().map_err(|err| pack_error("<finish>", err))?;
    Ok(cursor.into_inner())
}

/// Extract one member by name, tolerating leading non-archive bytes.
pub fn extract_member(
    archive_bytes: &[u8],
    name: &str,
    password: Option<&str>,
) -> Result<Vec<u8>, CodecError> {
    ArchiveReader::open(archive_bytes)?.extract(name, password)
}

fn pack_error(name: &str, source: ZipError) -> CodecError {
    CodecError::Pack {
        name: name.to_string(),
        source,
    }
}

/// Read-only view of an archive held in memory.
pub struct ArchiveReader<'a> {
    bytes: &'a [u8],
    archive: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> ArchiveReader<'a> {
    pub fn open(bytes: &'a [u8]) -> Result<Self, CodecError> {
        let archive = ZipArchive::new(Cursor::new(bytes)).map_err(corrupt)?;
        Ok(Self { bytes, archive })
    }

    pub fn is_encrypted(&mut self, name: &str) -> Result<bool, CodecError> {
        let index = self.index_of(name)?;
        let file = self.archive.by_index_raw(index).map_err(corrupt)?;
        Ok(file.encrypted())
    }

    /// Bytes preceding the first member's local header.
    pub fn prefix(&mut self) -> Result<&'a [u8], CodecError> {
        let mut start = self.bytes.len() as u64;
        for index in 0..self.archive.len() {
            let file = self.archive.by_index_raw(index).map_err(corrupt)?;
            start = start.min(file.header_start());
        }
        let start = usize::try_from(start)
            .map_err(|_| CodecError::CorruptArchive("member offset out of range".to_string()))?;
        let bytes: &'a [u8] = self.bytes;
        Ok(&bytes[..start.min(bytes.len())])
    }

    /// Extract a member completely before returning any of it.
    ///
    /// A wrong ZipCrypto password can slip past the one-byte header check; the
    /// CRC check at end of stream then fails and nothing is returned.
    pub fn extract(&mut self, name: &str, password: Option<&str>) -> Result<Vec<u8>, CodecError> {
        let index = self.index_of(name)?;
        let encrypted = self.is_encrypted(name)?;
        let mut file = if encrypted {
            let password = password
                .filter(|value| !value.is_empty())
                .ok_or_else(|| CodecError::WrongPassword(name.to_string()))?;
            match self.archive.by_index_decrypt(index, password.as_bytes()) {
                Ok(file) => file,
                Err(ZipError::InvalidPassword) => {
                    return Err(CodecError::WrongPassword(name.to_string()))
                }
                Err(err) => return Err(corrupt(err)),
            }
        } else {
            self.archive.by_index(index).map_err(corrupt)?
        };

        let mut bytes = Vec::new();
        if let Err(err) = file.read_to_end(&mut bytes) {
            return Err(if encrypted {
                CodecError::WrongPassword(name.to_string())
            } else {
                CodecError::CorruptArchive(format!("read {name}: {err}"))
            });
        }
        Ok(bytes)
    }

    fn index_of(&self, name: &str) -> Result<usize, CodecError> {
        self.archive
            .index_for_name(name)
            .ok_or_else(|| CodecError::MemberNotFound(name.to_string()))
    }
}

fn corrupt(err: ZipError) -> CodecError {
    CodecError::CorruptArchive(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack(members: &[Member], password: Option<&str>) -> Result<Vec<u8>, CodecError> {
        pack_onto(Vec::new(), members, password)
    }

    fn sample_members() -> Vec<Member> {
        vec![
            Member::new("speak.sh", "echo \"$1\"\n"),
            Member::new("moo.sh", "echo moo\n"),
        ]
    }

    #[test]
    fn round_trips_without_password() {
        let archive = pack(&sample_members(), None).expect("pack");
        let bytes = extract_member(&archive, "speak.sh", None).expect("extract");
        assert_eq!(bytes, b"echo \"$1\"\n");
    }

    #[test]
    fn round_trips_with_password() {
        let archive = pack(&sample_members(), Some("secret")).expect("pack");
        let bytes = extract_member(&archive, "moo.sh", Some("secret")).expect("extract");
        assert_eq!(bytes, b"echo moo\n");
    }

    #[test]
    fn wrong_password_fails_without_bytes() {
        let archive = pack(&sample_members(), Some("secret")).expect("pack");
        let err = extract_member(&archive, "speak.sh", Some("wrong")).unwrap_err();
        assert!(matches!(err, CodecError::WrongPassword(name) if name == "speak.sh"));
    }

    #[test]
    fn missing_password_is_reported_as_wrong_password() {
        let archive = pack(&sample_members(), Some("secret")).expect("pack");
        let err = extract_member(&archive, "speak.sh", None).unwrap_err();
        assert!(matches!(err, CodecError::WrongPassword(_)));
        let err = extract_member(&archive, "speak.sh", Some("")).unwrap_err();
        assert!(matches!(err, CodecError::WrongPassword(_)));
    }

    #[test]
    fn empty_password_packs_unencrypted() {
        let archive = pack(&sample_members(), Some("")).expect("pack");
        let mut reader = ArchiveReader::open(&archive).expect("open");
        assert!(!reader.is_encrypted("moo.sh").expect("lookup"));
    }

    #[test]
    fn missing_member_is_reported() {
        let archive = pack(&sample_members(), None).expect("pack");
        let err = extract_member(&archive, "bark.sh", None).unwrap_err();
        assert!(matches!(err, CodecError::MemberNotFound(name) if name == "bark.sh"));
    }

    #[test]
    fn tolerates_leading_bytes_on_plain_concatenation() {
        let archive = pack(&sample_members(), Some("secret")).expect("pack");
        let mut bundle = b"#!/bin/sh\necho not an archive\nexit 1\n".to_vec();
        bundle.extend_from_slice(&archive);
        let bytes = extract_member(&bundle, "speak.sh", Some("secret")).expect("extract");
        assert_eq!(bytes, b"echo \"$1\"\n");
    }

    #[test]
    fn pack_onto_keeps_prefix_and_reports_it() {
        let prefix = b"#!/usr/bin/env bash\nexit 1\n".to_vec();
        let bundle = pack_onto(prefix.clone(), &sample_members(), None).expect("pack");
        assert!(bundle.starts_with(&prefix));

        let mut reader = ArchiveReader::open(&bundle).expect("open");
        assert_eq!(reader.prefix().expect("prefix"), prefix.as_slice());
        let mut names: Vec<&str> = reader.archive.file_names().collect();
        names.sort_unstable();
        assert_eq!(names, ["moo.sh", "speak.sh"]);
        assert_eq!(
            reader.extract("moo.sh", None).expect("extract"),
            b"echo moo\n"
        );
    }

    #[test]
    fn garbage_is_a_corrupt_archive() {
        let err = extract_member(b"definitely not a zip file", "speak.sh", None).unwrap_err();
        assert!(matches!(err, CodecError::CorruptArchive(_)));
    }
}
