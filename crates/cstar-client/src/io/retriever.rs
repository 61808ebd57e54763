//! Retriever registry (§4.H), grounded in
//! `original_source/cstar/io/retriever.py`.
//!
//! The original dispatches through an ABC plus a `register_retriever`
//! class-decorator registry; per §9's design note that becomes a closed
//! `match` over [`SourceClassification`] instead — there is no open set of
//! retrievers to register against.

use super::classify::SourceClassification;
use super::source::Source;
use crate::error::{ClientError, Result};
use crate::git;
use cstar_core::log_debug;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const STREAM_CHUNK: usize = 8 * 1024;

pub(crate) fn hex_digest(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

fn basename(location: &str, classification: SourceClassification) -> Result<String> {
    let path = if classification.location_type() == super::classify::LocationType::Http {
        let url = reqwest::Url::parse(location)
            .map_err(|e| ClientError::ClassificationFailed(location.to_string(), e.to_string()))?;
        Path::new(url.path()).to_path_buf()
    } else {
        Path::new(location).to_path_buf()
    };
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            ClientError::ClassificationFailed(
                location.to_string(),
                "could not determine a file name".to_string(),
            )
        })
}

/// `read(source) -> bytes` (§4.H): materialises a file source to memory.
/// Undefined for repositories and directories, matching the original's
/// `RemoteRepositoryRetriever.read` raising `NotImplementedError`.
pub fn read(source: &Source) -> Result<Vec<u8>> {
    match source.classification() {
        SourceClassification::RemoteTextFile | SourceClassification::RemoteBinaryFile => {
            Ok(reqwest::blocking::get(source.location())?.bytes()?.to_vec())
        }
        SourceClassification::LocalTextFile | SourceClassification::LocalBinaryFile => {
            Ok(fs_err::read(source.location())?)
        }
        SourceClassification::RemoteRepository => Err(ClientError::Unimplemented(
            "reading a repository source into memory".to_string(),
        )),
        SourceClassification::LocalDirectory => Err(ClientError::Unimplemented(
            "reading a directory source into memory".to_string(),
        )),
    }
}

/// `save(source, target_dir) -> path` (§4.H): ensures `target_dir` exists,
/// then dispatches to the classification's `_save` behaviour.
pub fn save(source: &Source, target_dir: &Path) -> Result<PathBuf> {
    if target_dir.exists() && !target_dir.is_dir() {
        return Err(ClientError::StageTargetNotADirectory(target_dir.to_path_buf()));
    }

    match source.classification() {
        SourceClassification::RemoteRepository => {
            save_repository(source, target_dir)?;
            return Ok(target_dir.to_path_buf());
        }
        _ => fs_err::create_dir_all(target_dir)?,
    }

    let name = basename(source.location(), source.classification())?;
    let dest = target_dir.join(&name);

    match source.classification() {
        SourceClassification::RemoteTextFile => save_remote_text(source, &dest)?,
        SourceClassification::RemoteBinaryFile => save_remote_binary(source, &dest)?,
        SourceClassification::LocalTextFile | SourceClassification::LocalBinaryFile => {
            save_local_file(source, &dest)?
        }
        SourceClassification::RemoteRepository | SourceClassification::LocalDirectory => {
            unreachable!("handled above or unsupported")
        }
    }

    Ok(dest)
}

fn save_remote_text(source: &Source, dest: &Path) -> Result<()> {
    let body = reqwest::blocking::get(source.location())?.text()?;
    fs_err::write(dest, body)?;
    Ok(())
}

/// Streams the response body in 8 KiB chunks (§4.H), hashing as it goes, and
/// verifies against `source.identifier()` case-insensitively when present —
/// deleting the partial file on mismatch (§7 Integrity policy).
fn save_remote_binary(source: &Source, dest: &Path) -> Result<()> {
    let mut response = reqwest::blocking::get(source.location())?;
    let mut file = fs_err::File::create(dest)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; STREAM_CHUNK];

    loop {
        let n = response.read(&mut buf)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        hasher.update(&buf[..n]);
    }
    drop(file);

    if let Some(expected) = source.identifier() {
        let actual = hex_digest(&hasher.finalize());
        if !actual.eq_ignore_ascii_case(expected) {
            let _ = fs_err::remove_file(dest);
            return Err(ClientError::Core(cstar_core::CStarError::Integrity {
                location: source.location().to_string(),
                expected: expected.to_string(),
                actual,
            }));
        }
    }

    Ok(())
}

/// Metadata-preserving copy (`copy2` in the original): `std::fs::copy`
/// already carries over permission bits; the modification time is replayed
/// explicitly since the standard copy does not preserve it.
fn save_local_file(source: &Source, dest: &Path) -> Result<()> {
    let src_path = Path::new(source.location());
    fs_err::copy(src_path, dest)?;
    if let Ok(metadata) = fs_err::metadata(src_path) {
        if let Ok(modified) = metadata.modified() {
            if let Ok(dest_file) = fs_err::OpenOptions::new().write(true).open(dest) {
                let _ = dest_file.set_modified(modified);
            }
        }
    }
    Ok(())
}

/// Remote repository `_save` (§4.H): fails on a non-empty target, clones,
/// then checks out `identifier` if given.
fn save_repository(source: &Source, target_dir: &Path) -> Result<()> {
    if target_dir.exists() {
        let non_empty = fs_err::read_dir(target_dir)?.next().is_some();
        if non_empty {
            return Err(ClientError::StageTargetNotEmpty(target_dir.to_path_buf()));
        }
    }

    log_debug!("Cloning repository source {} into {}", source.location(), target_dir.display());
    git::clone(source.location(), target_dir)?;
    if let Some(target) = source.identifier() {
        git::checkout(target_dir, target)?;
    }
    Ok(())
}
