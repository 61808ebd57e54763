//! Stager registry (§4.I), grounded in the behavioural description in the
//! distilled spec itself — `original_source/cstar/io/stager.py` is an
//! unfinished stub in the original (every `stage()` raises
//! `NotImplementedError`), so this module is built from §4.I's prose plus
//! the working logic of `retriever.py` and `staged_data.py`.

use super::classify::SourceClassification;
use super::retriever;
use super::source::Source;
use super::staged::{repo_diverged_from, StagedFile, StagedHandle, StagedRepository};
use crate::error::{ClientError, Result};
use crate::git;
use cstar_core::error::CStarError;
use cstar_core::log_debug;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

fn sha256_file(path: &Path) -> Result<String> {
    let bytes = fs_err::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(retriever::hex_digest(&hasher.finalize()))
}

/// Per-classification stager (§9: static dispatch over a closed enum rather
/// than a runtime registry keyed by classification tag). File stagers
/// pre-populate the cached hash from `source.identifier()` when a remote
/// binary download already verified it, avoiding a redundant re-hash.
pub fn stage(source: &Source, target_dir: &Path) -> Result<StagedHandle> {
    match source.classification() {
        SourceClassification::RemoteTextFile
        | SourceClassification::LocalTextFile
        | SourceClassification::LocalBinaryFile => {
            let dest = retriever::save(source, target_dir)?;
            let sha256 = sha256_file(&dest)?;
            Ok(StagedHandle::File(StagedFile::new(source.clone(), dest, sha256)?))
        }
        SourceClassification::RemoteBinaryFile => {
            let dest = retriever::save(source, target_dir)?;
            let sha256 = match source.identifier() {
                Some(identifier) => identifier.to_lowercase(),
                None => sha256_file(&dest)?,
            };
            Ok(StagedHandle::File(StagedFile::new(source.clone(), dest, sha256)?))
        }
        SourceClassification::RemoteRepository => {
            retriever::save(source, target_dir)?;
            Ok(StagedHandle::Repository(StagedRepository::new(
                source.clone(),
                target_dir.to_path_buf(),
            )?))
        }
        SourceClassification::LocalDirectory => Err(ClientError::Unimplemented(
            "staging a local directory source".to_string(),
        )),
    }
}

static CACHE_LOCKS: Lazy<Mutex<BTreeMap<String, Arc<Mutex<()>>>>> =
    Lazy::new(|| Mutex::new(BTreeMap::new()));

fn lock_for(slug: &str) -> Arc<Mutex<()>> {
    let mut locks = CACHE_LOCKS.lock().unwrap_or_else(|poison| poison.into_inner());
    locks.entry(slug.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
}

/// Marker file recording the HEAD hash at the time the cache directory was
/// last (re)populated — this, not a live `ls-remote`, is what the cached
/// stager's freshness check compares against (§12.1).
fn sentinel_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(".cstar_cache_head")
}

fn read_sentinel(cache_dir: &Path) -> Option<String> {
    fs_err::read_to_string(sentinel_path(cache_dir)).ok().map(|s| s.trim().to_string())
}

fn write_sentinel(cache_dir: &Path, hash: &str) -> Result<()> {
    fs_err::write(sentinel_path(cache_dir), hash)?;
    Ok(())
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    fs_err::create_dir_all(dest)?;
    for entry in walkdir::WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).expect("walkdir yields children of src");
        if relative.starts_with(".git") || relative == Path::new(".cstar_cache_head") {
            continue;
        }
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs_err::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs_err::create_dir_all(parent)?;
            }
            fs_err::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Cached remote-repository stager (§4.I "Cached remote-repository
/// stager"): maintains one clone per repository URL under the state-home
/// cache, reusing it across calls instead of re-cloning. Concurrent callers
/// for the same URL serialize on a per-slug lock so only one populates the
/// cache.
pub fn stage_cached_repository(source: &Source, target_dir: &Path) -> Result<StagedHandle> {
    if source.classification() != SourceClassification::RemoteRepository {
        return Err(ClientError::Core(CStarError::Validation(format!(
            "'{}' is not a repository source; the cached repository stager does not apply",
            source.location()
        ))));
    }

    let cache_dir = cstar_core::paths::repo_cache_dir(source.location());
    let slug = cstar_core::paths::slugify_repo_url(source.location());
    let repo_lock = lock_for(&slug);
    let _guard = repo_lock.lock().unwrap_or_else(|poison| poison.into_inner());

    let needs_populate = match read_sentinel(&cache_dir) {
        None => true,
        Some(cached_hash) => repo_diverged_from(&cache_dir, &cached_hash)?,
    };

    if needs_populate {
        if cache_dir.exists() {
            fs_err::remove_dir_all(&cache_dir)?;
        }
        if let Some(parent) = cache_dir.parent() {
            fs_err::create_dir_all(parent)?;
        }
        log_debug!("Populating repository cache for {} at {}", source.location(), cache_dir.display());
        git::clone(source.location(), &cache_dir)?;
        if let Some(target) = source.identifier() {
            git::checkout(&cache_dir, target)?;
        }
        let head = git::get_repo_head_hash(&cache_dir)?;
        write_sentinel(&cache_dir, &head)?;
    }

    copy_dir_recursive(&cache_dir, target_dir)?;
    Ok(StagedHandle::Repository(StagedRepository::new(
        source.clone(),
        target_dir.to_path_buf(),
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn stages_local_text_file_with_matching_hash() {
        let src_dir = tempdir().unwrap();
        let src_path = src_dir.path().join("notes.txt");
        fs::write(&src_path, "hello from a staged file").unwrap();

        let target = tempdir().unwrap();
        let source = Source::new(src_path.to_str().unwrap(), None).unwrap();
        let handle = stage(&source, target.path()).unwrap();

        match handle {
            StagedHandle::File(f) => {
                assert_eq!(f.path(), target.path().join("notes.txt"));
                assert!(!f.changed_from_source().unwrap());
            }
            StagedHandle::Repository(_) => panic!("expected a file handle"),
        }
    }

    #[test]
    fn rejects_non_repository_sources_for_cached_stager() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "text").unwrap();
        let source = Source::new(path.to_str().unwrap(), None).unwrap();
        let target = tempdir().unwrap();
        let err = stage_cached_repository(&source, target.path()).unwrap_err();
        assert!(matches!(err, ClientError::Core(CStarError::Validation(_))));
    }
}
