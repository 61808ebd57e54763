//! `Source`, the immutable record of §3 "Source", grounded in
//! `original_source/cstar/io/source_data.py`'s `SourceData`.

use super::classify::{classify, SourceClassification};
use super::staged::StagedHandle;
use super::stager;
use crate::error::Result;
use std::path::Path;

/// A location plus an optional identifier (a SHA-256 digest for a file, or a
/// git ref/tag/hash for a repository). Classification is computed once, at
/// construction, and never re-evaluated — unlike the original's
/// `@cached_property`s, which defer the git/HTTP probes until first access,
/// but arrive at the same "compute once" contract described in §3.
#[derive(Debug, Clone)]
pub struct Source {
    location: String,
    identifier: Option<String>,
    classification: SourceClassification,
}

impl Source {
    pub fn new(location: impl Into<String>, identifier: Option<String>) -> Result<Self> {
        let location = location.into();
        let classification = classify(&location)?;
        Ok(Source { location, identifier, classification })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn classification(&self) -> SourceClassification {
        self.classification
    }

    /// `SourceData.get` (§4.G): stages this source into `target_dir` and
    /// returns the tracking handle.
    pub fn get(&self, target_dir: &Path) -> Result<StagedHandle> {
        stager::stage(self, target_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn construction_caches_classification() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "text content").unwrap();
        let source = Source::new(path.to_str().unwrap(), None).unwrap();
        assert_eq!(source.classification(), SourceClassification::LocalTextFile);
        assert_eq!(source.location(), path.to_str().unwrap());
        assert!(source.identifier().is_none());
    }
}
