use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::Builder;

use crate::error::PipelineError;

/// On-disk layout of everything the pipeline caches between runs.
#[derive(Debug, Clone)]
pub struct Store {
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, PipelineError> {
        let cache_root = default_cache_root()?;
        Ok(Self { cache_root })
    }

    pub fn new_with_root(cache_root: Utf8PathBuf) -> Self {
        Self { cache_root }
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn xref_cache_path(&self, namespace: &str) -> Utf8PathBuf {
        self.cache_root
            .join("xref")
            .join(format!("{}.json", sanitize(namespace)))
    }

    pub fn fetch_dir(&self, namespace: &str) -> Utf8PathBuf {
        self.cache_root.join("fetch").join(sanitize(namespace))
    }

    pub fn fetch_entry_path(&self, namespace: &str, id: &str) -> Utf8PathBuf {
        self.fetch_dir(namespace)
            .join(format!("{}.json", sanitize(id)))
    }

    pub fn listing_path(&self) -> Utf8PathBuf {
        self.cache_root.join("listing").join("latest-versions.json")
    }

    pub fn ledger_path(&self) -> Utf8PathBuf {
        self.cache_root.join("versions").join("ledger.json")
    }

    /// Directory holding one cache namespace; `None` for unknown names.
    pub fn namespace_dir(&self, namespace: &str) -> Option<Utf8PathBuf> {
        match namespace {
            "xref" | "listing" | "versions" => Some(self.cache_root.join(namespace)),
            "jga-study" | "jga-dataset" => Some(self.fetch_dir(namespace)),
            _ => None,
        }
    }

    pub fn count_files(dir: &Utf8Path) -> Result<usize, PipelineError> {
        if !dir.as_std_path().exists() {
            return Ok(0);
        }
        let entries = fs::read_dir(dir.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let mut count = 0;
        for entry in entries {
            let entry = entry.map_err(|err| PipelineError::Filesystem(err.to_string()))?;
            if entry.path().is_file() {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn ensure_cache_root(&self) -> Result<(), PipelineError> {
        fs::create_dir_all(self.cache_root.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))
    }

    pub fn remove_dir(path: &Utf8Path) -> Result<bool, PipelineError> {
        if !path.as_std_path().exists() {
            return Ok(false);
        }
        fs::remove_dir_all(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        Ok(true)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PipelineError> {
        let parent = path
            .parent()
            .ok_or_else(|| PipelineError::Filesystem(format!("invalid path {path}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".humandbs-tmp")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        std::io::Write::write_all(&mut temp, content)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), PipelineError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    /// Reads a JSON document, returning `None` when the file does not exist.
    pub fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<Option<T>, PipelineError> {
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(format!("read {path}: {err}")))?;
        let value = serde_json::from_str(&content)
            .map_err(|err| PipelineError::Filesystem(format!("parse {path}: {err}")))?;
        Ok(Some(value))
    }
}

pub const NAMESPACES: [&str; 5] = ["xref", "jga-study", "jga-dataset", "listing", "versions"];

pub fn default_cache_root() -> Result<Utf8PathBuf, PipelineError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("humandbs-pipeline"))
                .ok()
        })
        .ok_or_else(|| PipelineError::Filesystem("unable to resolve cache directory".to_string()))
}

/// Keeps ids usable as file names; accession ids are ASCII already.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new_with_root(Utf8PathBuf::from("/tmp/humandbs-cache"));
        assert!(
            store
                .xref_cache_path("jga")
                .ends_with("xref/jga.json")
        );
        assert!(
            store
                .fetch_entry_path("jga-study", "JGAS000114")
                .ends_with("fetch/jga-study/JGAS000114.json")
        );
        assert!(
            store
                .fetch_entry_path("jga-study", "a/../b")
                .ends_with("fetch/jga-study/a_.._b.json")
        );
    }

    #[test]
    fn json_round_trip_through_atomic_write() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("nested").join("doc.json");
        Store::write_json_atomic(&path, &vec!["a", "b"]).unwrap();
        let back: Option<Vec<String>> = Store::read_json(&path).unwrap();
        assert_eq!(back, Some(vec!["a".to_string(), "b".to_string()]));
        let missing: Option<Vec<String>> = Store::read_json(&root.join("none.json")).unwrap();
        assert!(missing.is_none());
    }
}
