use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::store::Store;

/// A fetch-by-id call against some external service. `Ok(None)` means the
/// service answered definitively that the id does not exist.
pub trait Fetcher: Send + Sync {
    type Output: Serialize + DeserializeOwned + Clone + Send;

    fn fetch(&self, id: &str) -> Result<Option<Self::Output>, PipelineError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile<T> {
    found: bool,
    data: Option<T>,
    #[serde(rename = "cachedAt")]
    cached_at: String,
}

/// Wraps a [`Fetcher`] with one JSON cache file per id under a namespace
/// directory of the [`Store`].
pub struct CachedFetchClient<F: Fetcher> {
    fetcher: F,
    store: Store,
    namespace: String,
    delay: Duration,
}

impl<F: Fetcher> CachedFetchClient<F> {
    pub fn new(fetcher: F, store: Store, namespace: impl Into<String>, delay: Duration) -> Self {
        Self {
            fetcher,
            store,
            namespace: namespace.into(),
            delay,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn get(&self, id: &str, use_cache: bool) -> Result<Option<F::Output>, PipelineError> {
        if use_cache {
            if let Some(hit) = self.read_cached(id) {
                return Ok(hit);
            }
        }
        self.fetch_and_store(id)
    }

    /// Fetches ids one after another, sleeping between external calls.
    /// A failing id is logged and recorded as `None`; the batch continues.
    pub fn get_many(&self, ids: &[String], use_cache: bool) -> BTreeMap<String, Option<F::Output>> {
        let mut results = BTreeMap::new();
        let mut called_out = false;
        for id in ids {
            if results.contains_key(id) {
                continue;
            }
            if use_cache {
                if let Some(hit) = self.read_cached(id) {
                    results.insert(id.clone(), hit);
                    continue;
                }
            }
            if called_out && !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            called_out = true;
            let value = match self.fetch_and_store(id) {
                Ok(value) => value,
                Err(err) => {
                    warn!(namespace = %self.namespace, id = %id, error = %err, "fetch failed");
                    None
                }
            };
            results.insert(id.clone(), value);
        }
        results
    }

    /// Removes every cached entry of this client's namespace.
    pub fn clear_cache(&self) -> Result<bool, PipelineError> {
        Store::remove_dir(&self.store.fetch_dir(&self.namespace))
    }

    fn read_cached(&self, id: &str) -> Option<Option<F::Output>> {
        let path = self.store.fetch_entry_path(&self.namespace, id);
        match Store::read_json::<CacheFile<F::Output>>(&path) {
            Ok(Some(entry)) => {
                debug!(namespace = %self.namespace, id = %id, "fetch cache hit");
                Some(if entry.found { entry.data } else { None })
            }
            Ok(None) => None,
            Err(err) => {
                warn!(path = %path, error = %err, "ignoring unreadable cache entry");
                None
            }
        }
    }

    fn fetch_and_store(&self, id: &str) -> Result<Option<F::Output>, PipelineError> {
        let value = self.fetcher.fetch(id)?;
        let entry = CacheFile {
            found: value.is_some(),
            data: value.clone(),
            cached_at: chrono::Utc::now().to_rfc3339(),
        };
        let path = self.store.fetch_entry_path(&self.namespace, id);
        if let Err(err) = Store::write_json_atomic(&path, &entry) {
            warn!(path = %path, error = %err, "failed to write cache entry");
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use camino::Utf8PathBuf;

    use super::*;

    struct Echo {
        calls: Mutex<Vec<String>>,
    }

    impl Fetcher for Echo {
        type Output = String;

        fn fetch(&self, id: &str) -> Result<Option<String>, PipelineError> {
            self.calls.lock().unwrap().push(id.to_string());
            match id {
                "missing" => Ok(None),
                "boom" => Err(PipelineError::XrefHttp("connection reset".to_string())),
                other => Ok(Some(other.to_lowercase())),
            }
        }
    }

    fn client(root: &std::path::Path) -> CachedFetchClient<Echo> {
        let store = Store::new_with_root(Utf8PathBuf::from_path_buf(root.to_path_buf()).unwrap());
        CachedFetchClient::new(
            Echo {
                calls: Mutex::new(Vec::new()),
            },
            store,
            "echo",
            Duration::ZERO,
        )
    }

    #[test]
    fn second_get_is_served_from_disk() {
        let temp = tempfile::tempdir().unwrap();
        let client = client(temp.path());
        assert_eq!(client.get("ABC", true).unwrap().as_deref(), Some("abc"));
        assert_eq!(client.get("ABC", true).unwrap().as_deref(), Some("abc"));
        assert_eq!(client.get("missing", true).unwrap(), None);
        assert_eq!(client.get("missing", true).unwrap(), None);
        assert_eq!(client.fetcher().calls.lock().unwrap().len(), 2);

        client.get("ABC", false).unwrap();
        assert_eq!(client.fetcher().calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn get_many_isolates_failures() {
        let temp = tempfile::tempdir().unwrap();
        let client = client(temp.path());
        let ids = vec!["A".to_string(), "boom".to_string(), "B".to_string()];
        let results = client.get_many(&ids, true);
        assert_eq!(results.len(), 3);
        assert_eq!(results["A"].as_deref(), Some("a"));
        assert_eq!(results["boom"], None);
        assert_eq!(results["B"].as_deref(), Some("b"));
    }

    #[test]
    fn clear_cache_drops_namespace() {
        let temp = tempfile::tempdir().unwrap();
        let client = client(temp.path());
        client.get("ABC", true).unwrap();
        assert!(client.clear_cache().unwrap());
        client.get("ABC", true).unwrap();
        assert_eq!(client.fetcher().calls.lock().unwrap().len(), 2);
    }
}
