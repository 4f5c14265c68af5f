use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use camino::Utf8PathBuf;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::fetch_cache::{CachedFetchClient, Fetcher};
use crate::http;
use crate::store::Store;

pub const DEFAULT_XREF_BASE: &str = "https://ddbj.nig.ac.jp/search/entry";
pub const STUDY_ENTRY_TYPE: &str = "jga-study";
pub const DATASET_ENTRY_TYPE: &str = "jga-dataset";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XrefDirection {
    /// Study id to the dataset ids it owns.
    Forward,
    /// Dataset id to the study ids that own it.
    Backward,
}

impl fmt::Display for XrefDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XrefDirection::Forward => write!(f, "forward"),
            XrefDirection::Backward => write!(f, "backward"),
        }
    }
}

/// External lookup between study and dataset ids. Unknown ids yield an empty
/// list, not an error.
pub trait XrefSource: Send + Sync {
    fn lookup(&self, direction: XrefDirection, id: &str) -> Result<Vec<String>, PipelineError>;
}

impl<T: XrefSource + ?Sized> XrefSource for Arc<T> {
    fn lookup(&self, direction: XrefDirection, id: &str) -> Result<Vec<String>, PipelineError> {
        (**self).lookup(direction, id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbXref {
    pub identifier: String,
    #[serde(rename = "type")]
    pub xref_type: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DdbjEntry {
    pub identifier: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "datePublished", default)]
    pub date_published: Option<String>,
    #[serde(rename = "dbXrefs", default)]
    pub db_xrefs: Vec<DbXref>,
}

impl DdbjEntry {
    pub fn xrefs_of_type(&self, xref_type: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .db_xrefs
            .iter()
            .filter(|xref| xref.xref_type == xref_type)
            .map(|xref| xref.identifier.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    found: bool,
    #[serde(alias = "_source", default)]
    source: Option<SearchSource>,
}

#[derive(Debug, Deserialize)]
struct SearchSource {
    #[serde(default)]
    identifier: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "datePublished", default)]
    date_published: Option<String>,
    #[serde(rename = "dbXrefs", default)]
    db_xrefs: Vec<DbXref>,
}

/// Reads single entries of one type from the DDBJ search API.
#[derive(Clone)]
pub struct DdbjSearchClient {
    client: Client,
    base_url: String,
    entry_type: String,
}

impl DdbjSearchClient {
    pub fn new(base_url: &str, entry_type: &str) -> Result<Self, PipelineError> {
        let client = http::build_client(Duration::from_secs(30), true)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            entry_type: entry_type.to_string(),
        })
    }

    pub fn entry_url(&self, id: &str) -> String {
        format!("{}/{}/{}.json", self.base_url, self.entry_type, id)
    }
}

impl Fetcher for DdbjSearchClient {
    type Output = DdbjEntry;

    fn fetch(&self, id: &str) -> Result<Option<DdbjEntry>, PipelineError> {
        let url = self.entry_url(id);
        let response = http::send_with_retries(|| self.client.get(&url), PipelineError::XrefHttp)?;
        let status = response.status().as_u16();
        if status == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "DDBJ search request failed".to_string());
            return Err(PipelineError::XrefStatus { status, message });
        }
        let payload: SearchResponse = response
            .json()
            .map_err(|err| PipelineError::XrefHttp(err.to_string()))?;
        Ok(parse_search_response(id, payload))
    }
}

fn parse_search_response(id: &str, payload: SearchResponse) -> Option<DdbjEntry> {
    if !payload.found {
        return None;
    }
    let source = payload.source?;
    Some(DdbjEntry {
        identifier: source.identifier.unwrap_or_else(|| id.to_string()),
        title: source.title,
        date_published: source.date_published,
        db_xrefs: source.db_xrefs,
    })
}

pub fn parse_entry_json(id: &str, raw: &str) -> Result<Option<DdbjEntry>, PipelineError> {
    let payload: SearchResponse =
        serde_json::from_str(raw).map_err(|err| PipelineError::XrefHttp(err.to_string()))?;
    Ok(parse_search_response(id, payload))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetMetadata {
    pub title: Option<String>,
    pub release_date: Option<String>,
}

/// Per-accession metadata lookup used to enrich dataset documents.
pub trait DatasetMetadataSource: Send + Sync {
    fn dataset_metadata(&self, ids: &[String]) -> BTreeMap<String, Option<DatasetMetadata>>;
}

/// JGA study/dataset entries read through two cached fetch clients.
pub struct DdbjXrefSource {
    studies: CachedFetchClient<DdbjSearchClient>,
    datasets: CachedFetchClient<DdbjSearchClient>,
    use_cache: bool,
}

impl DdbjXrefSource {
    pub fn new(
        base_url: &str,
        store: Store,
        delay: Duration,
        use_cache: bool,
    ) -> Result<Self, PipelineError> {
        let studies = CachedFetchClient::new(
            DdbjSearchClient::new(base_url, STUDY_ENTRY_TYPE)?,
            store.clone(),
            STUDY_ENTRY_TYPE,
            delay,
        );
        let datasets = CachedFetchClient::new(
            DdbjSearchClient::new(base_url, DATASET_ENTRY_TYPE)?,
            store,
            DATASET_ENTRY_TYPE,
            delay,
        );
        Ok(Self {
            studies,
            datasets,
            use_cache,
        })
    }

    pub fn clear_cache(&self) -> Result<bool, PipelineError> {
        let studies = self.studies.clear_cache()?;
        let datasets = self.datasets.clear_cache()?;
        Ok(studies || datasets)
    }
}

impl XrefSource for DdbjXrefSource {
    fn lookup(&self, direction: XrefDirection, id: &str) -> Result<Vec<String>, PipelineError> {
        let (client, wanted) = match direction {
            XrefDirection::Forward => (&self.studies, DATASET_ENTRY_TYPE),
            XrefDirection::Backward => (&self.datasets, STUDY_ENTRY_TYPE),
        };
        Ok(client
            .get(id, self.use_cache)?
            .map(|entry| entry.xrefs_of_type(wanted))
            .unwrap_or_default())
    }
}

impl DatasetMetadataSource for DdbjXrefSource {
    fn dataset_metadata(&self, ids: &[String]) -> BTreeMap<String, Option<DatasetMetadata>> {
        self.datasets
            .get_many(ids, self.use_cache)
            .into_iter()
            .map(|(id, entry)| {
                let meta = entry.map(|entry| DatasetMetadata {
                    title: entry.title,
                    release_date: entry.date_published,
                });
                (id, meta)
            })
            .collect()
    }
}

/// Persistent cache document: one map per direction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XrefCacheFile {
    #[serde(default)]
    pub forward: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub backward: BTreeMap<String, Vec<String>>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<String>,
}

impl XrefCacheFile {
    fn map(&self, direction: XrefDirection) -> &BTreeMap<String, Vec<String>> {
        match direction {
            XrefDirection::Forward => &self.forward,
            XrefDirection::Backward => &self.backward,
        }
    }

    fn map_mut(&mut self, direction: XrefDirection) -> &mut BTreeMap<String, Vec<String>> {
        match direction {
            XrefDirection::Forward => &mut self.forward,
            XrefDirection::Backward => &mut self.backward,
        }
    }
}

#[derive(Debug, Default)]
struct ResolverState {
    cache: XrefCacheFile,
    dirty: bool,
    unflushed: usize,
}

/// Bidirectional study/dataset resolver with a persistent cache.
///
/// Built once per run and shared by reference between workers. The cache file
/// is read on first use and rewritten whole on [`Resolver::flush`] or after
/// `flush_every` new entries. There is no cross-process locking; two
/// processes sharing a cache file will overwrite each other's additions.
pub struct Resolver {
    source: Box<dyn XrefSource>,
    cache_path: Utf8PathBuf,
    flush_every: usize,
    read_cache: bool,
    state: Mutex<Option<ResolverState>>,
}

impl Resolver {
    pub fn new(source: Box<dyn XrefSource>, cache_path: Utf8PathBuf, flush_every: usize) -> Self {
        Self {
            source,
            cache_path,
            flush_every: flush_every.max(1),
            read_cache: true,
            state: Mutex::new(None),
        }
    }

    /// Every lookup goes to the source; answers still refresh the cache file.
    pub fn bypass_cache(mut self) -> Self {
        self.read_cache = false;
        self
    }

    pub fn resolve_forward(&self, study_id: &str) -> Result<Vec<String>, PipelineError> {
        self.resolve(XrefDirection::Forward, study_id)
    }

    pub fn resolve_backward(&self, dataset_id: &str) -> Result<Vec<String>, PipelineError> {
        self.resolve(XrefDirection::Backward, dataset_id)
    }

    pub fn resolve(&self, direction: XrefDirection, id: &str) -> Result<Vec<String>, PipelineError> {
        if self.read_cache {
            let guard = self.lock_loaded();
            if let Some(hit) = guard.as_ref().and_then(|state| state.cache.map(direction).get(id)) {
                debug!(%direction, id = %id, "xref cache hit");
                return Ok(hit.clone());
            }
        }

        // Looked up outside the lock; two workers may race on the same id and
        // both call out, which only costs a redundant request.
        let mut resolved = self.source.lookup(direction, id)?;
        resolved.sort();
        resolved.dedup();

        let should_flush = {
            let mut guard = self.lock_loaded();
            let state = guard.get_or_insert_with(ResolverState::default);
            state
                .cache
                .map_mut(direction)
                .insert(id.to_string(), resolved.clone());
            state.dirty = true;
            state.unflushed += 1;
            state.unflushed >= self.flush_every
        };
        if should_flush {
            if let Err(err) = self.flush() {
                warn!(path = %self.cache_path, error = %err, "xref cache autosave failed");
            }
        }
        Ok(resolved)
    }

    /// Writes the whole cache to disk if anything changed since the last write.
    pub fn flush(&self) -> Result<(), PipelineError> {
        let mut guard = self.lock_loaded();
        let Some(state) = guard.as_mut() else {
            return Ok(());
        };
        if !state.dirty {
            return Ok(());
        }
        state.cache.updated_at = Some(chrono::Utc::now().to_rfc3339());
        Store::write_json_atomic(&self.cache_path, &state.cache)?;
        info!(
            path = %self.cache_path,
            forward = state.cache.forward.len(),
            backward = state.cache.backward.len(),
            "xref cache flushed"
        );
        state.dirty = false;
        state.unflushed = 0;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.lock_loaded()
            .as_ref()
            .map(|state| state.dirty)
            .unwrap_or(false)
    }

    pub fn cached_len(&self) -> usize {
        self.lock_loaded()
            .as_ref()
            .map(|state| state.cache.forward.len() + state.cache.backward.len())
            .unwrap_or(0)
    }

    fn lock_loaded(&self) -> MutexGuard<'_, Option<ResolverState>> {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_none() {
            let cache = match Store::read_json::<XrefCacheFile>(&self.cache_path) {
                Ok(cache) => cache.unwrap_or_default(),
                Err(err) => {
                    warn!(path = %self.cache_path, error = %err, "starting with empty xref cache");
                    XrefCacheFile::default()
                }
            };
            *guard = Some(ResolverState {
                cache,
                dirty: false,
                unflushed: 0,
            });
        }
        guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_response_filters_by_type() {
        let raw = r#"{
            "found": true,
            "_source": {
                "identifier": "JGAS000114",
                "dbXrefs": [
                    {"identifier": "JGAD000220", "type": "jga-dataset", "url": "https://x/JGAD000220"},
                    {"identifier": "JGAD000123", "type": "jga-dataset", "url": "https://x/JGAD000123"},
                    {"identifier": "hum0014", "type": "humandbs", "url": "https://x/hum0014"}
                ]
            }
        }"#;
        let entry = parse_entry_json("JGAS000114", raw).unwrap().unwrap();
        assert_eq!(
            entry.xrefs_of_type(DATASET_ENTRY_TYPE),
            vec!["JGAD000123".to_string(), "JGAD000220".to_string()]
        );
    }

    #[test]
    fn not_found_response_is_none() {
        let entry = parse_entry_json("JGAS999999", r#"{"found": false}"#).unwrap();
        assert!(entry.is_none());
    }
}
