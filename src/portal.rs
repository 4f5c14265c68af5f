use std::collections::BTreeMap;
use std::fs;
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::domain::{Lang, PageKey, ResearchId};
use crate::error::PipelineError;
use crate::http;
use crate::model::ParseResult;
use crate::store::Store;

pub const DEFAULT_PORTAL_BASE: &str = "https://humandbs.dbcls.jp";

static VERSION_IN_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"hum\d{4}-v(\d+)").expect("static version pattern"));

/// Finds the newest published version of a catalog page.
pub trait VersionProbe: Send + Sync {
    fn latest_version(&self, id: &ResearchId, lang: Lang) -> Result<Option<u32>, PipelineError>;
}

/// Supplies the parse result of one page; `Ok(None)` when the page is absent.
pub trait PageLoader: Send + Sync {
    fn load(&self, key: &PageKey) -> Result<Option<ParseResult>, PipelineError>;
}

#[derive(Clone)]
pub struct PortalHttpClient {
    client: Client,
    base_url: String,
    max_version: u32,
}

impl PortalHttpClient {
    pub fn new(base_url: &str, max_version: u32) -> Result<Self, PipelineError> {
        let client = http::build_client(Duration::from_secs(30), true)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_version: max_version.max(1),
        })
    }

    pub fn page_url(&self, id: &ResearchId, version: Option<u32>, lang: Lang) -> String {
        let page = match version {
            Some(version) => id.versioned(version),
            None => id.as_str().to_string(),
        };
        match lang {
            Lang::Ja => format!("{}/{page}", self.base_url),
            Lang::En => format!("{}/en/{page}", self.base_url),
        }
    }

    /// Requests the unversioned page and reads the version off the URL the
    /// portal redirects to.
    fn probe_redirect(&self, id: &ResearchId, lang: Lang) -> Result<Option<u32>, PipelineError> {
        let url = self.page_url(id, None, lang);
        let response = http::send_with_retries(|| self.client.get(&url), PipelineError::PortalHttp)?;
        if !response.status().is_success() {
            debug!(research_id = %id, %lang, status = response.status().as_u16(), "redirect probe missed");
            return Ok(None);
        }
        Ok(version_from_url(response.url().as_str()))
    }

    fn page_exists(&self, id: &ResearchId, version: u32, lang: Lang) -> Result<bool, PipelineError> {
        let url = self.page_url(id, Some(version), lang);
        let response = http::send_with_retries(|| self.client.get(&url), PipelineError::PortalHttp)?;
        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status.is_client_error() {
            return Ok(false);
        }
        Err(PipelineError::PortalStatus {
            status: status.as_u16(),
            message: format!("probing {url}"),
        })
    }

    pub fn fetch_html(&self, key: &PageKey) -> Result<Option<String>, PipelineError> {
        let url = self.page_url(&key.research_id, Some(key.version), key.lang);
        let response = http::send_with_retries(|| self.client.get(&url), PipelineError::PortalHttp)?;
        let status = response.status().as_u16();
        if status == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(PipelineError::PortalStatus {
                status,
                message: format!("fetching {url}"),
            });
        }
        response
            .text()
            .map(Some)
            .map_err(|err| PipelineError::PortalHttp(err.to_string()))
    }
}

impl VersionProbe for PortalHttpClient {
    fn latest_version(&self, id: &ResearchId, lang: Lang) -> Result<Option<u32>, PipelineError> {
        if let Some(version) = self.probe_redirect(id, lang)? {
            return Ok(Some(version));
        }
        binary_search_latest(self.max_version, |version| self.page_exists(id, version, lang))
    }
}

pub fn version_from_url(url: &str) -> Option<u32> {
    VERSION_IN_URL
        .captures(url)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Largest version in `1..=max` for which `exists` holds, assuming versions
/// are published without gaps.
pub fn binary_search_latest<F>(max: u32, mut exists: F) -> Result<Option<u32>, PipelineError>
where
    F: FnMut(u32) -> Result<bool, PipelineError>,
{
    if max == 0 || !exists(1)? {
        return Ok(None);
    }
    let (mut lo, mut hi) = (1u32, max);
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if exists(mid)? {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Ok(Some(lo))
}

/// Parse results written by the page parser as `{key}.json` files.
#[derive(Debug, Clone)]
pub struct ParsedPageDir {
    root: Utf8PathBuf,
}

impl ParsedPageDir {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn page_path(&self, key: &PageKey) -> Utf8PathBuf {
        self.root.join(format!("{key}.json"))
    }

    pub fn research_ids(&self) -> Result<Vec<ResearchId>, PipelineError> {
        let mut ids: Vec<ResearchId> = self
            .keys()?
            .into_iter()
            .map(|key| key.research_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn keys(&self) -> Result<Vec<PageKey>, PipelineError> {
        if !self.root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| PipelineError::Filesystem(err.to_string()))?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|name| name.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(key) = stem.parse::<PageKey>() {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

impl PageLoader for ParsedPageDir {
    fn load(&self, key: &PageKey) -> Result<Option<ParseResult>, PipelineError> {
        let path = self.page_path(key);
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(format!("read {path}: {err}")))?;
        let page: ParseResult =
            serde_json::from_str(&content).map_err(|err| PipelineError::MalformedPage {
                key: key.to_string(),
                reason: err.to_string(),
            })?;
        Ok(Some(page))
    }
}

impl VersionProbe for ParsedPageDir {
    fn latest_version(&self, id: &ResearchId, lang: Lang) -> Result<Option<u32>, PipelineError> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|key| &key.research_id == id && key.lang == lang)
            .map(|key| key.version)
            .max())
    }
}

/// Cached `humId-lang -> latest version` listing kept between runs.
pub struct LatestVersionListing {
    path: Utf8PathBuf,
    entries: Mutex<BTreeMap<String, u32>>,
}

impl LatestVersionListing {
    pub fn load(path: &Utf8Path) -> Result<Self, PipelineError> {
        let entries = Store::read_json(path)?.unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    pub fn empty(path: &Utf8Path) -> Self {
        Self {
            path: path.to_path_buf(),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, id: &ResearchId, lang: Lang) -> Option<u32> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&listing_key(id, lang))
            .copied()
    }

    pub fn set(&self, id: &ResearchId, lang: Lang, version: u32) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(listing_key(id, lang), version);
    }

    pub fn save(&self) -> Result<(), PipelineError> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        Store::write_json_atomic(&self.path, &entries)?;
        info!(path = %self.path, entries = entries.len(), "latest-version listing saved");
        Ok(())
    }
}

fn listing_key(id: &ResearchId, lang: Lang) -> String {
    format!("{id}-{lang}")
}
