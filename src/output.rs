use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::domain::Lang;
use crate::error::PipelineError;
use crate::model::{DatasetDoc, ResearchDoc, ResearchVersionDoc};
use crate::store::Store;
use crate::versioner::content_signature;

/// Output store for the bilingual documents. Writes return `Ok(false)` when a
/// precondition rejects them; nothing is partially left behind in that case.
pub trait DocumentWriter: Send + Sync {
    fn read_dataset(
        &self,
        dataset_id: &str,
        version: &str,
    ) -> Result<Option<DatasetDoc>, PipelineError>;

    /// A stored dataset document may be completed but never contradicted: the
    /// incoming body must keep its hum id and every language side it already
    /// has, with the same experiments. Missing sides and empty metadata fields
    /// may be filled in.
    fn write_dataset(&self, doc: &DatasetDoc) -> Result<bool, PipelineError>;

    /// Writes the version documents, then the research document. A research
    /// document already stored with a newer `latestVersion` rejects the write
    /// and the version documents created by this call are removed again.
    fn write_research_bundle(
        &self,
        research: &ResearchDoc,
        versions: &[ResearchVersionDoc],
    ) -> Result<bool, PipelineError>;
}

#[derive(Debug, Clone)]
pub struct JsonDirWriter {
    root: Utf8PathBuf,
}

impl JsonDirWriter {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn research_path(&self, hum_id: &str) -> Utf8PathBuf {
        self.root.join("research").join(format!("{hum_id}.json"))
    }

    pub fn research_version_path(&self, hum_version_id: &str) -> Utf8PathBuf {
        self.root
            .join("research-version")
            .join(format!("{hum_version_id}.json"))
    }

    pub fn dataset_path(&self, dataset_id: &str, version: &str) -> Utf8PathBuf {
        self.root
            .join("dataset")
            .join(format!("{dataset_id}-{version}.json"))
    }

    pub fn read_research(&self, hum_id: &str) -> Result<Option<ResearchDoc>, PipelineError> {
        read_doc(&self.research_path(hum_id))
    }

}

fn read_doc<T: DeserializeOwned>(path: &Utf8Path) -> Result<Option<T>, PipelineError> {
    Store::read_json(path)
}

/// Experiments of one language side as sorted signatures, so that the
/// pairing order chosen by the matcher does not matter.
fn side_signatures(doc: &DatasetDoc, lang: Lang) -> Result<Vec<String>, PipelineError> {
    let mut signatures = doc
        .experiments_in(lang)
        .iter()
        .map(|experiment| content_signature(std::slice::from_ref(experiment)))
        .collect::<Result<Vec<_>, _>>()?;
    signatures.sort();
    Ok(signatures)
}

fn completes(stored: &DatasetDoc, incoming: &DatasetDoc) -> Result<bool, PipelineError> {
    if stored.hum_id != incoming.hum_id {
        return Ok(false);
    }
    for lang in Lang::ALL {
        let kept = side_signatures(stored, lang)?;
        if !kept.is_empty() && kept != side_signatures(incoming, lang)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn remove_file(path: &Utf8Path) {
    if let Err(err) = fs::remove_file(path.as_std_path()) {
        warn!(path = %path, error = %err, "failed to remove partially written document");
    }
}

impl DocumentWriter for JsonDirWriter {
    fn read_dataset(
        &self,
        dataset_id: &str,
        version: &str,
    ) -> Result<Option<DatasetDoc>, PipelineError> {
        read_doc(&self.dataset_path(dataset_id, version))
    }

    fn write_dataset(&self, doc: &DatasetDoc) -> Result<bool, PipelineError> {
        let path = self.dataset_path(&doc.dataset_id, &doc.version);
        if let Some(existing) = read_doc::<DatasetDoc>(&path)? {
            if &existing == doc {
                debug!(dataset_id = %doc.dataset_id, version = %doc.version, "dataset document unchanged");
                return Ok(true);
            }
            if completes(&existing, doc)? {
                debug!(dataset_id = %doc.dataset_id, version = %doc.version, "completing dataset document");
                Store::write_json_atomic(&path, doc)?;
                return Ok(true);
            }
            warn!(
                dataset_id = %doc.dataset_id,
                version = %doc.version,
                "{}",
                PipelineError::Conflict(path.to_string())
            );
            return Ok(false);
        }
        Store::write_json_atomic(&path, doc)?;
        Ok(true)
    }

    fn write_research_bundle(
        &self,
        research: &ResearchDoc,
        versions: &[ResearchVersionDoc],
    ) -> Result<bool, PipelineError> {
        let research_path = self.research_path(&research.hum_id);
        if let Some(existing) = read_doc::<ResearchDoc>(&research_path)?
            && existing.latest_version > research.latest_version
        {
            warn!(
                hum_id = %research.hum_id,
                stored = existing.latest_version,
                incoming = research.latest_version,
                "{}",
                PipelineError::Conflict(research_path.to_string())
            );
            return Ok(false);
        }

        let mut created = Vec::new();
        for version in versions {
            let path = self.research_version_path(&version.hum_version_id);
            let existed = path.as_std_path().exists();
            if let Err(err) = Store::write_json_atomic(&path, version) {
                created.iter().for_each(|path: &Utf8PathBuf| remove_file(path));
                return Err(err);
            }
            if !existed {
                created.push(path);
            }
        }

        // a concurrent writer may have stored a newer research document meanwhile
        if let Some(existing) = read_doc::<ResearchDoc>(&research_path)?
            && existing.latest_version > research.latest_version
        {
            warn!(hum_id = %research.hum_id, "research document changed during write; rolling back");
            created.iter().for_each(|path| remove_file(path));
            return Ok(false);
        }
        if let Err(err) = Store::write_json_atomic(&research_path, research) {
            created.iter().for_each(|path| remove_file(path));
            return Err(err);
        }
        Ok(true)
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
