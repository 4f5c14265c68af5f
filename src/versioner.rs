use std::collections::BTreeMap;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::Lang;
use crate::error::PipelineError;
use crate::model::Experiment;
use crate::store::Store;

/// A previously emitted version of one dataset in one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: String,
    pub signature: String,
}

impl VersionRecord {
    pub fn from_experiments(
        version: impl Into<String>,
        experiments: &[Experiment],
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            version: version.into(),
            signature: content_signature(experiments)?,
        })
    }
}

/// Serialized experiment list. Order matters: the same experiments listed in
/// a different order produce a different signature.
pub fn content_signature(experiments: &[Experiment]) -> Result<String, PipelineError> {
    serde_json::to_string(experiments).map_err(|err| PipelineError::Filesystem(err.to_string()))
}

/// Returns the label of an earlier version with exactly the same content, or
/// mints the next `vN` label.
pub fn assign_version(
    dataset_id: &str,
    lang: Lang,
    experiments: &[Experiment],
    history: &[VersionRecord],
) -> Result<String, PipelineError> {
    let signature = content_signature(experiments)?;
    if let Some(existing) = history.iter().find(|record| record.signature == signature) {
        debug!(dataset_id, %lang, version = %existing.version, "content unchanged; reusing version");
        return Ok(existing.version.clone());
    }
    let label = format!("v{}", highest_version(history) + 1);
    debug!(dataset_id, %lang, version = %label, "minted new dataset version");
    Ok(label)
}

fn highest_version(history: &[VersionRecord]) -> u32 {
    let mut distinct: Vec<&str> = history.iter().map(|record| record.version.as_str()).collect();
    distinct.sort_unstable();
    distinct.dedup();
    let numbered = distinct
        .iter()
        .filter_map(|label| label.strip_prefix('v'))
        .filter_map(|num| num.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    numbered.max(distinct.len() as u32)
}

/// Version history of every (dataset id, language) seen so far, persisted
/// between runs so re-crawls of unchanged content keep their labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionLedger {
    entries: BTreeMap<String, Vec<VersionRecord>>,
}

impl VersionLedger {
    pub fn load(path: &Utf8Path) -> Result<Self, PipelineError> {
        Ok(Store::read_json(path)?.unwrap_or_default())
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), PipelineError> {
        Store::write_json_atomic(path, self)
    }

    pub fn history(&self, dataset_id: &str, lang: Lang) -> &[VersionRecord] {
        self.entries
            .get(&ledger_key(dataset_id, lang))
            .map(|records| records.as_slice())
            .unwrap_or(&[])
    }

    pub fn assign(
        &mut self,
        dataset_id: &str,
        lang: Lang,
        experiments: &[Experiment],
    ) -> Result<String, PipelineError> {
        let history = self.entries.entry(ledger_key(dataset_id, lang)).or_default();
        let label = assign_version(dataset_id, lang, experiments, history)?;
        if !history.iter().any(|record| record.version == label) {
            history.push(VersionRecord::from_experiments(label.clone(), experiments)?);
        }
        Ok(label)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn ledger_key(dataset_id: &str, lang: Lang) -> String {
    format!("{dataset_id}|{lang}")
}
