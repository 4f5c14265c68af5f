use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::accession::Extractor;
use crate::error::PipelineError;
use crate::model::MolecularDataRecord;
use crate::xref::Resolver;

/// For every id seen in the molecular data, the dataset ids the records
/// carrying it were filed under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpansionMap {
    targets: BTreeMap<String, BTreeSet<String>>,
    study_ids: BTreeSet<String>,
}

impl ExpansionMap {
    pub fn get(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.targets.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Expands a list of referenced ids by one hop. Study ids that expanded
    /// to datasets are replaced by them; every other id is kept.
    pub fn expand<'a, I>(&self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = BTreeSet::new();
        for id in ids {
            match self.targets.get(id) {
                Some(targets) => {
                    if !(self.study_ids.contains(id) && !targets.is_empty()) {
                        out.insert(id.to_string());
                    }
                    out.extend(targets.iter().cloned());
                }
                None => {
                    out.insert(id.to_string());
                }
            }
        }
        out.into_iter().collect()
    }

    fn record(&mut self, id: &str, datasets: &BTreeSet<String>, is_study: bool) {
        self.targets
            .entry(id.to_string())
            .or_default()
            .extend(datasets.iter().cloned());
        if is_study {
            self.study_ids.insert(id.to_string());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inversion {
    pub datasets: BTreeMap<String, Vec<MolecularDataRecord>>,
    pub expansion: ExpansionMap,
}

/// Groups molecular data records by the datasets they belong to. Study ids
/// are resolved to their datasets; a study that resolves to nothing becomes
/// its own dataset. A record may be filed under several datasets.
pub fn invert(
    records: &[MolecularDataRecord],
    extractor: &Extractor,
    resolver: &Resolver,
) -> Result<Inversion, PipelineError> {
    let extracted: Vec<_> = records
        .iter()
        .map(|record| extractor.extract(&record.id.text))
        .collect();

    let mut studies = BTreeSet::new();
    for ids in &extracted {
        for (id_type, values) in ids {
            if !id_type.is_dataset_identity() {
                studies.extend(values.iter().cloned());
            }
        }
    }

    let mut resolved: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for study in studies {
        let mut datasets = resolver.resolve_forward(&study)?;
        if datasets.is_empty() {
            debug!(study = %study, "study resolved to no datasets; keeping it as a dataset id");
            datasets.push(study.clone());
        }
        resolved.insert(study, datasets);
    }

    let mut inversion = Inversion::default();
    for (record, ids) in records.iter().zip(&extracted) {
        let mut dataset_ids = BTreeSet::new();
        for (id_type, values) in ids {
            if id_type.is_dataset_identity() {
                dataset_ids.extend(values.iter().cloned());
            } else {
                for value in values {
                    if let Some(targets) = resolved.get(value) {
                        dataset_ids.extend(targets.iter().cloned());
                    }
                }
            }
        }
        for dataset_id in &dataset_ids {
            inversion
                .datasets
                .entry(dataset_id.clone())
                .or_default()
                .push(record.clone());
        }
        for (id_type, values) in ids {
            let is_study = !id_type.is_dataset_identity();
            for value in values {
                inversion.expansion.record(value, &dataset_ids, is_study);
            }
        }
    }
    Ok(inversion)
}
