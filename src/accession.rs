use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{AccessionId, IdType};
use crate::error::PipelineError;

pub type ExtractedIds = BTreeMap<IdType, BTreeSet<String>>;

static PATTERNS: LazyLock<Vec<(IdType, Regex)>> = LazyLock::new(|| {
    IdType::ALL
        .iter()
        .map(|id_type| {
            let pattern = match id_type {
                IdType::Jgas => r"JGAS\d{6}",
                IdType::Jgad => r"JGAD\d{6}",
                IdType::Dra => r"DRA\d{6}",
                IdType::Gea => r"E-GEAD-\d+",
                IdType::NbdcDataset => r"hum\d{4}\.v\d+\.[A-Za-z0-9_\-]+\.v\d+",
                IdType::BioProject => r"PRJDB\d+",
                IdType::Metabo => r"MTBKS\d+",
            };
            (*id_type, Regex::new(pattern).expect("static accession pattern"))
        })
        .collect()
});

/// Placeholder values that show up in the catalog pages but never name a
/// real record.
const BLOCKLIST: &[&str] = &["JGAS000000", "JGAD000000", "DRA000000", "E-GEAD-000"];

/// Full-string rewrites for cells whose content is known to be entered
/// inconsistently. Replacement ids are typed by the regular patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrectionTable(BTreeMap<String, Vec<String>>);

impl CorrectionTable {
    pub fn builtin() -> Self {
        let mut table = BTreeMap::new();
        table.insert(
            "AP023461-AP024084".to_string(),
            vec!["PRJDB10452".to_string()],
        );
        Self(table)
    }

    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(path)
            .map_err(|_| PipelineError::ConfigRead(path.to_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| PipelineError::ConfigParse(err.to_string()))
    }

    pub fn from_entries(entries: BTreeMap<String, Vec<String>>) -> Self {
        Self(entries)
    }

    /// Entries from `other` win over existing ones with the same key.
    pub fn merge(mut self, other: CorrectionTable) -> Self {
        self.0.extend(other.0);
        self
    }

    pub fn lookup(&self, text: &str) -> Option<&[String]> {
        self.0.get(text.trim()).map(|ids| ids.as_slice())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Extractor {
    corrections: CorrectionTable,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(CorrectionTable::builtin())
    }
}

impl Extractor {
    pub fn new(corrections: CorrectionTable) -> Self {
        Self { corrections }
    }

    pub fn corrections(&self) -> &CorrectionTable {
        &self.corrections
    }

    /// Finds every known accession id in `text`, grouped and deduplicated by
    /// type. Types without a hit are absent from the map.
    pub fn extract(&self, text: &str) -> ExtractedIds {
        let mut found = ExtractedIds::new();
        if text.trim().is_empty() {
            return found;
        }
        if let Some(replacements) = self.corrections.lookup(text) {
            for replacement in replacements {
                collect_matches(replacement, &mut found);
            }
        }
        collect_matches(text, &mut found);
        found
    }

    pub fn extract_ids(&self, text: &str) -> Vec<AccessionId> {
        flatten(&self.extract(text))
    }

    pub fn extract_all<'a, I>(&self, texts: I) -> ExtractedIds
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut found = ExtractedIds::new();
        for text in texts {
            for (id_type, values) in self.extract(text) {
                found.entry(id_type).or_default().extend(values);
            }
        }
        found
    }
}

pub fn flatten(ids: &ExtractedIds) -> Vec<AccessionId> {
    ids.iter()
        .flat_map(|(id_type, values)| {
            values.iter().map(|value| AccessionId {
                id_type: *id_type,
                value: value.clone(),
            })
        })
        .collect()
}

fn collect_matches(text: &str, found: &mut ExtractedIds) {
    for (id_type, regex) in PATTERNS.iter() {
        for value in regex.find_iter(text) {
            let value = value.as_str();
            if BLOCKLIST.contains(&value) {
                continue;
            }
            found
                .entry(*id_type)
                .or_default()
                .insert(value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocklisted_values_are_dropped() {
        let found = Extractor::default().extract("JGAS000000 JGAS000114");
        let studies = &found[&IdType::Jgas];
        assert_eq!(studies.len(), 1);
        assert!(studies.contains("JGAS000114"));
    }

    #[test]
    fn ids_inside_japanese_text_are_found() {
        let found = Extractor::default().extract("データはJGAD000220にて公開");
        assert!(found[&IdType::Jgad].contains("JGAD000220"));
    }

    #[test]
    fn correction_table_merge_overrides() {
        let mut extra = BTreeMap::new();
        extra.insert(
            "AP023461-AP024084".to_string(),
            vec!["PRJDB99999".to_string()],
        );
        let merged = CorrectionTable::builtin().merge(CorrectionTable::from_entries(extra));
        assert_eq!(
            merged.lookup("AP023461-AP024084"),
            Some(&["PRJDB99999".to_string()][..])
        );
    }
}
