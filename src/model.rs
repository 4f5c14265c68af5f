//! Parse-result tree handed over by the page parser, the single-language
//! entities derived from it, and the documents written at the end of a run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Lang, MatchType, PageKey, TextValue};
use crate::error::PipelineError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlValue {
    pub text: String,
    pub url: String,
}

/// One raw experiment-like entry of the molecular data tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MolecularDataRecord {
    pub id: TextValue,
    #[serde(default)]
    pub data: BTreeMap<String, Option<TextValue>>,
    #[serde(default)]
    pub footers: Vec<TextValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub aims: TextValue,
    #[serde(default)]
    pub methods: TextValue,
    #[serde(default)]
    pub targets: TextValue,
    #[serde(default)]
    pub url: Vec<UrlValue>,
    #[serde(default)]
    pub footers: Vec<TextValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRow {
    pub dataset_id: TextValue,
    #[serde(default)]
    pub type_of_data: Option<TextValue>,
    #[serde(default)]
    pub criteria: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRow {
    #[serde(default)]
    pub grant_id: Vec<String>,
    #[serde(default)]
    pub title: Option<TextValue>,
    #[serde(default)]
    pub agency: Option<TextValue>,
    #[serde(default)]
    pub dataset_ids: TextValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataProvider {
    #[serde(default)]
    pub principal_investigator: Vec<TextValue>,
    #[serde(default)]
    pub affiliation: Vec<TextValue>,
    #[serde(default)]
    pub project_name: Vec<TextValue>,
    #[serde(default)]
    pub project_url: Vec<UrlValue>,
    #[serde(default)]
    pub grants: Vec<GrantRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationRow {
    pub title: TextValue,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub dataset_ids: TextValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlledAccessUserRow {
    pub principal_investigator: TextValue,
    #[serde(default)]
    pub affiliation: Option<TextValue>,
    #[serde(default)]
    pub country: Option<TextValue>,
    #[serde(default)]
    pub research_title: Option<TextValue>,
    #[serde(default)]
    pub dataset_ids: TextValue,
    #[serde(default)]
    pub period_of_data_use: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRow {
    pub version: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub note: Option<TextValue>,
}

/// Typed tree produced by the page parser for one (research id, version, lang).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub title: String,
    #[serde(default)]
    pub summary: Summary,
    #[serde(default)]
    pub datasets: Vec<DatasetRow>,
    #[serde(default)]
    pub molecular_data: Vec<MolecularDataRecord>,
    #[serde(default)]
    pub data_provider: DataProvider,
    #[serde(default)]
    pub publications: Vec<PublicationRow>,
    #[serde(default)]
    pub controlled_access_users: Vec<ControlledAccessUserRow>,
    #[serde(default)]
    pub release_note: Vec<ReleaseRow>,
}

impl ParseResult {
    /// Rejects trees that lack the structure every catalog page has.
    pub fn validate(&self, key: &PageKey) -> Result<(), PipelineError> {
        let malformed = |reason: &str| PipelineError::MalformedPage {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if self.title.trim().is_empty() {
            return Err(malformed("missing title"));
        }
        if self.molecular_data.iter().any(|record| record.id.is_blank()) {
            return Err(malformed("molecular data record without id"));
        }
        if self
            .controlled_access_users
            .iter()
            .any(|user| user.principal_investigator.is_blank())
        {
            return Err(malformed("controlled-access user without name"));
        }
        Ok(())
    }

    pub fn release_row(&self, version: u32) -> Option<&ReleaseRow> {
        let suffix_dot = format!(".v{version}");
        let suffix_dash = format!("-v{version}");
        self.release_note.iter().find(|row| {
            let value = row.version.trim();
            value.ends_with(&suffix_dot) || value.ends_with(&suffix_dash)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub header: TextValue,
    pub data: BTreeMap<String, Option<TextValue>>,
    pub footers: Vec<TextValue>,
}

impl From<&MolecularDataRecord> for Experiment {
    fn from(record: &MolecularDataRecord) -> Self {
        Self {
            header: record.id.clone(),
            data: record.data.clone(),
            footers: record.footers.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub title: TextValue,
    pub doi: Option<String>,
    pub dataset_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub grant_ids: Vec<String>,
    pub title: Option<TextValue>,
    pub agency: Option<TextValue>,
    pub dataset_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub name: TextValue,
    pub affiliation: Option<TextValue>,
    pub country: Option<TextValue>,
    pub research_title: Option<TextValue>,
    pub dataset_ids: Vec<String>,
    pub period_of_data_use: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchProject {
    pub name: TextValue,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRef {
    pub dataset_id: String,
    pub version: String,
}

/// Single-language aggregate built from the latest page version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Research {
    pub hum_id: String,
    pub lang: Lang,
    pub latest_version: u32,
    pub title: String,
    pub summary: Summary,
    pub data_provider: Vec<Person>,
    pub research_projects: Vec<ResearchProject>,
    pub grants: Vec<Grant>,
    pub publications: Vec<Publication>,
    pub controlled_access_users: Vec<Person>,
    pub dataset_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchVersion {
    pub hum_id: String,
    pub lang: Lang,
    pub version: u32,
    pub release_date: Option<String>,
    pub release_note: Option<TextValue>,
    pub datasets: Vec<DatasetRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetVersion {
    pub dataset_id: String,
    pub lang: Lang,
    pub version: String,
    pub hum_id: String,
    pub type_of_data: Option<TextValue>,
    pub criteria: Option<String>,
    pub release_date: Option<String>,
    pub experiments: Vec<Experiment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BilingualText {
    pub ja: Option<TextValue>,
    pub en: Option<TextValue>,
}

impl BilingualText {
    pub fn new(ja: Option<TextValue>, en: Option<TextValue>) -> Self {
        Self { ja, en }
    }

    pub fn get(&self, lang: Lang) -> Option<&TextValue> {
        match lang {
            Lang::Ja => self.ja.as_ref(),
            Lang::En => self.en.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BilingualList<T> {
    pub ja: Vec<T>,
    pub en: Vec<T>,
}

impl<T> BilingualList<T> {
    pub fn get(&self, lang: Lang) -> &[T] {
        match lang {
            Lang::Ja => &self.ja,
            Lang::En => &self.en,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BilingualExperiment {
    pub header: BilingualText,
    pub data: BTreeMap<String, BilingualText>,
    pub footers: BilingualList<TextValue>,
    pub match_type: MatchType,
}

impl BilingualExperiment {
    /// The experiment as one language saw it. Fields empty on that side are
    /// left out.
    pub fn side(&self, lang: Lang) -> Option<Experiment> {
        let header = self.header.get(lang)?.clone();
        let data = self
            .data
            .iter()
            .filter_map(|(key, value)| Some((key.clone(), Some(value.get(lang)?.clone()))))
            .collect();
        Some(Experiment {
            header,
            data,
            footers: self.footers.get(lang).to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BilingualPublication {
    pub title: BilingualText,
    pub doi: Option<String>,
    pub dataset_ids: Vec<String>,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BilingualGrant {
    pub grant_ids: Vec<String>,
    pub title: BilingualText,
    pub agency: BilingualText,
    pub dataset_ids: Vec<String>,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BilingualPerson {
    pub name: BilingualText,
    pub affiliation: BilingualText,
    pub country: BilingualText,
    pub research_title: BilingualText,
    pub dataset_ids: Vec<String>,
    pub period_of_data_use: Option<String>,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BilingualResearchProject {
    pub name: BilingualText,
    pub url: Option<String>,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BilingualSummary {
    pub aims: BilingualText,
    pub methods: BilingualText,
    pub targets: BilingualText,
    pub url: BilingualList<UrlValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchDoc {
    pub hum_id: String,
    pub latest_version: u32,
    pub title: BilingualText,
    pub summary: BilingualSummary,
    pub data_provider: Vec<BilingualPerson>,
    pub research_projects: Vec<BilingualResearchProject>,
    pub grants: Vec<BilingualGrant>,
    pub publications: Vec<BilingualPublication>,
    pub controlled_access_users: Vec<BilingualPerson>,
    pub versions: Vec<String>,
    pub dataset_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchVersionDoc {
    pub hum_id: String,
    pub hum_version_id: String,
    pub version: u32,
    pub release_date: Option<String>,
    pub release_note: BilingualText,
    pub datasets: Vec<DatasetRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetDoc {
    pub dataset_id: String,
    pub version: String,
    pub hum_id: String,
    pub title: Option<String>,
    pub type_of_data: BilingualText,
    pub criteria: Option<String>,
    pub release_date: Option<String>,
    pub experiments: Vec<BilingualExperiment>,
}

impl DatasetDoc {
    /// Experiments present on one language side, in document order. Empty when
    /// that language's unit contributed nothing.
    pub fn experiments_in(&self, lang: Lang) -> Vec<Experiment> {
        self.experiments
            .iter()
            .filter_map(|experiment| experiment.side(lang))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResearchId;

    #[test]
    fn release_row_matches_both_version_spellings() {
        let page = ParseResult {
            title: "t".to_string(),
            release_note: vec![
                ReleaseRow {
                    version: "hum0001.v1".to_string(),
                    release_date: Some("2016-01-01".to_string()),
                    note: None,
                },
                ReleaseRow {
                    version: "hum0001-v2".to_string(),
                    release_date: Some("2017-01-01".to_string()),
                    note: None,
                },
            ],
            ..Default::default()
        };
        assert_eq!(
            page.release_row(2).and_then(|row| row.release_date.as_deref()),
            Some("2017-01-01")
        );
        assert!(page.release_row(3).is_none());
    }

    #[test]
    fn validate_rejects_blank_title() {
        let key = PageKey::new("hum0001".parse::<ResearchId>().unwrap(), 1, Lang::Ja);
        let page = ParseResult::default();
        assert!(page.validate(&key).is_err());
    }
}
