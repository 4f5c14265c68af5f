use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Ja,
    En,
}

impl Lang {
    pub const ALL: [Lang; 2] = [Lang::Ja, Lang::En];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::Ja => "ja",
            Lang::En => "en",
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Lang {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ja" => Ok(Lang::Ja),
            "en" => Ok(Lang::En),
            _ => Err(PipelineError::InvalidLang(value.to_string())),
        }
    }
}

/// Catalog entry id such as `hum0001`, stable across versions and languages.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResearchId(String);

impl ResearchId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn versioned(&self, version: u32) -> String {
        format!("{}-v{version}", self.0)
    }
}

impl fmt::Display for ResearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResearchId {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let is_valid = normalized
            .strip_prefix("hum")
            .map(|rest| rest.len() == 4 && rest.chars().all(|ch| ch.is_ascii_digit()))
            .unwrap_or(false);
        if !is_valid {
            return Err(PipelineError::InvalidResearchId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// One crawled page: research id, page version and language.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageKey {
    pub research_id: ResearchId,
    pub version: u32,
    pub lang: Lang,
}

impl PageKey {
    pub fn new(research_id: ResearchId, version: u32, lang: Lang) -> Self {
        Self {
            research_id,
            version,
            lang,
        }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-v{}-{}", self.research_id, self.version, self.lang)
    }
}

impl FromStr for PageKey {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || PipelineError::InvalidPageKey(value.to_string());
        let mut parts = value.trim().splitn(3, '-');
        let research_id: ResearchId = parts
            .next()
            .ok_or_else(invalid)?
            .parse()
            .map_err(|_| invalid())?;
        let version = parts
            .next()
            .and_then(|part| part.strip_prefix('v'))
            .and_then(|num| num.parse::<u32>().ok())
            .filter(|num| *num > 0)
            .ok_or_else(invalid)?;
        let lang: Lang = parts
            .next()
            .ok_or_else(invalid)?
            .parse()
            .map_err(|_| invalid())?;
        Ok(Self::new(research_id, version, lang))
    }
}

/// Accession id families recognised in catalog text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IdType {
    #[serde(rename = "JGAS")]
    Jgas,
    #[serde(rename = "JGAD")]
    Jgad,
    #[serde(rename = "DRA")]
    Dra,
    #[serde(rename = "GEA")]
    Gea,
    #[serde(rename = "NBDC")]
    NbdcDataset,
    #[serde(rename = "BP")]
    BioProject,
    #[serde(rename = "METABO")]
    Metabo,
}

impl IdType {
    pub const ALL: [IdType; 7] = [
        IdType::Jgas,
        IdType::Jgad,
        IdType::Dra,
        IdType::Gea,
        IdType::NbdcDataset,
        IdType::BioProject,
        IdType::Metabo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdType::Jgas => "JGAS",
            IdType::Jgad => "JGAD",
            IdType::Dra => "DRA",
            IdType::Gea => "GEA",
            IdType::NbdcDataset => "NBDC",
            IdType::BioProject => "BP",
            IdType::Metabo => "METABO",
        }
    }

    /// Whether an id of this type names a dataset on its own. Study ids only
    /// contribute datasets through cross-reference resolution.
    pub fn is_dataset_identity(&self) -> bool {
        !matches!(self, IdType::Jgas)
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccessionId {
    pub id_type: IdType,
    pub value: String,
}

/// Normalized display text paired with the markup it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextValue {
    pub text: String,
    #[serde(rename = "rawHtml", default)]
    pub raw_html: String,
}

impl TextValue {
    pub fn new(text: impl Into<String>, raw_html: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            raw_html: raw_html.into(),
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            raw_html: text.clone(),
            text,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchType {
    #[serde(rename = "exact")]
    Exact,
    #[serde(rename = "fuzzy")]
    Fuzzy,
    #[serde(rename = "position")]
    Position,
    #[serde(rename = "unmatched-ja")]
    UnmatchedJa,
    #[serde(rename = "unmatched-en")]
    UnmatchedEn,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Fuzzy => "fuzzy",
            MatchType::Position => "position",
            MatchType::UnmatchedJa => "unmatched-ja",
            MatchType::UnmatchedEn => "unmatched-en",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_research_id_valid() {
        let id: ResearchId = " HUM0001 ".parse().unwrap();
        assert_eq!(id.as_str(), "hum0001");
        assert_eq!(id.versioned(3), "hum0001-v3");
    }

    #[test]
    fn parse_research_id_invalid() {
        let err = "hum01".parse::<ResearchId>().unwrap_err();
        assert_matches!(err, PipelineError::InvalidResearchId(_));
    }

    #[test]
    fn page_key_display_and_parse() {
        let key: PageKey = "hum0014-v2-en".parse().unwrap();
        assert_eq!(key.version, 2);
        assert_eq!(key.lang, Lang::En);
        assert_eq!(key.to_string(), "hum0014-v2-en");
        assert_matches!(
            "hum0014-v0-en".parse::<PageKey>(),
            Err(PipelineError::InvalidPageKey(_))
        );
    }

    #[test]
    fn match_type_serializes_with_dashes() {
        let json = serde_json::to_string(&MatchType::UnmatchedJa).unwrap();
        assert_eq!(json, "\"unmatched-ja\"");
    }
}
