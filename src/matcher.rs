//! Pairs the Japanese and English variants of the same catalog items.
//!
//! Every entity kind runs the same greedy cascade: each strategy walks the
//! still-unmatched Japanese items left to right and pairs each with the first
//! still-unmatched English item the strategy accepts. Whatever is left is
//! paired by position, and the remainder is emitted unmatched. The cascade
//! does not look for a globally optimal assignment; on ambiguous input the
//! result depends on list order, and that is intended.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::accession::{Extractor, flatten};
use crate::domain::{AccessionId, MatchType};
use crate::model::{Experiment, Grant, Person, Publication, ResearchProject};
use crate::text;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BilingualPair<T> {
    pub ja: Option<T>,
    pub en: Option<T>,
    pub match_type: MatchType,
}

impl<T> BilingualPair<T> {
    pub fn map<U, F: Fn(T) -> U>(self, f: F) -> BilingualPair<U> {
        BilingualPair {
            ja: self.ja.map(&f),
            en: self.en.map(&f),
            match_type: self.match_type,
        }
    }
}

pub struct Strategy<'a, T> {
    pub match_type: MatchType,
    pub accepts: Box<dyn Fn(&T, &T) -> bool + 'a>,
}

impl<'a, T> Strategy<'a, T> {
    pub fn new<F>(match_type: MatchType, accepts: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'a,
    {
        Self {
            match_type,
            accepts: Box::new(accepts),
        }
    }
}

/// Runs `strategies` in order, then positional pairing, then emits leftovers
/// (Japanese first). Every input item lands in exactly one pair.
pub fn match_items<T>(ja: Vec<T>, en: Vec<T>, strategies: &[Strategy<'_, T>]) -> Vec<BilingualPair<T>> {
    let mut ja_used = vec![false; ja.len()];
    let mut en_used = vec![false; en.len()];
    let mut plan: Vec<(Option<usize>, Option<usize>, MatchType)> = Vec::new();

    for strategy in strategies {
        for i in 0..ja.len() {
            if ja_used[i] {
                continue;
            }
            let hit = (0..en.len()).find(|&j| !en_used[j] && (strategy.accepts)(&ja[i], &en[j]));
            if let Some(j) = hit {
                ja_used[i] = true;
                en_used[j] = true;
                plan.push((Some(i), Some(j), strategy.match_type));
            }
        }
    }

    let rest_ja: Vec<usize> = (0..ja.len()).filter(|&i| !ja_used[i]).collect();
    let rest_en: Vec<usize> = (0..en.len()).filter(|&j| !en_used[j]).collect();
    let positional = rest_ja.len().min(rest_en.len());
    for k in 0..positional {
        plan.push((Some(rest_ja[k]), Some(rest_en[k]), MatchType::Position));
    }
    for &i in &rest_ja[positional..] {
        plan.push((Some(i), None, MatchType::UnmatchedJa));
    }
    for &j in &rest_en[positional..] {
        plan.push((None, Some(j), MatchType::UnmatchedEn));
    }

    let mut ja: Vec<Option<T>> = ja.into_iter().map(Some).collect();
    let mut en: Vec<Option<T>> = en.into_iter().map(Some).collect();
    plan.into_iter()
        .map(|(i, j, match_type)| BilingualPair {
            ja: i.and_then(|i| ja[i].take()),
            en: j.and_then(|j| en[j].take()),
            match_type,
        })
        .collect()
}

fn header_accessions(extractor: &Extractor, experiment: &Experiment) -> BTreeSet<AccessionId> {
    flatten(&extractor.extract(&experiment.header.text))
        .into_iter()
        .collect()
}

pub fn match_experiments(
    ja: Vec<Experiment>,
    en: Vec<Experiment>,
    extractor: &Extractor,
) -> Vec<BilingualPair<Experiment>> {
    let strategies = [
        Strategy::new(MatchType::Exact, |a: &Experiment, b: &Experiment| {
            !header_accessions(extractor, a).is_disjoint(&header_accessions(extractor, b))
        }),
        Strategy::new(MatchType::Fuzzy, |a: &Experiment, b: &Experiment| {
            text::headers_similar(&a.header.text, &b.header.text)
        }),
    ];
    match_items(ja, en, &strategies)
}

pub fn normalize_doi(doi: &str) -> String {
    let lower = doi.trim().to_lowercase();
    let stripped = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"]
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(lower.as_str());
    stripped.trim().to_string()
}

fn same_doi(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let a = normalize_doi(a);
            !a.is_empty() && a == normalize_doi(b)
        }
        _ => false,
    }
}

fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().any(|id| b.contains(id))
}

pub fn match_publications(ja: Vec<Publication>, en: Vec<Publication>) -> Vec<BilingualPair<Publication>> {
    let strategies = [
        Strategy::new(MatchType::Exact, |a: &Publication, b: &Publication| {
            same_doi(&a.doi, &b.doi)
        }),
        Strategy::new(MatchType::Fuzzy, |a: &Publication, b: &Publication| {
            text::titles_similar(&a.title.text, &b.title.text)
        }),
        Strategy::new(MatchType::Exact, |a: &Publication, b: &Publication| {
            overlaps(&a.dataset_ids, &b.dataset_ids)
        }),
    ];
    match_items(ja, en, &strategies)
}

fn normalized_grant_ids(grant: &Grant) -> BTreeSet<String> {
    grant
        .grant_ids
        .iter()
        .map(|id| text::normalize(id).replace(' ', ""))
        .filter(|id| !id.is_empty())
        .collect()
}

/// Dataset overlap first, then shared grant ids, then title similarity.
pub fn match_grants(ja: Vec<Grant>, en: Vec<Grant>) -> Vec<BilingualPair<Grant>> {
    let strategies = [
        Strategy::new(MatchType::Exact, |a: &Grant, b: &Grant| {
            overlaps(&a.dataset_ids, &b.dataset_ids)
        }),
        Strategy::new(MatchType::Exact, |a: &Grant, b: &Grant| {
            !normalized_grant_ids(a).is_disjoint(&normalized_grant_ids(b))
        }),
        Strategy::new(MatchType::Fuzzy, |a: &Grant, b: &Grant| {
            match (&a.title, &b.title) {
                (Some(ta), Some(tb)) => text::titles_similar(&ta.text, &tb.text),
                _ => false,
            }
        }),
    ];
    match_items(ja, en, &strategies)
}

fn same_period(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let a = text::normalize(a);
            !a.is_empty() && a == text::normalize(b)
        }
        _ => false,
    }
}

/// Persons: controlled-access users and data providers.
pub fn match_persons(ja: Vec<Person>, en: Vec<Person>) -> Vec<BilingualPair<Person>> {
    let strategies = [
        Strategy::new(MatchType::Exact, |a: &Person, b: &Person| {
            overlaps(&a.dataset_ids, &b.dataset_ids)
                && same_period(&a.period_of_data_use, &b.period_of_data_use)
        }),
        Strategy::new(MatchType::Exact, |a: &Person, b: &Person| {
            overlaps(&a.dataset_ids, &b.dataset_ids)
        }),
    ];
    match_items(ja, en, &strategies)
}

fn normalize_url(url: &str) -> String {
    url.trim()
        .trim_end_matches('/')
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .to_lowercase()
}

pub fn match_research_projects(
    ja: Vec<ResearchProject>,
    en: Vec<ResearchProject>,
) -> Vec<BilingualPair<ResearchProject>> {
    let strategies = [
        Strategy::new(MatchType::Exact, |a: &ResearchProject, b: &ResearchProject| {
            match (&a.url, &b.url) {
                (Some(ua), Some(ub)) => {
                    let ua = normalize_url(ua);
                    !ua.is_empty() && ua == normalize_url(ub)
                }
                _ => false,
            }
        }),
        Strategy::new(MatchType::Fuzzy, |a: &ResearchProject, b: &ResearchProject| {
            text::titles_similar(&a.name.text, &b.name.text)
        }),
    ];
    match_items(ja, en, &strategies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_order_is_strategy_then_position_then_leftovers() {
        let ja = vec![1, 2, 3, 4];
        let en = vec![30, 10, 99];
        let strategies = [
            Strategy::new(MatchType::Exact, |a: &i32, b: &i32| a * 10 == *b),
            Strategy::new(MatchType::Fuzzy, |a: &i32, b: &i32| (b - a * 10).abs() <= 1),
        ];
        let pairs = match_items(ja, en, &strategies);
        let summary: Vec<_> = pairs
            .iter()
            .map(|pair| (pair.ja, pair.en, pair.match_type))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Some(1), Some(10), MatchType::Exact),
                (Some(3), Some(30), MatchType::Exact),
                (Some(2), Some(99), MatchType::Position),
                (Some(4), None, MatchType::UnmatchedJa),
            ]
        );
    }

    #[test]
    fn doi_normalization() {
        assert_eq!(normalize_doi("https://doi.org/10.1038/S41586"), "10.1038/s41586");
        assert_eq!(normalize_doi(" doi:10.1/X "), "10.1/x");
    }
}
