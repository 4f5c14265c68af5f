use std::collections::BTreeMap;

use humandbs_pipeline::accession::Extractor;
use humandbs_pipeline::domain::{MatchType, TextValue};
use humandbs_pipeline::matcher::{
    BilingualPair, match_experiments, match_grants, match_persons, match_publications,
    match_research_projects,
};
use humandbs_pipeline::model::{Experiment, Grant, Person, Publication, ResearchProject};

fn experiment(header: &str) -> Experiment {
    Experiment {
        header: TextValue::plain(header),
        data: BTreeMap::new(),
        footers: Vec::new(),
    }
}

fn publication(title: &str, doi: Option<&str>, datasets: &[&str]) -> Publication {
    Publication {
        title: TextValue::plain(title),
        doi: doi.map(str::to_string),
        dataset_ids: datasets.iter().map(|id| id.to_string()).collect(),
    }
}

fn person(name: &str, datasets: &[&str], period: Option<&str>) -> Person {
    Person {
        name: TextValue::plain(name),
        affiliation: None,
        country: None,
        research_title: None,
        dataset_ids: datasets.iter().map(|id| id.to_string()).collect(),
        period_of_data_use: period.map(str::to_string),
    }
}

fn headers(pairs: &[BilingualPair<Experiment>]) -> Vec<(Option<&str>, Option<&str>, MatchType)> {
    pairs
        .iter()
        .map(|pair| {
            (
                pair.ja.as_ref().map(|exp| exp.header.text.as_str()),
                pair.en.as_ref().map(|exp| exp.header.text.as_str()),
                pair.match_type,
            )
        })
        .collect()
}

/// Every item lands in exactly one pair and the tag agrees with which sides
/// are present.
fn assert_coverage<T>(pairs: &[BilingualPair<T>], ja_len: usize, en_len: usize) {
    assert_eq!(pairs.iter().filter(|pair| pair.ja.is_some()).count(), ja_len);
    assert_eq!(pairs.iter().filter(|pair| pair.en.is_some()).count(), en_len);
    for pair in pairs {
        match pair.match_type {
            MatchType::UnmatchedJa => assert!(pair.ja.is_some() && pair.en.is_none()),
            MatchType::UnmatchedEn => assert!(pair.ja.is_none() && pair.en.is_some()),
            _ => assert!(pair.ja.is_some() && pair.en.is_some()),
        }
    }
}

#[test]
fn shared_accession_header_is_exact() {
    let pairs = match_experiments(
        vec![experiment("JGAD000001 - Exome")],
        vec![experiment("JGAD000001 - Exome sequencing")],
        &Extractor::default(),
    );
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].match_type, MatchType::Exact);
}

#[test]
fn experiments_cascade_in_fixed_order() {
    let ja = vec![
        experiment("全ゲノム解析"),
        experiment("JGAD000002 エクソーム"),
        experiment("メチル化アレイ"),
        experiment("その他"),
        experiment("補足"),
    ];
    let en = vec![
        experiment("Exome sequencing JGAD000002"),
        experiment("Whole genome sequencing"),
        experiment("Other"),
    ];
    let pairs = match_experiments(ja, en, &Extractor::default());
    assert_coverage(&pairs, 5, 3);
    assert_eq!(
        headers(&pairs),
        vec![
            (
                Some("JGAD000002 エクソーム"),
                Some("Exome sequencing JGAD000002"),
                MatchType::Exact
            ),
            (Some("全ゲノム解析"), Some("Whole genome sequencing"), MatchType::Fuzzy),
            (Some("メチル化アレイ"), Some("Other"), MatchType::Position),
            (Some("その他"), None, MatchType::UnmatchedJa),
            (Some("補足"), None, MatchType::UnmatchedJa),
        ]
    );
}

#[test]
fn leftover_english_items_come_last() {
    let pairs = match_experiments(
        vec![],
        vec![experiment("A"), experiment("B")],
        &Extractor::default(),
    );
    assert_eq!(
        headers(&pairs),
        vec![
            (None, Some("A"), MatchType::UnmatchedEn),
            (None, Some("B"), MatchType::UnmatchedEn),
        ]
    );
}

#[test]
fn matching_is_deterministic() {
    let ja = vec![
        publication("日本人の2型糖尿病GWAS", None, &["JGAD000010"]),
        publication("胃がんの全ゲノム解析", Some("10.1038/ng.3000"), &[]),
    ];
    let en = vec![
        publication("Whole genome analysis of gastric cancer", Some("https://doi.org/10.1038/NG.3000"), &[]),
        publication("GWAS of type 2 diabetes in Japanese", None, &["JGAD000010"]),
    ];
    let first = match_publications(ja.clone(), en.clone());
    let second = match_publications(ja, en);
    assert_eq!(first, second);
    assert_coverage(&first, 2, 2);
    assert_eq!(first[0].match_type, MatchType::Exact);
    assert_eq!(first[0].ja.as_ref().unwrap().doi.as_deref(), Some("10.1038/ng.3000"));
    // the second pair is found by the dataset overlap stage
    assert_eq!(first[1].match_type, MatchType::Exact);
    assert_eq!(first[1].en.as_ref().unwrap().dataset_ids, vec!["JGAD000010"]);
}

#[test]
fn persons_prefer_same_period_then_dataset_overlap() {
    let ja = vec![
        person("山田太郎", &["JGAD000001"], Some("2020-01-01 - 2021-12-31")),
        person("佐藤花子", &["JGAD000001"], Some("2019-04-01 - 2020-03-31")),
    ];
    let en = vec![
        person("Hanako Sato", &["JGAD000001"], Some("2019-04-01 - 2020-03-31")),
        person("Taro Yamada", &["JGAD000001", "JGAD000002"], Some("2020-01-01 - 2022-12-31")),
    ];
    let pairs = match_persons(ja, en);
    assert_coverage(&pairs, 2, 2);
    let names: Vec<_> = pairs
        .iter()
        .map(|pair| {
            (
                pair.ja.as_ref().unwrap().name.text.as_str(),
                pair.en.as_ref().unwrap().name.text.as_str(),
                pair.match_type,
            )
        })
        .collect();
    assert_eq!(
        names,
        vec![
            ("佐藤花子", "Hanako Sato", MatchType::Exact),
            ("山田太郎", "Taro Yamada", MatchType::Exact),
        ]
    );
}

#[test]
fn grants_match_on_normalized_ids() {
    let ja = vec![Grant {
        grant_ids: vec!["ＪＰ１８ｋｋ０２０５００１".to_string()],
        title: Some(TextValue::plain("がんゲノム研究")),
        agency: None,
        dataset_ids: Vec::new(),
    }];
    let en = vec![
        Grant {
            grant_ids: vec!["JP99xx0000001".to_string()],
            title: Some(TextValue::plain("Unrelated")),
            agency: None,
            dataset_ids: Vec::new(),
        },
        Grant {
            grant_ids: vec!["JP18kk0205001".to_string()],
            title: Some(TextValue::plain("Cancer genome research")),
            agency: None,
            dataset_ids: Vec::new(),
        },
    ];
    let pairs = match_grants(ja, en);
    assert_coverage(&pairs, 1, 2);
    assert_eq!(pairs[0].match_type, MatchType::Exact);
    assert_eq!(
        pairs[0].en.as_ref().unwrap().grant_ids,
        vec!["JP18kk0205001".to_string()]
    );
    assert_eq!(pairs[1].match_type, MatchType::UnmatchedEn);
}

fn grant(id: &str, title: &str, datasets: &[&str]) -> Grant {
    Grant {
        grant_ids: vec![id.to_string()],
        title: Some(TextValue::plain(title)),
        agency: None,
        dataset_ids: datasets.iter().map(|id| id.to_string()).collect(),
    }
}

#[test]
fn grants_with_different_ids_pair_on_shared_datasets() {
    let ja = vec![grant("A", "研究費", &["JGAD000001"])];
    let en = vec![
        grant("C", "Another fund", &["JGAD000009"]),
        grant("B", "Research fund", &["JGAD000001", "JGAD000002"]),
    ];
    let pairs = match_grants(ja, en);
    assert_coverage(&pairs, 1, 2);
    assert_eq!(pairs[0].match_type, MatchType::Exact);
    assert_eq!(pairs[0].en.as_ref().unwrap().grant_ids, vec!["B".to_string()]);
    assert_eq!(pairs[1].match_type, MatchType::UnmatchedEn);
}

#[test]
fn header_sharing_one_of_several_accessions_is_exact() {
    let pairs = match_experiments(
        vec![experiment("JGAD000001, JGAD000002 全ゲノム")],
        vec![experiment("Methylation"), experiment("JGAD000001 whole genome")],
        &Extractor::default(),
    );
    assert_eq!(
        headers(&pairs),
        vec![
            (
                Some("JGAD000001, JGAD000002 全ゲノム"),
                Some("JGAD000001 whole genome"),
                MatchType::Exact
            ),
            (None, Some("Methylation"), MatchType::UnmatchedEn),
        ]
    );
}

#[test]
fn research_projects_match_on_url() {
    let ja = vec![ResearchProject {
        name: TextValue::plain("バイオバンク"),
        url: Some("https://biobank.example.org/".to_string()),
    }];
    let en = vec![ResearchProject {
        name: TextValue::plain("BioBank"),
        url: Some("http://BIOBANK.example.org".to_string()),
    }];
    let pairs = match_research_projects(ja, en);
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].match_type, MatchType::Exact);
}
