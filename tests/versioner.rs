use std::collections::BTreeMap;

use humandbs_pipeline::domain::{Lang, TextValue};
use humandbs_pipeline::model::Experiment;
use humandbs_pipeline::versioner::{VersionLedger, VersionRecord, assign_version};

fn experiment(header: &str, platform: &str) -> Experiment {
    let mut data = BTreeMap::new();
    data.insert("Platform".to_string(), Some(TextValue::plain(platform)));
    Experiment {
        header: TextValue::plain(header),
        data,
        footers: Vec::new(),
    }
}

#[test]
fn first_second_and_changed_content() {
    let exp_a = vec![experiment("JGAD000001 - Exome", "HiSeq 2500")];
    let exp_b = vec![experiment("JGAD000001 - Exome", "NovaSeq 6000")];

    assert_eq!(assign_version("JGAD1", Lang::Ja, &exp_a, &[]).unwrap(), "v1");

    let history = vec![VersionRecord::from_experiments("v1", &exp_a).unwrap()];
    assert_eq!(assign_version("JGAD1", Lang::Ja, &exp_a, &history).unwrap(), "v1");
    assert_eq!(assign_version("JGAD1", Lang::Ja, &exp_b, &history).unwrap(), "v2");
}

#[test]
fn reverting_content_reuses_the_earlier_label() {
    let exp_a = vec![experiment("JGAD000001", "HiSeq 2500")];
    let exp_b = vec![experiment("JGAD000001", "NovaSeq 6000")];
    let history = vec![
        VersionRecord::from_experiments("v1", &exp_a).unwrap(),
        VersionRecord::from_experiments("v2", &exp_b).unwrap(),
    ];
    assert_eq!(assign_version("JGAD1", Lang::En, &exp_a, &history).unwrap(), "v1");
}

#[test]
fn experiment_order_is_part_of_the_content() {
    let first = experiment("JGAD000001 WGS", "HiSeq");
    let second = experiment("JGAD000001 RNA-seq", "HiSeq");
    let history = vec![
        VersionRecord::from_experiments("v1", &[first.clone(), second.clone()]).unwrap(),
    ];
    assert_eq!(
        assign_version("JGAD1", Lang::Ja, &[second, first], &history).unwrap(),
        "v2"
    );
}

#[test]
fn ledger_is_idempotent_and_keyed_by_language() {
    let exp_a = vec![experiment("JGAD000001", "HiSeq 2500")];
    let exp_b = vec![experiment("JGAD000001", "NovaSeq 6000")];
    let mut ledger = VersionLedger::default();

    for _ in 0..3 {
        assert_eq!(ledger.assign("JGAD000001", Lang::Ja, &exp_a).unwrap(), "v1");
    }
    assert_eq!(ledger.assign("JGAD000001", Lang::Ja, &exp_b).unwrap(), "v2");
    assert_eq!(ledger.assign("JGAD000001", Lang::En, &exp_b).unwrap(), "v1");
    assert_eq!(ledger.history("JGAD000001", Lang::Ja).len(), 2);
    assert_eq!(ledger.len(), 2);
}
