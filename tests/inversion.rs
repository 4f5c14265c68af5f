use std::collections::BTreeMap;

use camino::Utf8PathBuf;

use humandbs_pipeline::accession::Extractor;
use humandbs_pipeline::domain::TextValue;
use humandbs_pipeline::error::PipelineError;
use humandbs_pipeline::inversion::invert;
use humandbs_pipeline::model::MolecularDataRecord;
use humandbs_pipeline::xref::{Resolver, XrefDirection, XrefSource};

struct StaticSource(BTreeMap<&'static str, Vec<&'static str>>);

impl XrefSource for StaticSource {
    fn lookup(&self, direction: XrefDirection, id: &str) -> Result<Vec<String>, PipelineError> {
        assert_eq!(direction, XrefDirection::Forward);
        Ok(self
            .0
            .get(id)
            .map(|ids| ids.iter().map(|id| id.to_string()).collect())
            .unwrap_or_default())
    }
}

fn resolver(temp: &tempfile::TempDir) -> Resolver {
    let mut map = BTreeMap::new();
    map.insert("JGAS000114", vec!["JGAD000123", "JGAD000220"]);
    let path = Utf8PathBuf::from_path_buf(temp.path().join("xref.json")).unwrap();
    Resolver::new(Box::new(StaticSource(map)), path, 50)
}

fn record(header: &str) -> MolecularDataRecord {
    MolecularDataRecord {
        id: TextValue::plain(header),
        ..Default::default()
    }
}

#[test]
fn records_are_filed_under_every_dataset_they_reference() {
    let temp = tempfile::tempdir().unwrap();
    let resolver = resolver(&temp);
    let records = vec![
        record("JGAS000114 (WGS)"),
        record("JGAD000123 / DRA001234"),
        record("Summary statistics"),
    ];
    let inversion = invert(&records, &Extractor::default(), &resolver).unwrap();

    let keys: Vec<&str> = inversion.datasets.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["DRA001234", "JGAD000123", "JGAD000220"]);
    assert_eq!(inversion.datasets["JGAD000123"].len(), 2);
    assert_eq!(inversion.datasets["JGAD000220"], vec![records[0].clone()]);
    assert_eq!(inversion.datasets["DRA001234"], vec![records[1].clone()]);

    // the record without any id is filed nowhere
    let filed: usize = inversion
        .datasets
        .values()
        .flatten()
        .filter(|record| record.id.text == "Summary statistics")
        .count();
    assert_eq!(filed, 0);
}

#[test]
fn unresolvable_study_becomes_its_own_dataset() {
    let temp = tempfile::tempdir().unwrap();
    let resolver = resolver(&temp);
    let records = vec![record("JGAS000999")];
    let inversion = invert(&records, &Extractor::default(), &resolver).unwrap();
    assert_eq!(inversion.datasets.keys().collect::<Vec<_>>(), vec!["JGAS000999"]);
}

#[test]
fn expansion_map_is_one_hop() {
    let temp = tempfile::tempdir().unwrap();
    let resolver = resolver(&temp);
    let records = vec![record("JGAS000114"), record("JGAD000123 DRA001234")];
    let inversion = invert(&records, &Extractor::default(), &resolver).unwrap();
    let expansion = &inversion.expansion;

    // a study id is replaced by the datasets it resolved to
    assert_eq!(
        expansion.expand(["JGAS000114"]),
        vec!["JGAD000123".to_string(), "JGAD000220".to_string()]
    );
    // a dataset id is kept and gains its co-filed ids, without following them further
    assert_eq!(
        expansion.expand(["DRA001234"]),
        vec!["DRA001234".to_string(), "JGAD000123".to_string()]
    );
    // unknown ids pass through untouched
    assert_eq!(expansion.expand(["E-GEAD-1"]), vec!["E-GEAD-1".to_string()]);
}
