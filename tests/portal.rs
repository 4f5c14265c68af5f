use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use humandbs_pipeline::domain::{Lang, PageKey, ResearchId};
use humandbs_pipeline::error::PipelineError;
use humandbs_pipeline::portal::{PageLoader, ParsedPageDir, VersionProbe};

fn fixtures() -> ParsedPageDir {
    ParsedPageDir::new(Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/pages"))
}

#[test]
fn latest_version_comes_from_file_names() {
    let pages = fixtures();
    let hum0001: ResearchId = "hum0001".parse().unwrap();
    assert_eq!(pages.latest_version(&hum0001, Lang::Ja).unwrap(), Some(2));
    assert_eq!(pages.latest_version(&hum0001, Lang::En).unwrap(), Some(2));
    let hum0003: ResearchId = "hum0003".parse().unwrap();
    assert_eq!(pages.latest_version(&hum0003, Lang::Ja).unwrap(), None);

    let ids: Vec<String> = pages
        .research_ids()
        .unwrap()
        .iter()
        .map(|id| id.to_string())
        .collect();
    assert_eq!(ids, vec!["hum0001", "hum0002"]);
}

#[test]
fn pages_load_and_missing_pages_are_none() {
    let pages = fixtures();
    let key: PageKey = "hum0001-v2-en".parse().unwrap();
    let page = pages.load(&key).unwrap().unwrap();
    assert_eq!(page.molecular_data.len(), 2);
    assert_eq!(page.release_row(2).and_then(|row| row.release_date.as_deref()), Some("2018-04-01"));

    let missing: PageKey = "hum0001-v1-en".parse().unwrap();
    assert!(pages.load(&missing).unwrap().is_none());
}

#[test]
fn unparsable_page_is_malformed() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    fs::write(root.join("hum0005-v1-ja.json"), "{\"summary\": []}").unwrap();
    fs::write(root.join("notes.txt"), "ignored").unwrap();
    let pages = ParsedPageDir::new(root);

    let key: PageKey = "hum0005-v1-ja".parse().unwrap();
    assert_matches!(pages.load(&key), Err(PipelineError::MalformedPage { .. }));
    assert_eq!(pages.research_ids().unwrap().len(), 1);
}
