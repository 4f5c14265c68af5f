use std::fs;

use assert_matches::assert_matches;

use humandbs_pipeline::config::ConfigLoader;
use humandbs_pipeline::domain::{IdType, PageKey};
use humandbs_pipeline::error::PipelineError;

fn write_config(content: &str) -> (tempfile::TempDir, String) {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("humandbs.json");
    fs::write(&path, content).unwrap();
    let path = path.to_string_lossy().into_owned();
    (temp, path)
}

#[test]
fn full_config_is_resolved() {
    let (_temp, path) = write_config(
        r#"{
            "research_ids": ["hum0001", "HUM0014"],
            "concurrency": 8,
            "request_delay_ms": 250,
            "parsed_dir": "data/parsed",
            "output_dir": "data/out",
            "cache_dir": "/tmp/humandbs-cache",
            "probe_portal": true,
            "dead_pages": ["hum0014-v3-en"],
            "corrections": {"JGAS000001-JGAS000003": ["JGAS000001", "JGAS000002", "JGAS000003"]}
        }"#,
    );
    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();
    let ids: Vec<&str> = resolved.research_ids.iter().map(|id| id.as_str()).collect();
    assert_eq!(ids, vec!["hum0001", "hum0014"]);
    assert_eq!(resolved.concurrency, 8);
    assert_eq!(resolved.request_delay_ms, 250);
    assert_eq!(resolved.parsed_dir.as_str(), "data/parsed");
    assert!(resolved.probe_portal);
    let dead: PageKey = "hum0014-v3-en".parse().unwrap();
    assert!(resolved.dead_pages.contains(&dead));

    // configured corrections extend the built-in table
    assert_eq!(resolved.corrections.len(), 2);
    let extractor = humandbs_pipeline::accession::Extractor::new(resolved.corrections);
    assert_eq!(extractor.extract("JGAS000001-JGAS000003")[&IdType::Jgas].len(), 3);
    assert!(extractor.extract("AP023461-AP024084").contains_key(&IdType::BioProject));
}

#[test]
fn invalid_research_id_is_rejected() {
    let (_temp, path) = write_config(r#"{"research_ids": ["hum01"]}"#);
    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(PipelineError::InvalidResearchId(id)) if id == "hum01"
    );
}

#[test]
fn invalid_dead_page_key_is_rejected() {
    let (_temp, path) = write_config(r#"{"dead_pages": ["hum0001-v0-ja"]}"#);
    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(PipelineError::InvalidPageKey(_))
    );
}

#[test]
fn unreadable_and_unparsable_files() {
    assert_matches!(
        ConfigLoader::resolve(Some("/nonexistent/humandbs.json")),
        Err(PipelineError::ConfigRead(_))
    );
    let (_temp, path) = write_config("{ not json");
    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(PipelineError::ConfigParse(_))
    );
}
