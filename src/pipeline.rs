//! Crawl orchestration: per (research id, language) units run on a bounded
//! pool of scoped threads, then a language-independent pass merges the two
//! sides of every research id and writes the documents.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::accession::{Extractor, flatten};
use crate::domain::{IdType, Lang, PageKey, ResearchId, TextValue};
use crate::error::PipelineError;
use crate::inversion::{ExpansionMap, invert};
use crate::merge;
use crate::model::{
    DatasetRef, DatasetRow, DatasetVersion, Experiment, Grant, ParseResult, Person, Publication,
    Research, ResearchProject, ResearchVersion,
};
use crate::output::DocumentWriter;
use crate::portal::{LatestVersionListing, PageLoader, VersionProbe};
use crate::versioner::VersionLedger;
use crate::xref::{DatasetMetadataSource, Resolver};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub concurrency: usize,
    pub dead_pages: BTreeSet<PageKey>,
    pub use_listing: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency: crate::config::DEFAULT_CONCURRENCY,
            dead_pages: BTreeSet::new(),
            use_listing: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    pub research_id: String,
    pub lang: Option<Lang>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub units_ok: usize,
    pub units_failed: Vec<UnitFailure>,
    pub research_written: usize,
    pub datasets_written: usize,
    pub conflicts: usize,
    pub elapsed_ms: u64,
}

/// Everything one (research id, language) unit produced.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitOutput {
    pub research: Research,
    pub versions: Vec<ResearchVersion>,
    pub datasets: Vec<DatasetVersion>,
}

/// What a unit's worker reads from its pages. Version labels are minted later,
/// on the calling thread.
#[derive(Debug, Clone)]
struct UnitDraft {
    research: Research,
    pages: Vec<PageDraft>,
}

#[derive(Debug, Clone)]
struct PageDraft {
    version: u32,
    release_date: Option<String>,
    release_note: Option<TextValue>,
    datasets: Vec<DatasetDraft>,
}

#[derive(Debug, Clone)]
struct DatasetDraft {
    dataset_id: String,
    type_of_data: Option<TextValue>,
    criteria: Option<String>,
    release_date: Option<String>,
    experiments: Vec<Experiment>,
}

pub struct Pipeline {
    options: PipelineOptions,
    extractor: Extractor,
    resolver: Arc<Resolver>,
    loader: Arc<dyn PageLoader>,
    probe: Arc<dyn VersionProbe>,
    writer: Arc<dyn DocumentWriter>,
    metadata: Option<Arc<dyn DatasetMetadataSource>>,
    listing: Option<LatestVersionListing>,
    ledger: Mutex<VersionLedger>,
    ledger_path: Option<Utf8PathBuf>,
}

impl Pipeline {
    pub fn new(
        resolver: Arc<Resolver>,
        loader: Arc<dyn PageLoader>,
        probe: Arc<dyn VersionProbe>,
        writer: Arc<dyn DocumentWriter>,
    ) -> Self {
        Self {
            options: PipelineOptions::default(),
            extractor: Extractor::default(),
            resolver,
            loader,
            probe,
            writer,
            metadata: None,
            listing: None,
            ledger: Mutex::new(VersionLedger::default()),
            ledger_path: None,
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn DatasetMetadataSource>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_listing(mut self, listing: LatestVersionListing) -> Self {
        self.listing = Some(listing);
        self
    }

    /// Seeds version history and saves it back to `path` at the end of a run.
    pub fn with_ledger(mut self, ledger: VersionLedger, path: Option<Utf8PathBuf>) -> Self {
        self.ledger = Mutex::new(ledger);
        self.ledger_path = path;
        self
    }

    pub fn ledger_snapshot(&self) -> VersionLedger {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn run(&self, research_ids: &[ResearchId]) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        let units: Vec<(ResearchId, Lang)> = research_ids
            .iter()
            .flat_map(|id| Lang::ALL.into_iter().map(move |lang| (id.clone(), lang)))
            .collect();
        info!(
            research_ids = research_ids.len(),
            units = units.len(),
            concurrency = self.options.concurrency,
            "starting crawl"
        );

        let mut drafts: BTreeMap<ResearchId, BTreeMap<Lang, UnitDraft>> = BTreeMap::new();
        for (id, lang, result) in self.run_units(&units) {
            match result {
                Ok(Some(draft)) => {
                    drafts.entry(id).or_default().insert(lang, draft);
                }
                Ok(None) => {
                    summary.units_ok += 1;
                    debug!(research_id = %id, %lang, "no page in this language");
                }
                Err(err) => record_unit_failure(&mut summary, &id, lang, err),
            }
        }

        // Labels are minted in (research id, language, page version) order so
        // the outcome does not depend on which worker finished first.
        for (id, sides) in drafts {
            let mut outputs = BTreeMap::new();
            for (lang, draft) in sides {
                match self.label_unit(lang, draft) {
                    Ok(output) => {
                        summary.units_ok += 1;
                        outputs.insert(lang, output);
                    }
                    Err(err) => record_unit_failure(&mut summary, &id, lang, err),
                }
            }
            let ja = outputs.remove(&Lang::Ja);
            let en = outputs.remove(&Lang::En);
            if let Err(err) = self.write_research(&id, ja.as_ref(), en.as_ref(), &mut summary) {
                warn!(research_id = %id, error = %err, "writing documents failed");
                summary.units_failed.push(UnitFailure {
                    research_id: id.to_string(),
                    lang: None,
                    error: err.to_string(),
                });
            }
        }

        self.finish()?;
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            units_ok = summary.units_ok,
            units_failed = summary.units_failed.len(),
            research_written = summary.research_written,
            datasets_written = summary.datasets_written,
            conflicts = summary.conflicts,
            "crawl finished"
        );
        Ok(summary)
    }

    /// Runs units in batches of `concurrency`; a batch is joined before the
    /// next one starts.
    fn run_units(
        &self,
        units: &[(ResearchId, Lang)],
    ) -> Vec<(ResearchId, Lang, Result<Option<UnitDraft>, PipelineError>)> {
        let mut results = Vec::with_capacity(units.len());
        for batch in units.chunks(self.options.concurrency.max(1)) {
            thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|(id, lang)| (id, *lang, scope.spawn(move || self.process_unit(id, *lang))))
                    .collect();
                for (id, lang, handle) in handles {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(PipelineError::WorkerPanicked(format!("{id}-{lang}")))
                    });
                    results.push((id.clone(), lang, result));
                }
            });
        }
        results
    }

    fn latest_version(&self, id: &ResearchId, lang: Lang) -> Result<Option<u32>, PipelineError> {
        if self.options.use_listing
            && let Some(version) = self.listing.as_ref().and_then(|listing| listing.get(id, lang))
        {
            debug!(research_id = %id, %lang, version, "latest version from listing");
            return Ok(Some(version));
        }
        let latest = self.probe.latest_version(id, lang)?;
        if let (Some(version), Some(listing)) = (latest, self.listing.as_ref()) {
            listing.set(id, lang, version);
        }
        Ok(latest)
    }

    fn process_unit(&self, id: &ResearchId, lang: Lang) -> Result<Option<UnitDraft>, PipelineError> {
        let Some(latest) = self.latest_version(id, lang)? else {
            return Ok(None);
        };

        let mut pages = Vec::new();
        let mut newest: Option<(u32, ParseResult, ExpansionMap, Vec<String>)> = None;

        for version in 1..=latest {
            let key = PageKey::new(id.clone(), version, lang);
            if self.options.dead_pages.contains(&key) {
                debug!(page = %key, "skipping known-dead page");
                continue;
            }
            let page = match self.loader.load(&key) {
                Ok(Some(page)) => page,
                Ok(None) => {
                    debug!(page = %key, "page not available");
                    continue;
                }
                Err(err @ PipelineError::MalformedPage { .. }) if version < latest => {
                    warn!(page = %key, error = %err, "skipping unreadable page");
                    continue;
                }
                Err(err) => return Err(err),
            };
            if let Err(err) = page.validate(&key) {
                if version == latest {
                    return Err(err);
                }
                warn!(page = %key, error = %err, "skipping malformed page");
                continue;
            }

            let inversion = invert(&page.molecular_data, &self.extractor, &self.resolver)?;
            let datasets = inversion
                .datasets
                .iter()
                .map(|(dataset_id, records)| {
                    let row = self.dataset_row(&page, dataset_id);
                    DatasetDraft {
                        dataset_id: dataset_id.clone(),
                        type_of_data: row.and_then(|row| row.type_of_data.clone()),
                        criteria: row.and_then(|row| row.criteria.clone()),
                        release_date: row.and_then(|row| row.release_date.clone()),
                        experiments: records.iter().map(Experiment::from).collect(),
                    }
                })
                .collect();

            let release = page.release_row(version);
            pages.push(PageDraft {
                version,
                release_date: release.and_then(|row| row.release_date.clone()),
                release_note: release.and_then(|row| row.note.clone()),
                datasets,
            });
            let dataset_ids = inversion.datasets.keys().cloned().collect();
            newest = Some((version, page, inversion.expansion, dataset_ids));
        }

        let Some((version, page, expansion, dataset_ids)) = newest else {
            return Err(PipelineError::NoPageVersions(format!("{id}-{lang}")));
        };
        let research = self.build_research(id, lang, version, page, &expansion, dataset_ids);
        debug!(research_id = %id, %lang, pages = pages.len(), "unit processed");
        Ok(Some(UnitDraft { research, pages }))
    }

    /// Assigns version labels to every dataset of a draft, oldest page first.
    fn label_unit(&self, lang: Lang, draft: UnitDraft) -> Result<UnitOutput, PipelineError> {
        let UnitDraft { research, pages } = draft;
        let mut ledger = self
            .ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut versions = Vec::with_capacity(pages.len());
        let mut datasets: BTreeMap<(String, String), DatasetVersion> = BTreeMap::new();
        for page in pages {
            let mut refs = Vec::with_capacity(page.datasets.len());
            for dataset in page.datasets {
                let label = ledger.assign(&dataset.dataset_id, lang, &dataset.experiments)?;
                refs.push(DatasetRef {
                    dataset_id: dataset.dataset_id.clone(),
                    version: label.clone(),
                });
                datasets.insert(
                    (dataset.dataset_id.clone(), label.clone()),
                    DatasetVersion {
                        dataset_id: dataset.dataset_id,
                        lang,
                        version: label,
                        hum_id: research.hum_id.clone(),
                        type_of_data: dataset.type_of_data,
                        criteria: dataset.criteria,
                        release_date: dataset.release_date,
                        experiments: dataset.experiments,
                    },
                );
            }
            versions.push(ResearchVersion {
                hum_id: research.hum_id.clone(),
                lang,
                version: page.version,
                release_date: page.release_date,
                release_note: page.release_note,
                datasets: refs,
            });
        }
        Ok(UnitOutput {
            research,
            versions,
            datasets: datasets.into_values().collect(),
        })
    }

    fn dataset_row<'p>(&self, page: &'p ParseResult, dataset_id: &str) -> Option<&'p DatasetRow> {
        page.datasets.iter().find(|row| {
            row.dataset_id.text.trim() == dataset_id
                || self
                    .extractor
                    .extract(&row.dataset_id.text)
                    .values()
                    .any(|ids| ids.contains(dataset_id))
        })
    }

    fn referenced_ids(&self, text: &TextValue, expansion: &ExpansionMap) -> Vec<String> {
        let ids = flatten(&self.extractor.extract(&text.text));
        expansion.expand(ids.iter().map(|id| id.value.as_str()))
    }

    fn build_research(
        &self,
        id: &ResearchId,
        lang: Lang,
        version: u32,
        page: ParseResult,
        expansion: &ExpansionMap,
        dataset_ids: Vec<String>,
    ) -> Research {
        let provider = &page.data_provider;
        let data_provider = provider
            .principal_investigator
            .iter()
            .enumerate()
            .map(|(idx, name)| Person {
                name: name.clone(),
                affiliation: provider.affiliation.get(idx).cloned(),
                country: None,
                research_title: None,
                dataset_ids: Vec::new(),
                period_of_data_use: None,
            })
            .collect();
        let research_projects = provider
            .project_name
            .iter()
            .enumerate()
            .map(|(idx, name)| ResearchProject {
                name: name.clone(),
                url: provider.project_url.get(idx).map(|url| url.url.clone()),
            })
            .collect();
        let grants = provider
            .grants
            .iter()
            .map(|row| Grant {
                grant_ids: row
                    .grant_id
                    .iter()
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty())
                    .collect(),
                title: row.title.clone(),
                agency: row.agency.clone(),
                dataset_ids: self.referenced_ids(&row.dataset_ids, expansion),
            })
            .collect();
        let publications = page
            .publications
            .iter()
            .map(|row| Publication {
                title: row.title.clone(),
                doi: row.doi.clone().filter(|doi| !doi.trim().is_empty()),
                dataset_ids: self.referenced_ids(&row.dataset_ids, expansion),
            })
            .collect();
        let controlled_access_users = page
            .controlled_access_users
            .iter()
            .map(|row| Person {
                name: row.principal_investigator.clone(),
                affiliation: row.affiliation.clone(),
                country: row.country.clone(),
                research_title: row.research_title.clone(),
                dataset_ids: self.referenced_ids(&row.dataset_ids, expansion),
                period_of_data_use: row.period_of_data_use.clone(),
            })
            .collect();

        Research {
            hum_id: id.to_string(),
            lang,
            latest_version: version,
            title: page.title,
            summary: page.summary,
            data_provider,
            research_projects,
            grants,
            publications,
            controlled_access_users,
            dataset_ids,
        }
    }

    fn write_research(
        &self,
        id: &ResearchId,
        ja: Option<&UnitOutput>,
        en: Option<&UnitOutput>,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let sides: Vec<&UnitOutput> = [ja, en].into_iter().flatten().collect();
        let all_datasets: Vec<DatasetVersion> = sides
            .iter()
            .flat_map(|side| side.datasets.iter().cloned())
            .collect();

        let metadata = match &self.metadata {
            Some(source) => {
                let jgad: Vec<String> = all_datasets
                    .iter()
                    .map(|dataset| dataset.dataset_id.clone())
                    .filter(|dataset_id| {
                        self.extractor
                            .extract(dataset_id)
                            .contains_key(&IdType::Jgad)
                    })
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                source.dataset_metadata(&jgad)
            }
            None => BTreeMap::new(),
        };

        for doc in merge::merge_datasets(&all_datasets, &self.extractor, &metadata) {
            let doc = match self.writer.read_dataset(&doc.dataset_id, &doc.version)? {
                Some(stored) => merge::reconcile_dataset(&stored, doc, &self.extractor),
                None => doc,
            };
            if self.writer.write_dataset(&doc)? {
                summary.datasets_written += 1;
            } else {
                summary.conflicts += 1;
            }
        }

        let versions = merge::merge_research_versions(
            ja.map(|side| side.versions.as_slice()).unwrap_or_default(),
            en.map(|side| side.versions.as_slice()).unwrap_or_default(),
        );
        let version_numbers: Vec<u32> = versions.iter().map(|doc| doc.version).collect();
        let Some(research) = merge::merge_research(
            ja.map(|side| &side.research),
            en.map(|side| &side.research),
            &version_numbers,
        ) else {
            return Ok(());
        };
        if self.writer.write_research_bundle(&research, &versions)? {
            summary.research_written += 1;
        } else {
            summary.conflicts += 1;
        }
        debug!(research_id = %id, versions = versions.len(), "research documents written");
        Ok(())
    }

    fn finish(&self) -> Result<(), PipelineError> {
        self.resolver.flush()?;
        if let Some(listing) = &self.listing {
            listing.save()?;
        }
        if let Some(path) = &self.ledger_path {
            self.ledger_snapshot().save(path)?;
        }
        Ok(())
    }
}

fn record_unit_failure(summary: &mut RunSummary, id: &ResearchId, lang: Lang, err: PipelineError) {
    warn!(research_id = %id, %lang, error = %err, "unit failed");
    summary.units_failed.push(UnitFailure {
        research_id: id.to_string(),
        lang: Some(lang),
        error: err.to_string(),
    });
}
