//! Flattens matched ja/en pairs into the bilingual documents that are written
//! out. Nothing here decides which items belong together; that is the
//! matcher's job.

use std::collections::{BTreeMap, BTreeSet};

use crate::accession::Extractor;
use crate::domain::{Lang, TextValue};
use crate::matcher::{self, BilingualPair};
use crate::model::{
    BilingualExperiment, BilingualGrant, BilingualList, BilingualPerson, BilingualPublication,
    BilingualResearchProject, BilingualSummary, BilingualText, DatasetDoc, DatasetRef,
    DatasetVersion, Experiment, Grant, Person, Publication, Research, ResearchDoc,
    ResearchProject, ResearchVersion, ResearchVersionDoc,
};
use crate::xref::DatasetMetadata;

fn text_of<T>(pair: &BilingualPair<T>, f: impl Fn(&T) -> Option<TextValue>) -> BilingualText {
    BilingualText::new(pair.ja.as_ref().and_then(&f), pair.en.as_ref().and_then(&f))
}

fn union_ids<'a>(lists: impl IntoIterator<Item = &'a Vec<String>>) -> Vec<String> {
    lists
        .into_iter()
        .flatten()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn flatten_experiment(pair: BilingualPair<Experiment>) -> BilingualExperiment {
    let mut keys = BTreeSet::new();
    for side in [&pair.ja, &pair.en].into_iter().flatten() {
        keys.extend(side.data.keys().cloned());
    }
    let data = keys
        .into_iter()
        .map(|key| {
            let value = text_of(&pair, |exp: &Experiment| exp.data.get(&key).cloned().flatten());
            (key, value)
        })
        .collect();
    BilingualExperiment {
        header: text_of(&pair, |exp: &Experiment| Some(exp.header.clone())),
        data,
        footers: BilingualList {
            ja: pair.ja.as_ref().map(|exp| exp.footers.clone()).unwrap_or_default(),
            en: pair.en.as_ref().map(|exp| exp.footers.clone()).unwrap_or_default(),
        },
        match_type: pair.match_type,
    }
}

pub fn flatten_publication(pair: BilingualPair<Publication>) -> BilingualPublication {
    let doi = pair
        .ja
        .as_ref()
        .and_then(|p| p.doi.clone())
        .or_else(|| pair.en.as_ref().and_then(|p| p.doi.clone()));
    BilingualPublication {
        title: text_of(&pair, |p: &Publication| Some(p.title.clone())),
        doi,
        dataset_ids: union_ids(
            [&pair.ja, &pair.en]
                .into_iter()
                .flatten()
                .map(|p| &p.dataset_ids),
        ),
        match_type: pair.match_type,
    }
}

pub fn flatten_grant(pair: BilingualPair<Grant>) -> BilingualGrant {
    BilingualGrant {
        grant_ids: union_ids([&pair.ja, &pair.en].into_iter().flatten().map(|g| &g.grant_ids)),
        title: text_of(&pair, |g: &Grant| g.title.clone()),
        agency: text_of(&pair, |g: &Grant| g.agency.clone()),
        dataset_ids: union_ids([&pair.ja, &pair.en].into_iter().flatten().map(|g| &g.dataset_ids)),
        match_type: pair.match_type,
    }
}

pub fn flatten_person(pair: BilingualPair<Person>) -> BilingualPerson {
    let period = pair
        .ja
        .as_ref()
        .and_then(|p| p.period_of_data_use.clone())
        .or_else(|| pair.en.as_ref().and_then(|p| p.period_of_data_use.clone()));
    BilingualPerson {
        name: text_of(&pair, |p: &Person| Some(p.name.clone())),
        affiliation: text_of(&pair, |p: &Person| p.affiliation.clone()),
        country: text_of(&pair, |p: &Person| p.country.clone()),
        research_title: text_of(&pair, |p: &Person| p.research_title.clone()),
        dataset_ids: union_ids([&pair.ja, &pair.en].into_iter().flatten().map(|p| &p.dataset_ids)),
        period_of_data_use: period,
        match_type: pair.match_type,
    }
}

pub fn flatten_research_project(pair: BilingualPair<ResearchProject>) -> BilingualResearchProject {
    let url = pair
        .ja
        .as_ref()
        .and_then(|p| p.url.clone())
        .or_else(|| pair.en.as_ref().and_then(|p| p.url.clone()));
    BilingualResearchProject {
        name: text_of(&pair, |p: &ResearchProject| Some(p.name.clone())),
        url,
        match_type: pair.match_type,
    }
}

fn summary_text(research: Option<&Research>, f: fn(&Research) -> &TextValue) -> Option<TextValue> {
    research.map(f).filter(|value| !value.is_blank()).cloned()
}

fn field<T: Clone>(research: Option<&Research>, f: impl Fn(&Research) -> &Vec<T>) -> Vec<T> {
    research.map(|r| f(r).clone()).unwrap_or_default()
}

/// Merges the two single-language aggregates of one research id.
pub fn merge_research(
    ja: Option<&Research>,
    en: Option<&Research>,
    versions: &[u32],
) -> Option<ResearchDoc> {
    let any = ja.or(en)?;
    let hum_id = any.hum_id.clone();
    let latest_version = ja
        .map(|r| r.latest_version)
        .into_iter()
        .chain(en.map(|r| r.latest_version))
        .max()
        .unwrap_or(any.latest_version);
    let summary = BilingualSummary {
        aims: BilingualText::new(
            summary_text(ja, |r| &r.summary.aims),
            summary_text(en, |r| &r.summary.aims),
        ),
        methods: BilingualText::new(
            summary_text(ja, |r| &r.summary.methods),
            summary_text(en, |r| &r.summary.methods),
        ),
        targets: BilingualText::new(
            summary_text(ja, |r| &r.summary.targets),
            summary_text(en, |r| &r.summary.targets),
        ),
        url: BilingualList {
            ja: ja.map(|r| r.summary.url.clone()).unwrap_or_default(),
            en: en.map(|r| r.summary.url.clone()).unwrap_or_default(),
        },
    };

    let title = BilingualText::new(
        ja.map(|r| TextValue::plain(r.title.clone())),
        en.map(|r| TextValue::plain(r.title.clone())),
    );

    let data_provider = matcher::match_persons(
        field(ja, |r| &r.data_provider),
        field(en, |r| &r.data_provider),
    )
    .into_iter()
    .map(flatten_person)
    .collect();
    let research_projects = matcher::match_research_projects(
        field(ja, |r| &r.research_projects),
        field(en, |r| &r.research_projects),
    )
    .into_iter()
    .map(flatten_research_project)
    .collect();
    let grants = matcher::match_grants(field(ja, |r| &r.grants), field(en, |r| &r.grants))
        .into_iter()
        .map(flatten_grant)
        .collect();
    let publications =
        matcher::match_publications(field(ja, |r| &r.publications), field(en, |r| &r.publications))
            .into_iter()
            .map(flatten_publication)
            .collect();
    let controlled_access_users = matcher::match_persons(
        field(ja, |r| &r.controlled_access_users),
        field(en, |r| &r.controlled_access_users),
    )
    .into_iter()
    .map(flatten_person)
    .collect();

    let hum = hum_id.clone();
    Some(ResearchDoc {
        hum_id,
        latest_version,
        title,
        summary,
        data_provider,
        research_projects,
        grants,
        publications,
        controlled_access_users,
        versions: versions.iter().map(|v| format!("{hum}-v{v}")).collect(),
        dataset_ids: union_ids([ja, en].into_iter().flatten().map(|r| &r.dataset_ids)),
    })
}

/// One document per page version seen in either language.
pub fn merge_research_versions(
    ja: &[ResearchVersion],
    en: &[ResearchVersion],
) -> Vec<ResearchVersionDoc> {
    let mut by_version: BTreeMap<u32, (Option<&ResearchVersion>, Option<&ResearchVersion>)> =
        BTreeMap::new();
    for rv in ja {
        by_version.entry(rv.version).or_default().0 = Some(rv);
    }
    for rv in en {
        by_version.entry(rv.version).or_default().1 = Some(rv);
    }
    by_version
        .into_iter()
        .filter_map(|(version, (ja, en))| {
            let any = ja.or(en)?;
            let datasets: BTreeSet<DatasetRef> = [ja, en]
                .into_iter()
                .flatten()
                .flat_map(|rv| rv.datasets.iter().cloned())
                .collect();
            Some(ResearchVersionDoc {
                hum_id: any.hum_id.clone(),
                hum_version_id: format!("{}-v{version}", any.hum_id),
                version,
                release_date: ja
                    .and_then(|rv| rv.release_date.clone())
                    .or_else(|| en.and_then(|rv| rv.release_date.clone())),
                release_note: BilingualText::new(
                    ja.and_then(|rv| rv.release_note.clone()),
                    en.and_then(|rv| rv.release_note.clone()),
                ),
                datasets: datasets.into_iter().collect(),
            })
        })
        .collect()
}

/// Pairs dataset versions sharing (dataset id, version label) across the two
/// languages and matches their experiments.
pub fn merge_datasets(
    datasets: &[DatasetVersion],
    extractor: &Extractor,
    metadata: &BTreeMap<String, Option<DatasetMetadata>>,
) -> Vec<DatasetDoc> {
    let mut grouped: BTreeMap<(String, String), (Option<&DatasetVersion>, Option<&DatasetVersion>)> =
        BTreeMap::new();
    for dataset in datasets {
        let slot = grouped
            .entry((dataset.dataset_id.clone(), dataset.version.clone()))
            .or_default();
        match dataset.lang {
            Lang::Ja => slot.0 = Some(dataset),
            Lang::En => slot.1 = Some(dataset),
        }
    }
    grouped
        .into_iter()
        .filter_map(|((dataset_id, version), (ja, en))| {
            let any = ja.or(en)?;
            let experiments = matcher::match_experiments(
                ja.map(|d| d.experiments.clone()).unwrap_or_default(),
                en.map(|d| d.experiments.clone()).unwrap_or_default(),
                extractor,
            )
            .into_iter()
            .map(flatten_experiment)
            .collect();
            let meta = metadata.get(&dataset_id).and_then(|meta| meta.as_ref());
            let release_date = ja
                .and_then(|d| d.release_date.clone())
                .or_else(|| en.and_then(|d| d.release_date.clone()))
                .or_else(|| meta.and_then(|m| m.release_date.clone()));
            Some(DatasetDoc {
                hum_id: any.hum_id.clone(),
                title: meta.and_then(|m| m.title.clone()),
                type_of_data: BilingualText::new(
                    ja.and_then(|d| d.type_of_data.clone()),
                    en.and_then(|d| d.type_of_data.clone()),
                ),
                criteria: ja
                    .and_then(|d| d.criteria.clone())
                    .or_else(|| en.and_then(|d| d.criteria.clone())),
                release_date,
                experiments,
                dataset_id,
                version,
            })
        })
        .collect()
}

/// Completes a freshly merged dataset document with what an earlier run
/// stored and this run lacks: a language side whose unit failed, or metadata
/// that could not be fetched. Sides present in both are taken from
/// `incoming`; whether they agree is for the writer to decide.
pub fn reconcile_dataset(
    stored: &DatasetDoc,
    incoming: DatasetDoc,
    extractor: &Extractor,
) -> DatasetDoc {
    let side_missing = Lang::ALL.into_iter().any(|lang| {
        incoming.experiments_in(lang).is_empty() && !stored.experiments_in(lang).is_empty()
    });
    let experiments = if side_missing {
        let side = |lang: Lang| {
            let own = incoming.experiments_in(lang);
            if own.is_empty() { stored.experiments_in(lang) } else { own }
        };
        matcher::match_experiments(side(Lang::Ja), side(Lang::En), extractor)
            .into_iter()
            .map(flatten_experiment)
            .collect()
    } else {
        incoming.experiments
    };
    DatasetDoc {
        dataset_id: incoming.dataset_id,
        version: incoming.version,
        hum_id: incoming.hum_id,
        title: incoming.title.or_else(|| stored.title.clone()),
        type_of_data: BilingualText::new(
            incoming.type_of_data.ja.or_else(|| stored.type_of_data.ja.clone()),
            incoming.type_of_data.en.or_else(|| stored.type_of_data.en.clone()),
        ),
        criteria: incoming.criteria.or_else(|| stored.criteria.clone()),
        release_date: incoming.release_date.or_else(|| stored.release_date.clone()),
        experiments,
    }
}
