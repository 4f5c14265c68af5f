use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use humandbs_pipeline::accession::Extractor;
use humandbs_pipeline::config::{ConfigLoader, ConfigOverrides, ResolvedConfig};
use humandbs_pipeline::domain::{IdType, ResearchId};
use humandbs_pipeline::error::PipelineError;
use humandbs_pipeline::output::{JsonDirWriter, JsonOutput};
use humandbs_pipeline::pipeline::{Pipeline, PipelineOptions, RunSummary};
use humandbs_pipeline::portal::{
    LatestVersionListing, ParsedPageDir, PageLoader, PortalHttpClient, VersionProbe,
};
use humandbs_pipeline::store::{self, Store};
use humandbs_pipeline::versioner::VersionLedger;
use humandbs_pipeline::xref::{DdbjXrefSource, Resolver, XrefCacheFile, XrefDirection};

const XREF_NAMESPACE: &str = "jga";

#[derive(Parser)]
#[command(name = "humandbs")]
#[command(about = "Reconcile NBDC Human Database catalog pages into bilingual research and dataset documents")]
#[command(version, author)]
struct Cli {
    /// Config file (defaults to ./humandbs.json)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Crawl research ids (all configured ids when none are given)")]
    Run(RunArgs),
    #[command(about = "Print the accession ids found in a piece of text")]
    Extract(ExtractArgs),
    #[command(about = "Resolve a study to its datasets or a dataset to its studies")]
    Resolve(ResolveArgs),
    #[command(about = "Inspect or clear the local cache")]
    Cache(CacheArgs),
}

#[derive(Args)]
struct RunArgs {
    ids: Vec<String>,

    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long)]
    delay_ms: Option<u64>,

    /// Ignore cached answers and ask the services again; fresh answers are still cached.
    #[arg(long)]
    no_cache: bool,
}

#[derive(Args)]
struct ExtractArgs {
    text: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Forward,
    Backward,
}

impl From<DirectionArg> for XrefDirection {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Forward => XrefDirection::Forward,
            DirectionArg::Backward => XrefDirection::Backward,
        }
    }
}

#[derive(Args)]
struct ResolveArgs {
    direction: DirectionArg,
    id: String,

    /// Ignore cached answers and ask the services again; fresh answers are still cached.
    #[arg(long)]
    no_cache: bool,
}

#[derive(Args)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Subcommand)]
enum CacheCommand {
    #[command(about = "Remove one cache namespace, or the whole cache")]
    Clear {
        #[arg(long)]
        namespace: Option<String>,
    },
    #[command(about = "Entry counts per cache namespace")]
    Stats,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<PipelineError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &PipelineError) -> u8 {
    match error {
        PipelineError::MissingConfig
        | PipelineError::ConfigRead(_)
        | PipelineError::ConfigParse(_)
        | PipelineError::InvalidResearchId(_)
        | PipelineError::InvalidLang(_)
        | PipelineError::InvalidPageKey(_) => 2,
        error if error.is_network() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_crawl(cli.config.as_deref(), args),
        Commands::Extract(args) => {
            let config = ConfigLoader::resolve_or_default(cli.config.as_deref())?;
            run_extract(config, args)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Resolve(args) => {
            let config = ConfigLoader::resolve_or_default(cli.config.as_deref())?;
            run_resolve(config, args)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Cache(args) => {
            let config = ConfigLoader::resolve_or_default(cli.config.as_deref())?;
            let store = Store::new_with_root(config.cache_dir);
            match args.command {
                CacheCommand::Clear { namespace } => run_cache_clear(&store, namespace)?,
                CacheCommand::Stats => run_cache_stats(&store)?,
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_crawl(config_path: Option<&str>, args: RunArgs) -> miette::Result<ExitCode> {
    let config = ConfigLoader::resolve(config_path)?.apply(&ConfigOverrides {
        concurrency: args.concurrency,
        request_delay_ms: args.delay_ms,
    });
    let research_ids = if args.ids.is_empty() {
        config.research_ids.clone()
    } else {
        args.ids
            .iter()
            .map(|id| id.parse::<ResearchId>())
            .collect::<Result<Vec<_>, _>>()?
    };

    let store = Store::new_with_root(config.cache_dir.clone());
    store.ensure_cache_root()?;
    let use_cache = !args.no_cache;
    let delay = Duration::from_millis(config.request_delay_ms);

    let source = Arc::new(DdbjXrefSource::new(
        &config.xref_base_url,
        store.clone(),
        delay,
        use_cache,
    )?);
    let mut resolver = Resolver::new(
        Box::new(Arc::clone(&source)),
        store.xref_cache_path(XREF_NAMESPACE),
        config.flush_every,
    );
    if !use_cache {
        resolver = resolver.bypass_cache();
    }
    let resolver = Arc::new(resolver);

    let pages = Arc::new(ParsedPageDir::new(config.parsed_dir.clone()));
    let loader: Arc<dyn PageLoader> = pages.clone();
    let probe: Arc<dyn VersionProbe> = if config.probe_portal {
        Arc::new(PortalHttpClient::new(&config.portal_base_url, config.max_version)?)
    } else {
        pages
    };

    let listing = if use_cache {
        LatestVersionListing::load(&store.listing_path())?
    } else {
        LatestVersionListing::empty(&store.listing_path())
    };
    let ledger_path = store.ledger_path();
    let ledger = VersionLedger::load(&ledger_path)?;

    info!(
        research_ids = research_ids.len(),
        parsed_dir = %config.parsed_dir,
        output_dir = %config.output_dir,
        "run configured"
    );

    let pipeline = Pipeline::new(
        resolver,
        loader,
        probe,
        Arc::new(JsonDirWriter::new(config.output_dir.clone())),
    )
    .with_options(PipelineOptions {
        concurrency: config.concurrency,
        dead_pages: config.dead_pages.clone(),
        use_listing: use_cache && config.probe_portal,
    })
    .with_extractor(Extractor::new(config.corrections.clone()))
    .with_metadata(source)
    .with_listing(listing)
    .with_ledger(ledger, Some(ledger_path));

    let summary = pipeline.run(&research_ids)?;
    JsonOutput::print(&summary).into_diagnostic()?;
    Ok(summary_exit_code(&summary))
}

fn summary_exit_code(summary: &RunSummary) -> ExitCode {
    if summary.units_failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(4)
    }
}

fn run_extract(config: ResolvedConfig, args: ExtractArgs) -> miette::Result<()> {
    let extractor = Extractor::new(config.corrections);
    let found: BTreeMap<IdType, Vec<String>> = extractor
        .extract(&args.text)
        .into_iter()
        .map(|(id_type, values)| (id_type, values.into_iter().collect()))
        .collect();
    JsonOutput::print(&found).into_diagnostic()?;
    Ok(())
}

#[derive(Serialize)]
struct ResolveResult {
    direction: String,
    id: String,
    resolved: Vec<String>,
}

fn run_resolve(config: ResolvedConfig, args: ResolveArgs) -> miette::Result<()> {
    let store = Store::new_with_root(config.cache_dir.clone());
    let source = DdbjXrefSource::new(
        &config.xref_base_url,
        store.clone(),
        Duration::from_millis(config.request_delay_ms),
        !args.no_cache,
    )?;
    let mut resolver = Resolver::new(
        Box::new(source),
        store.xref_cache_path(XREF_NAMESPACE),
        config.flush_every,
    );
    if args.no_cache {
        resolver = resolver.bypass_cache();
    }
    let direction = XrefDirection::from(args.direction);
    let resolved = resolver.resolve(direction, args.id.trim())?;
    resolver.flush()?;
    JsonOutput::print(&ResolveResult {
        direction: direction.to_string(),
        id: args.id.trim().to_string(),
        resolved,
    })
    .into_diagnostic()?;
    Ok(())
}

#[derive(Serialize)]
struct ClearResult {
    cache_root: String,
    removed: Vec<String>,
}

fn run_cache_clear(store: &Store, namespace: Option<String>) -> miette::Result<()> {
    let targets: Vec<&str> = match namespace.as_deref() {
        Some(name) => {
            if store.namespace_dir(name).is_none() {
                return Err(miette::Report::msg(format!(
                    "unknown cache namespace {name} (expected one of {})",
                    store::NAMESPACES.join(", ")
                )));
            }
            vec![name]
        }
        None => store::NAMESPACES.to_vec(),
    };
    let mut removed = Vec::new();
    for name in targets {
        if let Some(dir) = store.namespace_dir(name)
            && Store::remove_dir(&dir)?
        {
            removed.push(name.to_string());
        }
    }
    JsonOutput::print(&ClearResult {
        cache_root: store.cache_root().to_string(),
        removed,
    })
    .into_diagnostic()?;
    Ok(())
}

#[derive(Serialize)]
struct StatsResult {
    cache_root: String,
    xref_forward: usize,
    xref_backward: usize,
    fetched: BTreeMap<String, usize>,
    listing: usize,
    ledger: usize,
}

fn run_cache_stats(store: &Store) -> miette::Result<()> {
    let xref: XrefCacheFile =
        Store::read_json(&store.xref_cache_path(XREF_NAMESPACE))?.unwrap_or_default();
    let mut fetched = BTreeMap::new();
    for name in ["jga-study", "jga-dataset"] {
        fetched.insert(name.to_string(), Store::count_files(&store.fetch_dir(name))?);
    }
    let listing: BTreeMap<String, u32> =
        Store::read_json(&store.listing_path())?.unwrap_or_default();
    let ledger = VersionLedger::load(&store.ledger_path())?;
    JsonOutput::print(&StatsResult {
        cache_root: store.cache_root().to_string(),
        xref_forward: xref.forward.len(),
        xref_backward: xref.backward.len(),
        fetched,
        listing: listing.len(),
        ledger: ledger.len(),
    })
    .into_diagnostic()?;
    Ok(())
}
