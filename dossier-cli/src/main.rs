//! Dossier CLI - command-line interface for company research
//!
//! Runs the iterative research loop, the single-pass pipeline and curated-document
//! enrichment, streaming progress events to stderr and results to stdout or a file.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dossier_core::{init_logging, DossierConfig, LoggingConfig};
use dossier_research::{
    seed_queries, CuratedSet, EnrichmentBatcher, ProgressHub, ProgressReporter, QueryPlanner,
    ResearchOrchestrator, ResearchReport, ResearchRequest, SiumaiLanguageModel,
    TavilyExtractClient, TavilySearchProvider, WebContentFetcher, WebExtractor, DEFAULT_SECTIONS,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "dossier")]
#[command(about = "Budget-bounded web research about a company")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Do not stream progress events to stderr
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Research an entity and print the collected documents
    Research {
        /// Company name
        entity: String,

        /// Output locale passed through to downstream stages
        #[arg(long, default_value = "en")]
        locale: String,

        /// Required sections (comma separated)
        #[arg(long, value_delimiter = ',')]
        sections: Vec<String>,

        /// Step budget, overriding the configured value
        #[arg(long)]
        max_steps: Option<usize>,

        /// Overall deadline in seconds; partial results are returned when it expires
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Run the one-shot bucket pipeline instead of the iterative loop
        #[arg(long)]
        single_pass: bool,

        /// Skip the language model; only seed queries are searched
        #[arg(long)]
        no_llm: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fill missing full content of a curated document set
    Enrich {
        /// JSON file: {category: {url: document}}
        input: PathBuf,

        /// Where to write the enriched set (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Content source
        #[arg(long, value_enum, default_value = "tavily")]
        fetcher: FetcherKind,
    },

    /// Print the seed queries for an entity
    Seeds {
        /// Company name
        entity: String,

        /// Sections (comma separated)
        #[arg(long, value_delimiter = ',')]
        sections: Vec<String>,
    },

    /// Manage configuration
    Config {
        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Markdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FetcherKind {
    Tavily,
    Web,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logging_config = if cli.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig::default()
    };
    init_logging(&logging_config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting Dossier CLI v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Research {
            entity,
            locale,
            sections,
            max_steps,
            deadline_secs,
            single_pass,
            no_llm,
            format,
            output,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let mut request = ResearchRequest::new(entity, locale, sections);
            request.max_steps = max_steps;
            request.deadline = deadline_secs.map(Duration::from_secs);

            handle_research(
                &config,
                request,
                single_pass,
                no_llm,
                cli.quiet,
                format,
                output.as_deref(),
            )
            .await?;
        }
        Commands::Enrich {
            input,
            output,
            fetcher,
        } => {
            let config = load_config(cli.config.as_deref())?;
            handle_enrich(&config, &input, output.as_deref(), fetcher, cli.quiet).await?;
        }
        Commands::Seeds { entity, sections } => {
            let sections = if sections.is_empty() {
                DEFAULT_SECTIONS.iter().map(|s| s.to_string()).collect()
            } else {
                sections
            };
            for query in seed_queries(&entity, &sections) {
                println!("{}", query);
            }
        }
        Commands::Config {
            init,
            show,
            validate,
        } => {
            handle_config(cli.config.as_deref(), init, show, validate)?;
        }
    }

    Ok(())
}

fn load_config(config_path: Option<&Path>) -> Result<DossierConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from {:?}", path);
        return Ok(DossierConfig::from_file(path)?);
    }

    let default_paths = [
        Some(default_config_path()),
        dirs::home_dir().map(|d| d.join(".dossier").join("config.toml")),
        Some(PathBuf::from("dossier.toml")),
    ];

    for path in default_paths.iter().flatten() {
        if path.exists() {
            info!("Loading configuration from {:?}", path);
            return Ok(DossierConfig::from_file(path)?);
        }
    }

    info!("No configuration file found, using defaults");
    Ok(DossierConfig::default())
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dossier")
        .join("config.toml")
}

async fn build_orchestrator(config: &DossierConfig, no_llm: bool) -> Result<ResearchOrchestrator> {
    let provider = TavilySearchProvider::new(&config.search)?;
    let extractor = WebExtractor::new(&config.fetch)?;

    let planner = if no_llm {
        QueryPlanner::seed_only(&config.research)
    } else {
        let llm = SiumaiLanguageModel::new(&config.llm)
            .await
            .context("Failed to set up the planning model (use --no-llm to skip it)")?;
        QueryPlanner::with_llm(
            &config.research,
            Arc::new(llm),
            Duration::from_secs(config.llm.timeout_secs),
        )
    };

    Ok(ResearchOrchestrator::new(
        config,
        Arc::new(provider),
        Arc::new(extractor),
        planner,
    )?)
}

/// Print every event of one run to stderr until the hub closes
fn spawn_progress_printer(hub: &ProgressHub, run_id: &str) -> tokio::task::JoinHandle<()> {
    let mut subscription = hub.subscribe_run(run_id);
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            eprintln!("[{}] {}", event.stage, event.message);
        }
    })
}

async fn handle_research(
    config: &DossierConfig,
    request: ResearchRequest,
    single_pass: bool,
    no_llm: bool,
    quiet: bool,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let orchestrator = build_orchestrator(config, no_llm || single_pass).await?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let hub = ProgressHub::default();
    let printer = (!quiet).then(|| spawn_progress_printer(&hub, &run_id));
    let reporter = ProgressReporter::new(run_id, Arc::new(hub));

    let report = if single_pass {
        orchestrator
            .run_single_pass(&request.entity, &reporter)
            .await?
    } else {
        orchestrator.run_research(request, &reporter).await?
    };

    drop(reporter);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&report)?,
        OutputFormat::Markdown => render_markdown(&report),
    };
    write_output(output, &rendered)
}

async fn handle_enrich(
    config: &DossierConfig,
    input: &Path,
    output: Option<&Path>,
    fetcher: FetcherKind,
    quiet: bool,
) -> Result<()> {
    let mut curated = load_curated(input)?;

    let fetcher: Arc<dyn dossier_core::ContentFetcher> = match fetcher {
        FetcherKind::Tavily => Arc::new(TavilyExtractClient::new(&config.search, &config.enrichment)?),
        FetcherKind::Web => Arc::new(WebContentFetcher::new(&config.fetch)?),
    };
    let batcher = EnrichmentBatcher::new(fetcher, &config.enrichment);

    let run_id = uuid::Uuid::new_v4().to_string();
    let hub = ProgressHub::default();
    let printer = (!quiet).then(|| spawn_progress_printer(&hub, &run_id));
    let reporter = ProgressReporter::new(run_id, Arc::new(hub));

    let report = batcher.enrich(&mut curated, &reporter).await;

    drop(reporter);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    for category in &report.categories {
        eprintln!(
            "{}: {}/{} enriched, {} errors ({} ms)",
            category.category,
            category.enriched,
            category.total,
            category.errors,
            category.elapsed_ms
        );
    }

    write_output(output, &serde_json::to_string_pretty(&curated)?)
}

fn handle_config(path: Option<&Path>, init: bool, show: bool, validate: bool) -> Result<()> {
    if !(init || show || validate) {
        bail!("Nothing to do: pass --init, --show or --validate");
    }

    if init {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        DossierConfig::default().save_to_file(&config_path)?;
        println!("Configuration initialized at: {:?}", config_path);
        println!("Set TAVILY_API_KEY and your LLM key, or add them to the file.");
    }

    if show {
        let config = load_config(path)?;
        println!("{}", toml::to_string_pretty(&config)?);
    }

    if validate {
        load_config(path)?.validate()?;
        println!("Configuration is valid");
    }

    Ok(())
}

fn load_curated(path: &Path) -> Result<CuratedSet> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid curated document set in {:?}", path))
}

fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
            info!("Wrote output to {:?}", path);
        }
        None => println!("{}", content),
    }
    Ok(())
}

fn render_markdown(report: &ResearchReport) -> String {
    let meta = &report.meta;
    let mut out = format!("# {}\n\n", meta.resolved_name);
    out.push_str(&format!(
        "- Sources: {}\n- Steps used: {}\n- Stopped: {}\n\n",
        meta.source_count, meta.steps_used, meta.termination
    ));

    out.push_str("## Coverage\n\n| Section | Score |\n|---|---|\n");
    for (section, score) in &meta.coverage {
        out.push_str(&format!("| {} | {} |\n", section, score));
    }

    out.push_str("\n## Sources\n\n");
    for source in report.sources() {
        out.push_str(&format!("{}. [{}]({})\n", source.id, source.title, source.url));
    }
    out
}
