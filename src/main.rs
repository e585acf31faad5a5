use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

use catalog_harvester::config::{get_config_path, AppConfig, ConfigOverrides};
use catalog_harvester::crawl::{CrawlSettings, Crawler};
use catalog_harvester::export::{ExportFormat, ExportManager, TableAggregator};
use catalog_harvester::logging::init_logging;
use catalog_harvester::render::{HttpFetcher, RenderEngine, StaticEngine};

#[derive(Parser)]
#[command(name = "catalog-harvester")]
#[command(about = "Crawl a product catalog and export one row per product")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Configuration file path")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the listing from START_URL, extract every product and export the table
    Crawl {
        #[arg(help = "First listing page (falls back to crawl.start_url)")]
        start_url: Option<String>,

        #[arg(short, long, help = "Maximum number of listing pages to visit")]
        pages: Option<usize>,

        #[arg(short, long, help = "Output file path")]
        output: Option<PathBuf>,

        #[arg(short, long, help = "Output format", value_enum)]
        format: Option<OutputFormat>,

        #[arg(long, help = "Number of concurrent product workers")]
        concurrency: Option<usize>,

        #[arg(long, help = "Skip randomized pauses after page loads")]
        no_jitter: bool,

        #[arg(long, help = "Append a timestamp to the output file name")]
        timestamp: bool,

        #[arg(long, help = "Add a leading URL column")]
        include_url: bool,

        #[arg(short, long, help = "Render engine", value_enum, default_value = "static")]
        engine: EngineKind,
    },

    /// Check the configuration file and exit
    ValidateConfig,

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(ValueEnum, Clone, Copy)]
enum OutputFormat {
    Csv,
    Json,
}

impl From<OutputFormat> for ExportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Csv => ExportFormat::Csv,
            OutputFormat::Json => ExportFormat::Json,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq)]
enum EngineKind {
    /// Fetch markup over HTTP and query it statically
    Static,
    /// Drive headless Chromium
    #[cfg(feature = "browser")]
    Browser,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match AppConfig::load(cli.config.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    ConfigOverrides::apply(&mut config);
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    init_logging(&config.logging)?;

    info!("Catalog Harvester v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Crawl {
            start_url,
            pages,
            output,
            format,
            concurrency,
            no_jitter,
            timestamp,
            include_url,
            engine,
        } => {
            if let Some(start_url) = start_url {
                config.crawl.start_url = Some(start_url);
            }
            if let Some(pages) = pages {
                config.crawl.max_pages = pages;
            }
            if let Some(concurrency) = concurrency {
                config.crawl.concurrency = concurrency;
            }
            if no_jitter {
                config.crawl.jitter_min_ms = 0;
                config.crawl.jitter_max_ms = 0;
            }
            if include_url {
                config.export.include_source_url = true;
            }
            if let Some(output) = output {
                config.export.format =
                    ExportFormat::from_path(&output).unwrap_or(config.export.format);
                config.export.output_path = output;
            }
            if let Some(format) = format {
                config.export.format = format.into();
            }
            if timestamp {
                config.export.output_path =
                    ExportManager::timestamped_path(&config.export.output_path, chrono::Utc::now());
            }

            config.validate()?;
            execute_crawl(&config, engine).await?;
        }
        Commands::ValidateConfig => validate_config(&config),
        Commands::ShowConfig => show_config(&config)?,
    }

    Ok(())
}

async fn execute_crawl(config: &AppConfig, engine: EngineKind) -> Result<()> {
    let Some(start_url) = config.crawl.start_url.as_deref() else {
        return Err(anyhow::anyhow!("No start URL given (pass START_URL or set crawl.start_url)"));
    };
    let start = Url::parse(start_url)
        .map_err(|e| anyhow::anyhow!("Invalid start URL '{}': {}", start_url, e))?;

    match engine {
        EngineKind::Static => {
            let engine = StaticEngine::new(HttpFetcher::new(&config.http)?);
            run_crawl(engine, config, &start).await
        }
        #[cfg(feature = "browser")]
        EngineKind::Browser => {
            let engine =
                catalog_harvester::render::browser::BrowserEngine::new(&config.http).await?;
            run_crawl(engine, config, &start).await
        }
    }
}

async fn run_crawl<E: RenderEngine>(engine: E, config: &AppConfig, start: &Url) -> Result<()> {
    info!(
        "Crawling {} with the {} engine (max {} pages, {} workers)",
        start,
        engine.name(),
        config.crawl.max_pages,
        config.crawl.concurrency
    );

    let settings = CrawlSettings {
        concurrency: config.crawl.concurrency,
        build: config.crawl.build_options(),
    };
    let crawler = Crawler::new(Arc::new(engine), config.site.clone(), settings)?;
    let report = crawler.crawl(start, config.crawl.max_pages).await;

    if report.records.is_empty() {
        warn!("No products were discovered from {}", start);
    }

    let table = TableAggregator::new(config.export.include_source_url, config.export.include_status)
        .aggregate(&report.records);

    let stats = ExportManager::new(&config.export)
        .export(&table, &config.export.output_path, config.export.format)
        .await?;

    println!("Run {} started {}", report.run_id, report.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!(
        "Pages visited: {}, products: {} ({} failed)",
        report.stats.pages_visited,
        report.stats.links_discovered,
        report.stats.records_failed
    );
    println!(
        "Data saved to {} ({} rows, {} columns)",
        stats.file_path.display(),
        stats.record_count,
        stats.column_count
    );

    Ok(())
}

fn validate_config(config: &AppConfig) {
    match config.validate() {
        Ok(_) => println!("Configuration is valid."),
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn show_config(config: &AppConfig) -> Result<()> {
    println!("# Default location: {}", get_config_path().display());
    println!("{}", config.to_toml()?);
    Ok(())
}
