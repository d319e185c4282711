use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use drape_client::{BrowserOptions, with_session};
use drape_core::models::ProductRecord;
use drape_core::traits::ProductSink;
use drape_core::{CrawlConfig, CrawlService, Pacer, ScrollMode, SiteSelectors, TimingConfig};
use drape_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "drape", version, about = "Size and price crawler for infinite-scroll catalogs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a catalog page and resolve the price of every size of every listing
    Crawl(CrawlArgs),
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// Catalog (listing) page URL
    #[arg(short, long)]
    url: String,

    /// Maximum number of listings to visit
    #[arg(short, long, default_value_t = 20, conflicts_with = "all")]
    limit: usize,

    /// Visit every listing found on the catalog
    #[arg(long, default_value_t = false)]
    all: bool,

    /// Source tag stored with every record
    #[arg(long, env = "DRAPE_SOURCE", default_value = "farfetch")]
    source: String,

    /// JSON file overriding the default Farfetch selectors
    #[arg(long, env = "DRAPE_SELECTORS")]
    selectors: Option<PathBuf>,

    /// Seed for the randomised waits and scroll steps
    #[arg(long, env = "DRAPE_SEED")]
    seed: Option<u64>,

    /// Run the browser without a window
    #[arg(long, default_value_t = false)]
    headless: bool,

    /// Jump straight to the bottom of the catalog instead of scrolling in steps
    #[arg(long, default_value_t = false)]
    scroll_to_bottom: bool,

    /// Browser timezone
    #[arg(long, default_value = "Asia/Seoul")]
    timezone: String,

    /// Output format written to stdout
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Save records to PostgreSQL (requires DATABASE_URL)
    #[arg(long, default_value_t = false)]
    save: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("drape=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl(args) => cmd_crawl(args).await?,
    }

    Ok(())
}

async fn cmd_crawl(args: CrawlArgs) -> Result<()> {
    let selectors = match &args.selectors {
        Some(path) => SiteSelectors::from_json_file(path)
            .with_context(|| format!("Failed to load selectors from {}", path.display()))?,
        None => SiteSelectors::farfetch(),
    };

    let mut config = CrawlConfig::default().with_source(args.source.clone());
    if args.scroll_to_bottom {
        config.scroll = ScrollMode::ToBottom;
    }

    let pacer = match args.seed {
        Some(seed) => Pacer::seeded(TimingConfig::default(), seed),
        None => Pacer::new(TimingConfig::default()),
    };

    // Fail on a bad DATABASE_URL before spending minutes in the browser.
    let repo = if args.save {
        let db_config = DatabaseConfig::from_env()?;
        let db = Database::connect(&db_config)
            .await
            .context("Failed to connect to database")?;
        db.migrate().await?;
        Some(db.product_repo())
    } else {
        None
    };

    let options = BrowserOptions {
        headless: args.headless,
        timezone: args.timezone.clone(),
        ..BrowserOptions::default()
    };
    let limit = (!args.all).then_some(args.limit);
    // Records reach stdout before the database, so a storage failure never
    // loses a finished crawl.
    let service = CrawlService::without_sink(selectors, config, pacer);

    tracing::info!(url = %args.url, ?limit, source = %args.source, "Starting crawl");
    let records = with_session(options, async |session| {
        service.crawl(session, &args.url, limit).await
    })
    .await
    .context("Crawl failed")?;

    eprint!("{}", preview(&records));

    let stdout = std::io::stdout();
    match args.format {
        OutputFormat::Json => write_json(&records, stdout.lock())?,
        OutputFormat::Csv => write_csv(&records, stdout.lock())?,
    }

    if let Some(repo) = repo {
        let report = repo
            .save(&records, &service.config().source)
            .await
            .context("Failed to save records")?;
        eprintln!("\nSaved {} record(s) to PostgreSQL", report.stored);
    }

    Ok(())
}

/// Record count plus the first two records, one per line.
fn preview(records: &[ProductRecord]) -> String {
    let mut out = format!("\nCrawled {} record(s)\n\n", records.len());
    for record in records.iter().take(2) {
        let note = if record.note.is_empty() {
            String::new()
        } else {
            format!(" ({})", record.note)
        };
        out.push_str(&format!(
            "{} | {} | {} | {}{note}\n",
            record.brand, record.name, record.size, record.price
        ));
    }
    out
}

fn write_json(records: &[ProductRecord], mut out: impl Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, records)?;
    writeln!(out)?;
    Ok(())
}

fn write_csv(records: &[ProductRecord], out: impl Write) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([
        "brand", "name", "size", "price", "note", "url", "images", "source",
    ])?;
    for r in records {
        writer.write_record([
            r.brand.as_str(),
            r.name.as_str(),
            r.size.as_str(),
            r.price.as_str(),
            r.note.as_str(),
            r.url.as_str(),
            r.images.join("|").as_str(),
            r.source.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
