//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use archivist_core::enrichment::EnrichOutcome;
use archivist_core::pipeline::{self, StageMode, StageReport};
use archivist_crawler::{StopReason, WalkOptions};
use archivist_extraction::{ExtractOutcome, compare};
use archivist_shared::{
    AppConfig, ProgressReporter, config_file_path, init_config, init_config_at, load_config,
    load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Archivist: harvest a document archive into searchable records.
#[derive(Parser)]
#[command(
    name = "archivist",
    version,
    about = "Harvest a paginated document archive, extract attachments to text and enrich them.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.archivist/archivist.toml).
    #[arg(long, global = true, env = "ARCHIVIST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Walk the listing and harvest documents.
    Crawl {
        /// Start year, or a listing URL to resume from. Defaults to the saved cursor.
        target: Option<String>,

        /// Stop after this many listing pages.
        #[arg(long)]
        max_pages: Option<u32>,

        /// Last year to walk (defaults to the config value, else the current year).
        #[arg(long)]
        end_year: Option<i32>,
    },

    /// Extract text from downloaded attachments.
    Extract {
        /// Use the other OCR engine and write to the comparison directory.
        #[arg(long)]
        alternate: bool,

        #[command(subcommand)]
        action: Option<ExtractAction>,
    },

    /// Enrich extracted text into structured records.
    Enrich {
        #[command(subcommand)]
        action: Option<EnrichAction>,
    },

    /// Show crawl, extraction and enrichment progress.
    Status,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ExtractAction {
    /// Reprocess every attachment marked failed.
    Retry,
    /// Process one attachment.
    Single {
        /// Attachment file name (in data/PDFs) or path.
        file: String,
    },
    /// Compare primary and alternate extraction output for one attachment.
    Compare {
        /// Attachment or text file name.
        file: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum EnrichAction {
    /// Re-enrich every file marked failed.
    Retry,
    /// Enrich one text file.
    Single {
        /// Text file name (in data/OCR).
        file: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "archivist=info",
        1 => "archivist=debug",
        _ => "archivist=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Crawl {
            target,
            max_pages,
            end_year,
        } => cmd_crawl(config_path, target.as_deref(), max_pages, end_year).await,
        Command::Extract { alternate, action } => match action {
            None => cmd_extract(config_path, StageMode::All, alternate).await,
            Some(ExtractAction::Retry) => cmd_extract(config_path, StageMode::Retry, alternate).await,
            Some(ExtractAction::Single { file }) => {
                cmd_extract(config_path, StageMode::Single(file), alternate).await
            }
            Some(ExtractAction::Compare { file }) => cmd_compare(config_path, &file),
        },
        Command::Enrich { action } => match action {
            None => cmd_enrich(config_path, StageMode::All).await,
            Some(EnrichAction::Retry) => cmd_enrich(config_path, StageMode::Retry).await,
            Some(EnrichAction::Single { file }) => {
                cmd_enrich(config_path, StageMode::Single(file)).await
            }
        },
        Command::Status => cmd_status(config_path),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_crawl(
    config_path: Option<&Path>,
    target: Option<&str>,
    max_pages: Option<u32>,
    end_year: Option<i32>,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let start = pipeline::parse_crawl_target(target)?;
    let options = WalkOptions {
        max_pages,
        end_year,
    };
    info!(?start, ?max_pages, ?end_year, "crawling");

    let reporter = CliProgress::new();
    let report = pipeline::crawl(&config, start, &options, &reporter).await?;

    let stop = match report.walk.stop {
        StopReason::PastEndYear => "reached end year",
        StopReason::PageLimit => "page limit",
    };
    println!();
    println!("  Crawl finished ({stop})");
    println!("  Listing pages:   {}", report.walk.pages_fetched);
    println!("  Unavailable:     {}", report.walk.unavailable_pages);
    println!("  Years completed: {}", report.walk.years_completed);
    println!("  Harvested:       {}", report.harvest.harvested);
    println!("  Skipped:         {}", report.harvest.skipped);
    println!("  Failed:          {}", report.harvest.failed);
    println!(
        "  Files:           {} downloaded, {} present, {} failed",
        report.harvest.files_downloaded, report.harvest.files_present, report.harvest.files_failed
    );
    if report.harvest.button_only > 0 {
        println!("  Button-only:     {} (no attachment link)", report.harvest.button_only);
    }
    println!("  Next cursor:     {}", report.walk.cursor);
    println!("  Time:            {:.1}s", report.elapsed.as_secs_f64());
    println!();
    Ok(())
}

async fn cmd_extract(config_path: Option<&Path>, mode: StageMode, alternate: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    let reporter = CliProgress::new();

    match pipeline::extract(&config, mode, alternate, &reporter).await? {
        StageReport::Sweep(summary) => {
            println!();
            println!("  Extraction finished");
            println!("  Completed:  {}", summary.completed);
            println!("  Failed:     {}", summary.failed);
            println!("  Skipped:    {}", summary.skipped);
            println!("  Backfilled: {}", summary.backfilled);
            println!();
        }
        StageReport::Single(outcome) => {
            reporter.finish();
            match outcome {
                ExtractOutcome::AlreadyCompleted => println!("Already extracted; nothing to do."),
                ExtractOutcome::Completed {
                    text_file,
                    recovered_pages,
                    total_pages,
                } => println!(
                    "Extracted {recovered_pages}/{total_pages} pages to {}",
                    text_file.display()
                ),
                ExtractOutcome::Failed { error } => println!("Extraction failed: {error}"),
            }
        }
    }
    Ok(())
}

fn cmd_compare(config_path: Option<&Path>, file: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let cmp = compare(&config.paths, file)?;

    println!();
    println!("  Primary:    {} chars", cmp.primary_len);
    println!("  Alternate:  {} chars", cmp.alternate_len);
    println!("  Difference: {} chars", cmp.difference);
    println!();
    println!("  Primary preview:");
    println!("  {}", cmp.primary_preview.replace('\n', "\n  "));
    println!();
    println!("  Alternate preview:");
    println!("  {}", cmp.alternate_preview.replace('\n', "\n  "));
    println!();
    Ok(())
}

async fn cmd_enrich(config_path: Option<&Path>, mode: StageMode) -> Result<()> {
    let config = resolve_config(config_path)?;
    info!(model = %config.enrichment.model, "enriching");
    let reporter = CliProgress::new();

    match pipeline::enrich(&config, mode, &reporter).await? {
        StageReport::Sweep(summary) => {
            println!();
            println!("  Enrichment finished");
            println!("  Completed: {}", summary.completed);
            println!("  Failed:    {}", summary.failed);
            println!("  Skipped:   {}", summary.skipped);
            println!();
        }
        StageReport::Single(outcome) => {
            reporter.finish();
            match outcome {
                EnrichOutcome::AlreadyCompleted => println!("Already enriched; nothing to do."),
                EnrichOutcome::Completed { output, chunks } => {
                    println!("Enriched {chunks} chunk(s) into {}", output.display())
                }
                EnrichOutcome::Failed { error } => println!("Enrichment failed: {error}"),
            }
        }
    }
    Ok(())
}

fn cmd_status(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let report = pipeline::status(&config)?;

    println!();
    println!("  Listing cursor:");
    if report.cursors.is_empty() {
        println!("    (not started)");
    }
    for cursor in &report.cursors {
        println!("    {cursor}");
    }
    println!("  Visited URLs:    {}", report.visited);
    println!("  Records logged:  {}", report.documents_logged);
    println!(
        "  Extraction:      {} completed, {} failed",
        report.extraction.0, report.extraction.1
    );
    println!(
        "  Enrichment:      {} completed, {} failed",
        report.enrichment.0, report.enrichment.1
    );
    println!("  Unavailable:     {}", report.unavailable.len());
    for url in &report.unavailable {
        println!("    {url}");
    }
    println!();
    Ok(())
}

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => {
            init_config_at(path)?;
            path.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let source = match config_path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    println!("# {}", source.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item(&self, current: usize, total: usize, detail: &str) {
        if total == 0 {
            self.spinner.set_message(format!("[{current}] {detail}"));
        } else {
            self.spinner.set_message(format!("[{current}/{total}] {detail}"));
        }
    }

    fn done(&self, summary: &str) {
        self.spinner.finish_and_clear();
        info!(summary, "stage complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_crawl_arguments() {
        let cli = Cli::parse_from(["archivist", "crawl", "1998", "--max-pages", "5", "-v"]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Crawl {
                target,
                max_pages,
                end_year,
            } => {
                assert_eq!(target.as_deref(), Some("1998"));
                assert_eq!(max_pages, Some(5));
                assert_eq!(end_year, None);
            }
            _ => panic!("expected crawl"),
        }
    }

    #[test]
    fn parses_extract_modes() {
        let cli = Cli::parse_from(["archivist", "extract", "--alternate", "single", "memo.pdf"]);
        match cli.command {
            Command::Extract {
                alternate: true,
                action: Some(ExtractAction::Single { file }),
            } => assert_eq!(file, "memo.pdf"),
            _ => panic!("expected extract single --alternate"),
        }

        let cli = Cli::parse_from(["archivist", "extract"]);
        assert!(matches!(
            cli.command,
            Command::Extract {
                alternate: false,
                action: None
            }
        ));

        let cli = Cli::parse_from(["archivist", "--config", "a.toml", "enrich", "retry"]);
        assert_eq!(cli.config.as_deref(), Some(Path::new("a.toml")));
        assert!(matches!(
            cli.command,
            Command::Enrich {
                action: Some(EnrichAction::Retry)
            }
        ));
    }
}
