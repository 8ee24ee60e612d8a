use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_geo_fetch::app::App;
use kira_geo_fetch::cancel::install_interrupt_handler;
use kira_geo_fetch::config::{ConfigLoader, ConfigOverrides, DEFAULT_PATTERN};
use kira_geo_fetch::domain::RunSummary;
use kira_geo_fetch::error::KiraError;
use kira_geo_fetch::extractor::{GseExtractor, merge_identifiers};
use kira_geo_fetch::geo::GeoHttpClient;
use kira_geo_fetch::output::{
    ConsoleProgress, JsonOutput, OutputMode, confirm_download, print_preview, print_text_summary,
};

const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "kira-geo")]
#[command(about = "Download raw supplementary files of GEO series, with resume and retries")]
#[command(version, author)]
#[command(after_help = "Examples:
  kira-geo GSE42861 GSE49064
  kira-geo --input gse_list.txt
  kira-geo --input GPL13534.txt --pattern '!Platform_series_id'
  kira-geo --config kira-geo.json
  kira-geo --input gse_list.txt --parallel --workers 8 --force")]
struct Cli {
    #[arg(help = "GSE accessions to download")]
    accessions: Vec<String>,

    #[arg(short, long, help = "File with GSE accessions or GPL platform data")]
    input: Option<PathBuf>,

    #[arg(short, long, help = "JSON configuration file (default: ./kira-geo.json when present)")]
    config: Option<String>,

    #[arg(short, long, help = "Marker of accession lines in GPL files")]
    pattern: Option<String>,

    #[arg(short, long, help = "Output directory for downloaded files")]
    output: Option<Utf8PathBuf>,

    #[arg(long, help = "Download the files of a dataset in parallel")]
    parallel: bool,

    #[arg(short, long, help = "Number of parallel workers (default: 75% of CPU cores)")]
    workers: Option<usize>,

    #[arg(short, long, help = "Delay between sequential downloads in seconds")]
    delay: Option<f64>,

    #[arg(long, help = "Download chunk size in bytes")]
    chunk_size: Option<usize>,

    #[arg(long, help = "Retries per file after the first attempt")]
    max_retries: Option<u32>,

    #[arg(long, help = "Delay between retries in seconds")]
    retry_delay: Option<f64>,

    #[arg(short, long, help = "Skip the confirmation prompt")]
    force: bool,

    #[arg(long, help = "Do not compare downloaded sizes with the advertised ones")]
    no_verify: bool,

    #[arg(long, help = "Show what would be downloaded and exit")]
    dry_run: bool,

    #[arg(long, help = "No prompt, JSON summary on stdout")]
    non_interactive: bool,

    #[arg(short, long, help = "Debug logging (RUST_LOG still wins)")]
    verbose: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(kira) = report.downcast_ref::<KiraError>() {
                return ExitCode::from(map_exit_code(kira));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::InvalidAccession(_)
        | KiraError::InvalidConfig(_)
        | KiraError::ConfigRead(_)
        | KiraError::ConfigParse(_)
        | KiraError::InputRead(_)
        | KiraError::NoAccessions => 2,
        KiraError::GeoHttp(_) | KiraError::GeoStatus { .. } => 3,
        KiraError::Interrupted => EXIT_INTERRUPTED,
        _ => 1,
    }
}

fn summary_exit_code(summary: &RunSummary) -> u8 {
    if summary.interrupted {
        EXIT_INTERRUPTED
    } else if summary.is_success() {
        0
    } else {
        1
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> miette::Result<u8> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let overrides = ConfigOverrides {
        output_dir: cli.output.clone(),
        parallel: cli.parallel,
        workers: cli.workers,
        delay: cli.delay,
        chunk_size: cli.chunk_size,
        max_retries: cli.max_retries,
        retry_delay: cli.retry_delay,
        no_verify: cli.no_verify,
        force: cli.force,
    };
    let resolved = ConfigLoader::resolve(cli.config.as_deref(), &overrides)?;

    let pattern = cli
        .pattern
        .clone()
        .or_else(|| resolved.file.pattern.clone())
        .unwrap_or_else(|| DEFAULT_PATTERN.to_string());
    let extractor = GseExtractor::new(pattern);
    let mut sources = vec![extractor.extract_from_args(&cli.accessions)];
    if let Some(input) = &cli.input {
        sources.push(extractor.extract_from_file(input)?);
    }
    sources.push(extractor.extract_from_config(&resolved.file)?);
    let accessions = merge_identifiers(sources);
    if accessions.is_empty() {
        return Err(KiraError::NoAccessions.into());
    }

    let config = resolved.download;
    if cli.dry_run {
        print_preview(&accessions, &config);
        println!("\nDry run: nothing will be downloaded");
        return Ok(0);
    }

    match output_mode {
        OutputMode::Interactive if !config.force => {
            print_preview(&accessions, &config);
            println!();
            if !confirm_download("Proceed with download?").into_diagnostic()? {
                println!("Download cancelled");
                return Ok(0);
            }
        }
        _ => {
            tracing::info!(
                datasets = accessions.len(),
                output = %config.output_dir,
                "starting download"
            );
        }
    }

    let cancel = install_interrupt_handler()?;
    let client = GeoHttpClient::new()?;
    let app = App::new(client.clone(), client, config)?;

    let summary = match output_mode {
        OutputMode::Interactive => {
            let sink = ConsoleProgress::new();
            let summary = app.run(&accessions, &sink, &cancel);
            print_text_summary(&summary);
            summary
        }
        OutputMode::NonInteractive => {
            let summary = app.run(&accessions, &JsonOutput, &cancel);
            JsonOutput::print_summary(&summary).into_diagnostic()?;
            summary
        }
    };
    Ok(summary_exit_code(&summary))
}
