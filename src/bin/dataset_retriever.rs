use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use dataset_retriever::app::{App, ProgressSink, RunResult};
use dataset_retriever::config::{ConfigLoader, ConfigOverrides, ResolvedConfig};
use dataset_retriever::discovery::DirectoryWalker;
use dataset_retriever::domain::ChecksumFormat;
use dataset_retriever::error::RetrieverError;
use dataset_retriever::hasher::StreamingHasher;
use dataset_retriever::input::read_input_file;
use dataset_retriever::output::{JsonOutput, LogProgress, OutputMode, print_summary};
use dataset_retriever::report::Diagnostics;
use dataset_retriever::source::LocalStorageSource;

#[derive(Parser)]
#[command(name = "dataset-retriever")]
#[command(about = "Retrieve instrument data files and maintain MD5/SHA-1 checksum manifests")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    format: Option<ChecksumFormat>,

    #[arg(long, global = true)]
    base_output: Option<String>,

    /// Date used in manifest file names (yyyyMMdd); defaults to today.
    #[arg(long, global = true)]
    manifest_date: Option<String>,

    #[arg(long, global = true)]
    preview: bool,

    /// Recompute digests even when the manifest already has them.
    #[arg(long, global = true)]
    force_hash: bool,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Copy or link datasets listed in an input file, then update checksums")]
    Retrieve(RetrieveArgs),
    #[command(about = "Update checksum files for existing directories")]
    Checksum(ChecksumArgs),
}

#[derive(Args)]
struct RetrieveArgs {
    #[arg(long)]
    input: Utf8PathBuf,

    #[arg(long)]
    output: Utf8PathBuf,

    #[arg(long = "storage-root")]
    storage_roots: Vec<String>,

    #[arg(long)]
    link: bool,

    #[arg(long)]
    overwrite: bool,
}

#[derive(Args)]
struct ChecksumArgs {
    #[arg(required = true)]
    directories: Vec<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<RetrieverError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RetrieverError) -> u8 {
    match error {
        err if err.is_configuration() => 2,
        RetrieverError::InputRead(_)
        | RetrieverError::InputParse(_)
        | RetrieverError::InvalidPattern(_) => 2,
        RetrieverError::DirectoriesFailed(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    let mut overrides = ConfigOverrides {
        checksum_format: cli.format,
        base_output_dir: cli.base_output,
        manifest_date: cli.manifest_date,
        preview: cli.preview,
        force_hash: cli.force_hash,
        ..ConfigOverrides::default()
    };
    if let Commands::Retrieve(args) = &cli.command {
        overrides.link = args.link;
        overrides.overwrite = args.overwrite;
        overrides.storage_roots = args.storage_roots.clone();
    }
    overrides.apply(&mut config)?;

    let result = match cli.command {
        Commands::Retrieve(args) => run_retrieve(args, config, output_mode)?,
        Commands::Checksum(args) => run_checksum(args, config, output_mode)?,
    };

    match output_mode {
        OutputMode::Json => JsonOutput::print_run(&result).into_diagnostic()?,
        OutputMode::Human => print_summary(&result),
    }
    if !result.success {
        return Err(RetrieverError::DirectoriesFailed(
            result.failed_datasets + result.failed_directories,
        )
        .into());
    }
    Ok(())
}

fn build_app(
    config: ResolvedConfig,
) -> Result<App<LocalStorageSource, StreamingHasher, DirectoryWalker>, RetrieverError> {
    let source = LocalStorageSource::new(config.storage_roots.clone());
    Ok(App::new(
        config,
        source,
        StreamingHasher::new(),
        DirectoryWalker::new()?,
    ))
}

fn sink_for(output_mode: OutputMode) -> Box<dyn ProgressSink> {
    match output_mode {
        OutputMode::Json => Box::new(JsonOutput),
        OutputMode::Human => Box::new(LogProgress),
    }
}

fn run_retrieve(
    args: RetrieveArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<RunResult> {
    if config.storage_roots.is_empty() {
        return Err(miette::Report::msg(
            "no storage roots configured (use --storage-root or storage_roots in the config file)",
        ));
    }
    let mut diagnostics = Diagnostics::new();
    let rows = read_input_file(&args.input, &mut diagnostics)?;
    tracing::info!("{} dataset(s) requested from {}", rows.len(), args.input);

    let app = build_app(config)?;
    let sink = sink_for(output_mode);
    let mut result = app.retrieve(&rows, &args.output, sink.as_ref());
    let mut messages = diagnostics.messages();
    messages.append(&mut result.messages);
    result.messages = messages;
    Ok(result)
}

fn run_checksum(
    args: ChecksumArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<RunResult> {
    let app = build_app(config)?;
    let sink = sink_for(output_mode);
    Ok(app.checksum_directories(&args.directories, sink.as_ref()))
}
