use std::{num::NonZeroUsize, path::PathBuf, process};

use querymint_app::cli::{Cli, Commands, EnrichArgs, ExportArgs};
use querymint_app::config::{self, AppConfig};
use querymint_app::error::AppError;
use querymint_app::services::{
    CheckpointStore, FsCheckpointStore, GeminiQueryProvider, GenerationClient, PipelineDriver,
    PipelineError, PipelineOptions, ProgressReporter, export_csv, load_hits,
};
use tracing_subscriber::{filter::LevelFilter, fmt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_level = determine_log_level(&cli);
    init_tracing(log_level);

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        if let Some(note) = failure_note(&err) {
            eprintln!("{note}");
        }
        process::exit(1);
    }
}

fn failure_note(err: &AppError) -> Option<String> {
    match err {
        AppError::Pipeline(PipelineError::Aborted { persisted: 0, .. }) => Some(
            "no checkpoint was written by this run; any existing checkpoint file is unchanged"
                .to_string(),
        ),
        AppError::Pipeline(PipelineError::Aborted { persisted, .. }) => Some(format!(
            "{persisted} enriched hits are saved in the checkpoint; rerun with --resume to continue"
        )),
        AppError::Generation(err) if err.is_configuration() => Some(
            "set GOOGLE_AI_API_KEY or GEMINI_API_KEY, and pick a model with --model or \
             QUERYMINT__GENERATION__MODEL"
                .to_string(),
        ),
        _ => None,
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let verbosity = cli.verbose;

    match cli.command {
        Some(Commands::Enrich(args)) => {
            run_enrich(args, verbosity).await?;
        }
        Some(Commands::Export(args)) => {
            run_export(args)?;
        }
        None => {
            Cli::print_help();
        }
    }

    Ok(())
}

async fn run_enrich(args: EnrichArgs, verbosity: u8) -> Result<(), AppError> {
    let cfg = config::load()?;
    let options = enrich_options(&args, &cfg)?;
    let model = args
        .model
        .clone()
        .unwrap_or_else(|| cfg.generation.model.clone());
    let checkpoint_path = resolve_checkpoint(args.checkpoint.clone(), &cfg);

    // credentials are checked before the dataset is touched
    let provider = GeminiQueryProvider::from_env(model)?;
    let client = GenerationClient::new(provider);
    let store = FsCheckpointStore::new(&checkpoint_path);

    let hits = load_hits(&args.input).await?;
    let considered = options.limit.map_or(hits.len(), |limit| limit.min(hits.len()));

    tracing::info!(
        input = %args.input.display(),
        checkpoint = %checkpoint_path.display(),
        hits = hits.len(),
        considered,
        batch_size = options.batch_size.get(),
        concurrency = options.concurrency.get(),
        save_every = options.save_every.get(),
        resume = options.resume,
        model = %client.provider().model(),
        "starting enrichment run"
    );

    let progress = if verbosity == 0 {
        ProgressReporter::new(considered)
    } else {
        ProgressReporter::hidden(considered)
    };

    let mut driver = PipelineDriver::new(&client, &store, options);
    let summary = driver.run_with_progress(&hits, &progress).await?;

    println!(
        "Enriched {} hits ({} skipped); checkpoint holds {} hits at {}",
        summary.generated,
        summary.skipped,
        summary.checkpoint_count,
        checkpoint_path.display()
    );
    Ok(())
}

fn enrich_options(args: &EnrichArgs, cfg: &AppConfig) -> Result<PipelineOptions, AppError> {
    let batch_size = override_non_zero("--batch-size", args.batch_size)?
        .map_or_else(|| cfg.pipeline.batch_size(), Ok)?;
    let concurrency = override_non_zero("--concurrency", args.concurrency)?
        .map_or_else(|| cfg.pipeline.concurrency(), Ok)?;
    let save_every = override_non_zero("--save-every", args.save_every)?
        .map_or_else(|| cfg.pipeline.save_every(), Ok)?;

    Ok(PipelineOptions::builder()
        .batch_size(batch_size)
        .concurrency(concurrency)
        .save_every(save_every)
        .resume(args.resume)
        .maybe_limit(args.limit)
        .build())
}

fn override_non_zero(
    flag: &str,
    value: Option<usize>,
) -> Result<Option<NonZeroUsize>, AppError> {
    match value {
        None => Ok(None),
        Some(raw) => NonZeroUsize::new(raw)
            .map(Some)
            .ok_or_else(|| AppError::Config(format!("{flag} must be greater than zero"))),
    }
}

fn run_export(args: ExportArgs) -> Result<(), AppError> {
    let cfg = config::load()?;
    let checkpoint_path = resolve_checkpoint(args.checkpoint, &cfg);
    let store = FsCheckpointStore::new(&checkpoint_path);
    let checkpoint = store.load().ok_or_else(|| AppError::MissingCheckpoint {
        path: checkpoint_path.clone(),
    })?;

    let rows = export_csv(&checkpoint, &args.output)?;
    println!(
        "Wrote {rows} queries for {} hits to {}",
        checkpoint.len(),
        args.output.display()
    );
    Ok(())
}

fn resolve_checkpoint(flag: Option<PathBuf>, cfg: &AppConfig) -> PathBuf {
    flag.unwrap_or_else(|| cfg.storage.checkpoint_path.clone())
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.command.as_ref() {
        Some(Commands::Enrich(_)) => match cli.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
        Some(Commands::Export(_)) | None => match cli.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            _ => LevelFilter::DEBUG,
        },
    }
}
