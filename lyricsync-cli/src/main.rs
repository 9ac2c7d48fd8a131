use clap::{Args, Parser, Subcommand};
use lyricsync_aligner_gemini::GeminiAligner;
use lyricsync_core::{
    log_file_path, CoreError, LineId, LrcDocument, LrcMetadata, LyricSyncConfig, SessionPhase,
    SourceFile, SyncController, SyncEvent, TomlParseError,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "lyricsync", version, about = "Align lyrics to audio and edit LRC files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Time a lyrics file against an audio recording
    Align(AlignArgs),
    /// Re-render an LRC file with sorted lines and canonical timestamps
    Normalize {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Move every line of an LRC file by a number of seconds
    Shift {
        input: PathBuf,
        /// Seconds to add; negative values move lines earlier
        #[arg(long, allow_negative_numbers = true)]
        by: f64,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct AlignArgs {
    #[arg(long)]
    audio: PathBuf,
    /// Plain text file with one lyric line per line
    #[arg(long)]
    lyrics: PathBuf,
    #[arg(long, default_value = "")]
    title: String,
    #[arg(long, default_value = "")]
    artist: String,
    #[arg(long, default_value = "")]
    album: String,
    /// Attribution for the [by:] tag, defaults to the configured one
    #[arg(long)]
    by: Option<String>,
    /// Output path, defaults to `<title>.lrc`
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let file_logging_enabled = check_file_logging_enabled();
    init_tracing(file_logging_enabled);

    // Load config or create template on first run
    let config = match LyricSyncConfig::load_or_create() {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            if matches!(cli.command, Command::Align(_)) {
                eprintln!(
                    "Created a config template at {}. Add your Gemini API key and run again.",
                    path.display()
                );
                std::process::exit(0);
            }
            info!("Created config template at {}", path.display());
            LyricSyncConfig::default()
        }
        Err(CoreError::ConfigParseError(parse_error)) => {
            report_config_parse_error(&parse_error, &LyricSyncConfig::config_path());
            std::process::exit(1);
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Align(args) => run_align(&config, args),
        Command::Normalize { input, output } => {
            read_document(&input).and_then(|doc| write_output(&doc.render(), output.as_deref()))
        }
        Command::Shift { input, by, output } => read_document(&input).and_then(|mut doc| {
            shift_document(&mut doc, by);
            write_output(&doc.render(), output.as_deref())
        }),
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run_align(config: &LyricSyncConfig, args: AlignArgs) -> Result<(), CoreError> {
    let aligner = GeminiAligner::new(&config.gemini)?;

    let runtime = tokio::runtime::Runtime::new()?;

    // Ctrl+C cancels the run in progress
    let cancel_token = CancellationToken::new();
    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C, cancelling alignment...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    runtime.block_on(async move {
        let controller = SyncController::new(Arc::new(aligner), config.session_settings());
        tokio::spawn(log_sync_events(Arc::clone(&controller)));

        controller
            .set_metadata(LrcMetadata {
                title: args.title,
                artist: args.artist,
                album: args.album,
                attribution: args
                    .by
                    .unwrap_or_else(|| config.export.attribution.clone()),
            })
            .await?;

        controller.load_lyrics(SourceFile::from_path(args.lyrics)).await?;
        let Some(handle) = controller.load_audio(SourceFile::from_path(args.audio)).await? else {
            return Err(CoreError::TaskFailed {
                reason: "alignment did not start".to_string(),
            });
        };

        tokio::select! {
            () = cancel_token.cancelled() => {
                controller.reset().await;
                return Err(CoreError::TaskFailed {
                    reason: "cancelled".to_string(),
                });
            }
            joined = handle => joined.map_err(|e| CoreError::TaskFailed {
                reason: e.to_string(),
            })?,
        }

        if controller.phase().await != SessionPhase::Editing {
            return Err(CoreError::TaskFailed {
                reason: "no lines were produced".to_string(),
            });
        }

        let document = controller.document().await;
        let flagged = document.lines.iter().filter(|l| l.needs_review).count();
        if flagged > 0 {
            warn!("{} of {} lines need review", flagged, document.lines.len());
        }

        let output = args
            .output
            .unwrap_or_else(|| PathBuf::from(document.export_file_name()));
        write_output(&controller.export().await, Some(&output))
    })
}

fn read_document(path: &Path) -> Result<LrcDocument, CoreError> {
    let text = std::fs::read_to_string(path)?;
    let document = LrcDocument::parse_lrc(&text);
    info!("Read {} lines from {}", document.lines.len(), path.display());
    Ok(document)
}

fn shift_document(document: &mut LrcDocument, delta_secs: f64) {
    let ids: Vec<LineId> = document.lines.iter().map(|line| line.id).collect();
    for id in ids {
        document.lines.nudge(id, delta_secs);
    }
}

fn write_output(text: &str, output: Option<&Path>) -> Result<(), CoreError> {
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            info!("Wrote {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

/// Log session events in the background
async fn log_sync_events(controller: Arc<SyncController>) {
    let mut rx = controller.subscribe();

    loop {
        match rx.recv().await {
            Ok(SyncEvent::PhaseChanged { phase }) => info!("Session is {}", phase),
            Ok(SyncEvent::Notice { message }) => warn!("{}", message),
            Ok(SyncEvent::DocumentChanged) => {
                info!("Document now has {} lines", controller.document().await.lines.len());
            }
            Ok(SyncEvent::ActiveLineChanged { .. } | SyncEvent::SeekRequested { .. }) => {}
            Err(RecvError::Lagged(n)) => warn!("Event logger lagged by {} events", n),
            Err(RecvError::Closed) => break,
        }
    }
}

fn report_config_parse_error(parse_error: &TomlParseError, config_path: &Path) {
    let location = parse_error
        .span()
        .map(|span| format!(" (bytes {}..{})", span.start, span.end))
        .unwrap_or_default();
    eprintln!(
        "Config file {} has a syntax error{location}:\n{}",
        config_path.display(),
        parse_error.message()
    );
}

/// Read just `logging.enabled` before tracing is set up
fn check_file_logging_enabled() -> bool {
    LyricSyncConfig::load_from(&LyricSyncConfig::config_path())
        .map(|config| config.logging.enabled)
        .unwrap_or(false)
}

/// Initialize tracing with console output and optional file logging
fn init_tracing(file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest_retry=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if file_logging_enabled {
        let log_path = log_file_path();

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
