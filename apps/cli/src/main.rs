//! Tunekit CLI - fine-tuning job client and training metrics export
//!
//! Submits fine-tuning jobs to a remote server, waits for them to finish, and
//! reduces TensorBoard scalar logs to a compact metrics document.

mod commands;
mod config;

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tunekit_training::{LatestPolicy, DEFAULT_METRICS_FILE};

use commands::{export, finetune, status, summary};

/// Tunekit CLI - fine-tuning job telemetry
#[derive(Parser, Debug)]
#[command(
    name = "tunekit",
    author,
    version,
    about = "Tunekit - fine-tuning job client and metrics export",
    long_about = "Tunekit submits fine-tuning jobs to a remote server, polls them until they finish,\nand exports the latest training metrics from TensorBoard event logs."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export the latest scalar metrics from TensorBoard logs
    ///
    /// Searches the log directory recursively for `events.out.tfevents.*`
    /// files, writes the latest value of every scalar to a JSON document and
    /// prints a summary.
    ExportMetrics {
        /// Directory containing TensorBoard event logs
        #[arg(long = "log_dir", alias = "log-dir", required_unless_present = "config")]
        log_dir: Option<PathBuf>,

        /// Fine-tuning configuration whose `<output_dir>/runs` holds the logs (used without --log_dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output JSON file
        #[arg(long, default_value = DEFAULT_METRICS_FILE)]
        output: PathBuf,

        /// Which point counts as latest (last-emitted, max-step)
        #[arg(long)]
        latest: Option<LatestPolicy>,

        /// Also write the full per-step history to this file
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Submit a fine-tuning job and wait for it to finish
    ///
    /// Uploads the configuration file, polls the job status until it
    /// completes or fails, and saves the returned metrics.
    Finetune {
        /// Fine-tuning configuration (JSON)
        config: PathBuf,

        /// Derive a per-run configuration (hub model id, dataset config, epochs) first
        #[arg(long)]
        run_id: Option<String>,

        /// Where to save the final metrics
        #[arg(long)]
        output: Option<PathBuf>,

        /// Job server URL (overrides TUNEKIT_SERVER_URL)
        #[arg(long)]
        server: Option<String>,
    },

    /// Check the current job status once
    Status {
        /// Job server URL (overrides TUNEKIT_SERVER_URL)
        #[arg(long)]
        server: Option<String>,
    },

    /// Print the summary of an exported metrics document
    Summary {
        /// Metrics JSON file
        #[arg(default_value = DEFAULT_METRICS_FILE)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // If no command provided, show help
    let command = if let Some(cmd) = args.command {
        cmd
    } else {
        Args::command().print_help()?;
        return Ok(());
    };

    // Settings are loaded only by the commands that read them.
    match command {
        Command::ExportMetrics { log_dir, config: config_path, output, latest, history } => {
            let log_dir = export::resolve_log_dir(log_dir, config_path.as_deref())?;
            let policy = match latest {
                Some(policy) => policy,
                None => config::load_settings()?.latest_policy,
            };
            export::execute(&log_dir, &output, policy, history.as_deref())?;
        }
        Command::Finetune { config: config_path, run_id, output, server } => {
            finetune::execute(config_path, run_id, output, server, config::load_settings()?).await?;
        }
        Command::Status { server } => {
            status::execute(server, config::load_settings()?).await?;
        }
        Command::Summary { file } => {
            summary::execute(&file)?;
        }
    }

    Ok(())
}
