//! Fine-tuning job command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use tunekit_training::{
    derive_run_config, summarize, ClientSettings, FinetuneConfig, HttpJobTransport, JobClient, StdoutProgressSink,
    TokioSleeper,
};

pub async fn execute(
    config: PathBuf,
    run_id: Option<String>,
    output: Option<PathBuf>,
    server: Option<String>,
    mut settings: ClientSettings,
) -> Result<()> {
    // Fail on a missing or malformed config before touching the network.
    FinetuneConfig::load(&config)?;

    if let Some(url) = server {
        settings.server_url = Some(url);
    }
    let transport = HttpJobTransport::from_settings(&settings)?;
    println!("Job server: {}", transport.base_url().cyan());

    let config = match run_id {
        Some(run_id) => {
            let derived = derive_run_config(&config, &run_id, &settings.run)
                .with_context(|| format!("Failed to derive configuration for run {run_id}"))?;
            println!("Run configuration: {}", derived.display().to_string().cyan());
            derived
        }
        None => config,
    };
    let hub_model_id = FinetuneConfig::load(&config)?.hub_model_id().map(str::to_string);

    let output = output.unwrap_or_else(|| settings.output.clone());
    let client = JobClient::new(transport, TokioSleeper, settings.poll.clone(), output);
    let outcome = client.run(&config, &StdoutProgressSink).await?;

    println!();
    println!("{}", "Fine-tuning complete".bold().green());
    println!("  Polls: {}", outcome.polls);
    println!("  Metrics: {}", outcome.output_path.display().to_string().cyan());
    if let Some(id) = hub_model_id {
        println!("  Hub model: {}", id.cyan());
    }
    if !outcome.metrics.is_empty() {
        println!();
        print!("{}", summarize(&outcome.metrics));
    }
    Ok(())
}
