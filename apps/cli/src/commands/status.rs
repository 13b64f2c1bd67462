//! Status command implementation.

use anyhow::Result;
use colored::Colorize;
use tunekit_training::{summarize, ClientSettings, HttpJobTransport, JobStatus, JobTransport};

pub async fn execute(server: Option<String>, mut settings: ClientSettings) -> Result<()> {
    if let Some(url) = server {
        settings.server_url = Some(url);
    }
    let transport = HttpJobTransport::from_settings(&settings)?;
    let report = transport.fetch_status().await?;

    let label = match report.status {
        JobStatus::Completed => report.status.to_string().green(),
        JobStatus::Failed => report.status.to_string().red(),
        _ => report.status.to_string().yellow(),
    };
    println!("status: {label}");
    if !report.status.is_terminal() {
        println!("{}", format!("job on {} is still in progress", transport.base_url()).dimmed());
    }

    if let Some(error) = report.error.as_deref() {
        println!("error: {error}");
    }
    if let Some(metrics) = report.metrics.as_ref().filter(|m| !m.is_empty()) {
        println!();
        print!("{}", summarize(metrics));
    }
    Ok(())
}
