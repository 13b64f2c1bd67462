//! CLI settings loading.

use anyhow::{Context, Result};
use tunekit_training::ClientSettings;

/// Load settings for this invocation.
///
/// Precedence (highest first):
/// 1. CLI arguments (applied by each command)
/// 2. Environment variables, including a `.env` file in the working directory
/// 3. Local settings file (./.tunekitrc)
/// 4. Global settings file (~/.tunekit/config.toml)
/// 5. Defaults
pub fn load_settings() -> Result<ClientSettings> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env");
    }

    let mut settings = ClientSettings::discover_and_load().context("Failed to load tunekit settings")?;
    settings.apply_env(|key| std::env::var(key).ok());
    Ok(settings)
}
