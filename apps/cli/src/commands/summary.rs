//! Summary command implementation.

use anyhow::{Context, Result};
use std::path::Path;
use tunekit_training::{read_document, summarize};

pub fn execute(file: &Path) -> Result<()> {
    let doc = read_document(file).with_context(|| format!("Failed to read metrics document {}", file.display()))?;
    print!("{}", summarize(&doc));
    Ok(())
}
