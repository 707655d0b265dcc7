//! Reference scanning command.

use std::path::Path;

use crate::cli::icons::dim_arrow;
use crate::content::{scan, ContentMetrics};

/// Print the typed references of an HTML file as JSON.
pub async fn cmd_scan(file: &Path, metrics: bool) -> anyhow::Result<()> {
    let html = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;

    let references = scan(&html);
    println!("{}", serde_json::to_string_pretty(&references)?);

    if metrics {
        let counts = ContentMetrics::from_html(&html);
        eprintln!(
            "{} {} words, {} characters ({} without spaces), ~{} pages",
            dim_arrow(),
            counts.words,
            counts.characters,
            counts.characters_no_spaces,
            counts.pages
        );
    }
    Ok(())
}
