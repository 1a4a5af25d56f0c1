//! Markdown run summary
//!
//! This module renders run statistics as a human-readable markdown report.

use crate::output::RunStatistics;
use crate::SinkError;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown summary of a run to `output_path`
///
/// # Arguments
///
/// * `stats` - The final statistics of the run
/// * `config_hash` - Hash of the configuration file, if the run was loaded from one
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(SinkError)` - Failed to write summary
pub fn write_markdown_summary(
    stats: &RunStatistics,
    config_hash: Option<&str>,
    output_path: &Path,
) -> Result<(), SinkError> {
    let mut markdown = format_markdown_summary(stats);
    if let Some(hash) = config_hash {
        markdown.push_str(&format!("\n---\n\nConfig hash: `{}`\n", hash));
    }

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats run statistics as markdown
pub fn format_markdown_summary(stats: &RunStatistics) -> String {
    let mut md = String::new();

    md.push_str("# Trawl Crawl Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Started**: {}\n", stats.started_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.2} seconds\n",
        stats.elapsed.as_secs_f64()
    ));
    md.push_str(&format!("- **Final State**: {}\n", stats.state));
    md.push_str(&format!(
        "- **Speed**: {:.2} requests/second\n",
        stats.requests_per_second()
    ));
    if let Some(mean) = stats.mean_fetch_time() {
        md.push_str(&format!(
            "- **Mean Fetch Time**: {:.1} ms\n",
            mean.as_secs_f64() * 1000.0
        ));
    }
    md.push('\n');

    // Requests
    md.push_str("## Requests\n\n");
    md.push_str("| Outcome | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Attempted | {} |\n", stats.requests_attempted));
    md.push_str(&format!("| Succeeded | {} |\n", stats.requests_succeeded));
    md.push_str(&format!("| Failed | {} |\n", stats.requests_failed));
    md.push_str(&format!("| Robots Rejected | {} |\n\n", stats.robots_rejected));

    // Items
    md.push_str("## Items\n\n");
    md.push_str("| Outcome | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Saved | {} |\n", stats.items_saved));
    md.push_str(&format!("| Dropped | {} |\n\n", stats.items_dropped));

    // Skips and errors, only when something happened
    let problems = [
        ("Invalid URLs", stats.invalid_urls),
        ("Extraction Errors", stats.extraction_errors),
        ("Sink Errors", stats.sink_errors),
        ("Depth Limited", stats.depth_limited),
    ];
    if problems.iter().any(|(_, count)| *count > 0) {
        md.push_str("## Skipped and Errors\n\n");
        md.push_str("| Kind | Count |\n");
        md.push_str("|------|-------|\n");
        for (label, count) in problems.iter().filter(|(_, count)| *count > 0) {
            md.push_str(&format!("| {} | {} |\n", label, count));
        }
        md.push('\n');
    }

    md
}
