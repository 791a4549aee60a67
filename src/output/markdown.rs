//! Markdown run report generation

use crate::output::RunSummary;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown report for a run
///
/// # Arguments
///
/// * `summary` - The run summary
/// * `output_path` - Path where the markdown file should be written
pub fn write_markdown_summary(summary: &RunSummary, output_path: &Path) -> std::io::Result<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_summary(summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Crawl Report: {}\n\n", summary.site_name));

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", summary.run_id));
    md.push_str(&format!("- **Mode**: {}\n", summary.mode));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if let Some(duration) = summary.duration_seconds {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", summary.status));
    if !summary.config_hash.is_empty() {
        md.push_str(&format!("- **Config Hash**: {}\n", summary.config_hash));
    }
    md.push('\n');

    if summary.cancelled {
        md.push_str("> The run was cancelled before the frontier drained.\n\n");
    }

    md.push_str("## Statistics\n\n");
    md.push_str("| Metric | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Total | {} |\n", summary.total));
    md.push_str(&format!("| Dispatched | {} |\n", summary.dispatched_urls.len()));
    md.push_str(&format!("| Succeeded | {} |\n", summary.succeeded_urls().len()));
    md.push_str(&format!("| Failed | {} |\n\n", summary.failed_urls.len()));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        summary.success_rate()
    ));

    if !summary.failed_urls.is_empty() {
        md.push_str("## Failed URLs\n\n");
        for url in &summary.failed_urls {
            md.push_str(&format!("- {}\n", url));
        }
        md.push('\n');
    }

    let succeeded = summary.succeeded_urls();
    if !succeeded.is_empty() {
        md.push_str("## Fetched URLs\n\n");
        for url in succeeded {
            md.push_str(&format!("- {}\n", url));
        }
        md.push('\n');
    }

    md
}
