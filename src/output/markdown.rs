//! Markdown summary of a crawl report

use crate::output::CrawlReport;
use std::path::Path;

/// Writes the markdown summary to `output_path`
pub fn write_markdown_report(report: &CrawlReport, output_path: &Path) -> std::io::Result<()> {
    std::fs::write(output_path, format_markdown_report(report))
}

/// Formats a crawl report as markdown
pub fn format_markdown_report(report: &CrawlReport) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Helm Crawl Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Strategy**: {}\n", report.strategy));
    md.push_str(&format!("- **Started**: {}\n", report.started_at.to_rfc3339()));
    if let Some(finished) = &report.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
    }
    if let Some(seconds) = report.duration_seconds() {
        md.push_str(&format!("- **Duration**: {} seconds\n", seconds));
    }
    md.push('\n');

    md.push_str("## Pages\n\n");
    md.push_str("| Outcome | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Fetched | {} |\n", report.pages_fetched));
    md.push_str(&format!("| Failed (transient) | {} |\n", report.pages_failed));
    md.push_str(&format!("| Permanent failure | {} |\n", report.permanent_failures));
    md.push_str(&format!("| Skipped by open circuit | {} |\n", report.skipped_by_circuit));
    md.push_str(&format!("| Deferred for cooldown | {} |\n", report.deferred));
    md.push_str(&format!("| No executable tier | {} |\n", report.unsupported));
    md.push_str(&format!("| Requeued | {} |\n\n", report.requeued));

    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n",
        report.success_rate()
    ));
    md.push_str(&format!("- **Pages Crawled (total)**: {}\n", report.pages_crawled));
    md.push_str(&format!("- **Pending URLs**: {}\n", report.pending_remaining));
    md.push_str(&format!(
        "- **Links Accepted**: {} of {}\n\n",
        report.links_accepted, report.links_found
    ));

    if !report.tier_successes.is_empty() {
        md.push_str("## Successes by Tier\n\n");
        md.push_str("| Tier | Pages |\n");
        md.push_str("|------|-------|\n");
        for (tier, count) in &report.tier_successes {
            md.push_str(&format!("| {} | {} |\n", tier, count));
        }
        md.push('\n');
    }

    if !report.filter_rejections.is_empty() {
        md.push_str("## Filter Rejections\n\n");
        md.push_str(&format!(
            "{} passed, {} rejected\n\n",
            report.filter_passed, report.filter_rejected
        ));
        md.push_str("| Filter | Rejected |\n");
        md.push_str("|--------|----------|\n");
        for (filter, count) in &report.filter_rejections {
            md.push_str(&format!("| {} | {} |\n", filter, count));
        }
        md.push('\n');
    }

    if !report.tripped_domains.is_empty() {
        md.push_str("## Tripped Circuits\n\n");
        for domain in &report.tripped_domains {
            md.push_str(&format!("- {}\n", domain));
        }
        md.push('\n');
    }

    md
}
