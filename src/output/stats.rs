//! Console rendering of a crawl report

use crate::output::CrawlReport;

/// Prints the report to stdout
pub fn print_report(report: &CrawlReport) {
    println!("=== Crawl Report ===\n");

    println!("Overview:");
    println!("  Strategy: {}", report.strategy);
    if let Some(seconds) = report.duration_seconds() {
        println!("  Duration: {}s", seconds);
    }
    println!("  Pages crawled (total): {}", report.pages_crawled);
    println!("  Pending URLs left: {}", report.pending_remaining);
    println!();

    println!("This Run:");
    println!("  Fetched: {}", report.pages_fetched);
    println!("  Failed (transient): {}", report.pages_failed);
    println!("  Permanent failures: {}", report.permanent_failures);
    println!("  Skipped by open circuit: {}", report.skipped_by_circuit);
    if report.deferred > 0 {
        println!("  Deferred for circuit cooldown: {}", report.deferred);
    }
    if report.unsupported > 0 {
        println!("  No executable tier: {}", report.unsupported);
    }
    if report.requeued > 0 {
        println!("  Requeued: {}", report.requeued);
    }
    println!(
        "  Links accepted: {} of {} found",
        report.links_accepted, report.links_found
    );
    println!();

    if !report.tier_successes.is_empty() {
        println!("Successes by Tier:");
        for (tier, count) in &report.tier_successes {
            println!("  tier {}: {}", tier, count);
        }
        println!();
    }

    if report.filter_rejected > 0 {
        println!("Filter Rejections:");
        let mut rejections: Vec<_> = report.filter_rejections.iter().collect();
        rejections.sort_by(|a, b| b.1.cmp(a.1));
        for (filter, count) in rejections {
            println!("  {}: {}", filter, count);
        }
        println!();
    }

    if !report.tripped_domains.is_empty() {
        println!("Tripped Circuits ({}):", report.tripped_domains.len());
        for domain in &report.tripped_domains {
            println!("  - {}", domain);
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} pages fetched)",
        report.success_rate(),
        report.pages_fetched,
        report.pages_attempted()
    );
}
