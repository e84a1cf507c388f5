//! Batch summary reporting.

use console::style;
use indicatif::HumanBytes;

use crate::download::{BatchSummary, JobStatus};

/// Print the outcome of a batch.
pub fn print_batch_summary(summary: &BatchSummary) {
    println!();
    println!("{}", style("═".repeat(50)).dim());
    println!("{}", style("Summary:").bold());
    println!("  Items:       {}", summary.total);
    println!("  Succeeded:   {}", style(summary.succeeded).green());
    if summary.failed_retryable > 0 {
        println!(
            "  Failed:      {} (retries exhausted)",
            style(summary.failed_retryable).red()
        );
    }
    if summary.failed_permanent > 0 {
        println!("  Failed:      {}", style(summary.failed_permanent).red());
    }
    if summary.skipped > 0 {
        println!("  Skipped:     {}", style(summary.skipped).yellow());
    }
    println!("  Transferred: {}", HumanBytes(summary.bytes_transferred));
    println!("  Retries:     {}", summary.retries);

    let unsuccessful: Vec<_> = summary.unsuccessful().collect();
    if !unsuccessful.is_empty() {
        println!();
        for result in unsuccessful {
            let status = match result.status {
                JobStatus::Skipped => style(result.status.to_string()).yellow(),
                _ => style(result.status.to_string()).red(),
            };
            let class = result
                .error_class
                .map(|class| format!(" [{}]", class))
                .unwrap_or_default();
            println!(
                "  {} {} {}{}: {}",
                status,
                result.item_id,
                result.title,
                class,
                result.message.as_deref().unwrap_or("-")
            );
        }
    }
    println!("{}", style("═".repeat(50)).dim());
}
