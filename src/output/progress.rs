//! Progress bar utilities.

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::download::ProgressSnapshot;

/// Create a spinner for long-running operations.
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}

/// Create a progress bar for item counts.
pub fn create_item_bar(total: u64, message: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} {} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {{msg}}",
                message
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar
}

/// Apply a snapshot to an item bar.
pub fn apply_snapshot(bar: &ProgressBar, snapshot: &ProgressSnapshot) {
    bar.set_length(snapshot.total as u64);
    bar.set_position(snapshot.done() as u64);
    if snapshot.failed > 0 || snapshot.skipped > 0 {
        bar.set_message(format!(
            "({} failed, {} skipped)",
            snapshot.failed, snapshot.skipped
        ));
    }
}

/// Render batch progress until the scheduler publishing it is dropped.
pub fn spawn_progress(mut progress: watch::Receiver<ProgressSnapshot>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let bar = create_item_bar(0, "Items");
        bar.enable_steady_tick(std::time::Duration::from_millis(200));

        while progress.changed().await.is_ok() {
            let snapshot = *progress.borrow_and_update();
            apply_snapshot(&bar, &snapshot);
        }

        bar.finish();
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_snapshot() {
        let bar = ProgressBar::hidden();
        apply_snapshot(
            &bar,
            &ProgressSnapshot {
                completed: 2,
                failed: 1,
                skipped: 1,
                total: 6,
            },
        );
        assert_eq!(bar.length(), Some(6));
        assert_eq!(bar.position(), 4);
        assert_eq!(bar.message(), "(1 failed, 1 skipped)");
    }

    #[tokio::test]
    async fn test_progress_ends_with_sender() {
        let (tx, rx) = watch::channel(ProgressSnapshot::default());
        let handle = spawn_progress(rx);

        tx.send_replace(ProgressSnapshot {
            completed: 1,
            total: 1,
            ..ProgressSnapshot::default()
        });
        drop(tx);

        handle.await.unwrap();
    }
}
