//! Background scanning off the interactive thread.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sievefile_core::{ScanConfig, ScanError, Tree};

use crate::progress::ScanProgress;
use crate::scanner::JwalkScanner;

/// Channel buffer size for scan messages.
pub const SCAN_CHANNEL_SIZE: usize = 100;

/// Message from a background scan.
#[derive(Debug)]
pub enum ScanMessage {
    /// Periodic progress update.
    Progress(ScanProgress),
    /// The scan finished, failed or was cancelled. Always the last message.
    Complete(Result<Tree, ScanError>),
}

/// Start a background filesystem scan.
///
/// Returns a receiver that gets progress updates and exactly one
/// [`ScanMessage::Complete`]. Cancelling `cancel` ends the scan with
/// [`ScanError::Interrupted`]; no partial tree is sent.
pub fn start_scan(config: ScanConfig, cancel: CancellationToken) -> mpsc::Receiver<ScanMessage> {
    let (tx, rx) = mpsc::channel(SCAN_CHANNEL_SIZE);

    tokio::spawn(async move {
        let scanner = JwalkScanner::new();
        let mut progress_rx = scanner.subscribe();

        // Forward progress updates
        let tx_progress = tx.clone();
        let progress_task = tokio::spawn(async move {
            while let Ok(progress) = progress_rx.recv().await {
                if tx_progress.send(ScanMessage::Progress(progress)).await.is_err() {
                    break;
                }
            }
        });

        // jwalk uses rayon internally, keep it off the async workers
        let result = tokio::task::spawn_blocking(move || scanner.scan_with_cancel(&config, &cancel))
            .await
            .unwrap_or_else(|e| {
                Err(ScanError::Other {
                    message: e.to_string(),
                })
            });

        progress_task.abort();
        let _ = tx.send(ScanMessage::Complete(result)).await;
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    async fn wait_complete(mut rx: mpsc::Receiver<ScanMessage>) -> Result<Tree, ScanError> {
        while let Some(message) = rx.recv().await {
            if let ScanMessage::Complete(result) = message {
                return result;
            }
        }
        panic!("channel closed without a result");
    }

    #[tokio::test]
    async fn test_background_scan_completes() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("a")).unwrap();
        fs::write(temp.path().join("a/f"), "12345").unwrap();

        let rx = start_scan(ScanConfig::new(temp.path()), CancellationToken::new());
        let tree = wait_complete(rx).await.unwrap();
        assert_eq!(tree.total_size(), 5);
    }

    #[tokio::test]
    async fn test_background_scan_cancelled() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("f"), "x").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let rx = start_scan(ScanConfig::new(temp.path()), cancel);
        let err = wait_complete(rx).await.unwrap_err();
        assert!(matches!(err, ScanError::Interrupted));
    }

    #[tokio::test]
    async fn test_background_scan_fatal_error() {
        let temp = TempDir::new().unwrap();
        let rx = start_scan(
            ScanConfig::new(temp.path().join("missing")),
            CancellationToken::new(),
        );
        let err = wait_complete(rx).await.unwrap_err();
        assert!(matches!(err, ScanError::NotFound { .. }));
    }
}
