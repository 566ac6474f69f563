//! ``src/scan/content_scanner.rs``
//!
//! # Content scanners
//!
//! A [`ContentScanner`] produces the entries of one location in batches.
//! [`run_scanner`] drives it and guarantees exactly one terminal
//! [`ScanEvent`] (`Completed`, `Failed` or `Cancelled`) after any number of
//! `Updated` batches. Cancelling the scanner's token before, during or after
//! the scan is always safe.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::AppError;
use crate::fs::entry::Entry;

#[derive(Debug, Clone)]
pub enum ScanEvent {
    Updated(Vec<Entry>),
    Completed,
    Failed(AppError),
    Cancelled,
}

impl ScanEvent {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Updated(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Ask the backing source to refresh rather than serve cached listings
    pub refresh: bool,
    pub invalidate_cache: bool,
    pub batch_size: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            refresh: false,
            invalidate_cache: false,
            batch_size: 100,
        }
    }
}

/// Where a scanner delivers entries.
#[derive(Debug, Clone)]
pub struct BatchSink {
    tx: UnboundedSender<ScanEvent>,
    token: CancellationToken,
    batch_size: usize,
}

impl BatchSink {
    pub fn new(tx: UnboundedSender<ScanEvent>, token: CancellationToken, batch_size: usize) -> Self {
        Self {
            tx,
            token,
            batch_size: batch_size.max(1),
        }
    }

    /// Sends `entries` in batches. Returns `false` once the scan is cancelled
    /// or the receiver is gone.
    pub fn push(&self, entries: Vec<Entry>) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        for chunk in entries.chunks(self.batch_size) {
            if self.tx.send(ScanEvent::Updated(chunk.to_vec())).is_err() {
                return false;
            }
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[async_trait]
pub trait ContentScanner: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn token(&self) -> &CancellationToken;

    /// Pushes entries into `sink`. Returning `Ok` completes the scan.
    async fn produce(&self, sink: &BatchSink, options: ScanOptions) -> Result<(), AppError>;

    fn cancel(&self) {
        self.token().cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.token().is_cancelled()
    }
}

/// Runs `scanner` to its single terminal event.
pub async fn run_scanner(
    scanner: Arc<dyn ContentScanner>,
    tx: UnboundedSender<ScanEvent>,
    options: ScanOptions,
) {
    let token = scanner.token().clone();
    let sink = BatchSink::new(tx.clone(), token.clone(), options.batch_size);
    let start = Instant::now();

    let result = tokio::select! {
        biased;
        () = token.cancelled() => None,
        result = scanner.produce(&sink, options) => Some(result),
    };

    let event = match result {
        _ if token.is_cancelled() => ScanEvent::Cancelled,
        Some(Ok(())) => ScanEvent::Completed,
        Some(Err(e)) => ScanEvent::Failed(e),
        None => ScanEvent::Cancelled,
    };

    match &event {
        ScanEvent::Failed(e) => info!(
            marker = "SCAN_FAILED",
            scanner = scanner.name(),
            error = %e,
            duration_us = start.elapsed().as_micros() as u64,
            "Scan failed"
        ),
        ScanEvent::Cancelled => debug!(scanner = scanner.name(), "Scan cancelled"),
        _ => info!(
            marker = "SCAN_COMPLETED",
            scanner = scanner.name(),
            duration_us = start.elapsed().as_micros() as u64,
            "Scan completed"
        ),
    }

    let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Debug)]
    struct SlowScanner {
        token: CancellationToken,
        fail: bool,
    }

    #[async_trait]
    impl ContentScanner for SlowScanner {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn token(&self) -> &CancellationToken {
            &self.token
        }

        async fn produce(&self, sink: &BatchSink, _options: ScanOptions) -> Result<(), AppError> {
            sink.push((0..5).map(|i| Entry::file("downloads", &format!("/{i}"))).collect());
            if self.fail {
                return Err(AppError::Other("boom".into()));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
    }

    async fn collect(scanner: Arc<SlowScanner>, cancel_after: Option<Duration>) -> Vec<ScanEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let options = ScanOptions {
            batch_size: 2,
            ..ScanOptions::default()
        };
        let task = tokio::spawn(run_scanner(scanner.clone(), tx, options));
        if let Some(after) = cancel_after {
            tokio::time::sleep(after).await;
            scanner.cancel();
        }
        task.await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_then_single_completion() {
        let scanner = Arc::new(SlowScanner {
            token: CancellationToken::new(),
            fail: false,
        });
        let events = collect(scanner, None).await;

        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], ScanEvent::Updated(ref batch) if batch.len() == 2));
        assert!(matches!(events[3], ScanEvent::Completed));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_scan_emits_cancelled() {
        let scanner = Arc::new(SlowScanner {
            token: CancellationToken::new(),
            fail: false,
        });
        let events = collect(scanner, Some(Duration::from_millis(10))).await;

        assert!(matches!(events.last(), Some(ScanEvent::Cancelled)));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start_and_failure() {
        let cancelled = Arc::new(SlowScanner {
            token: CancellationToken::new(),
            fail: false,
        });
        cancelled.cancel();
        let events = collect(cancelled, None).await;
        assert!(matches!(events.as_slice(), [ScanEvent::Cancelled]));

        let failing = Arc::new(SlowScanner {
            token: CancellationToken::new(),
            fail: true,
        });
        let events = collect(failing, None).await;
        assert!(matches!(events.last(), Some(ScanEvent::Failed(_))));
    }
}
