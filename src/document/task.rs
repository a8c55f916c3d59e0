//! Blocking work off the async executor
//!
//! MuPDF calls, archive reads and whole-document scans are CPU/IO bound,
//! so they run on tokio's blocking pool under a timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::error::{DocumentError, Result};

/// Run `f` on the blocking pool, bounded by `limit`.
pub async fn run_blocking<F, T>(op: &'static str, limit: Duration, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match timeout(limit, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(DocumentError::TaskFailed(format!("{}: {}", op, e))),
        Err(_) => {
            let limit_ms = limit.as_millis() as u64;
            tracing::warn!(op, timeout_ms = limit_ms, "blocking operation timed out");
            Err(DocumentError::Timeout(limit_ms))
        }
    }
}

/// Run a cancellable scan on the blocking pool, bounded by `limit`.
///
/// The scan sees its flag cancelled when the limit elapses, when it fails,
/// and when the caller drops the returned future. Only a successful scan
/// leaves the flag untouched.
pub async fn run_scan<F, T>(op: &'static str, limit: Duration, f: F) -> Result<T>
where
    F: FnOnce(&CancelFlag) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let cancel = CancelFlag::new();
    let guard = cancel.guard();
    let result = run_blocking(op, limit, move || f(&cancel)).await;
    match result {
        Ok(value) => {
            guard.disarm();
            Ok(value)
        }
        Err(e) => {
            drop(guard);
            Err(e)
        }
    }
}

/// Cooperative cancellation flag shared with a blocking scan
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Guard that cancels the flag when dropped.
    ///
    /// Keep it alive across the await; if the caller abandons the future,
    /// the guard drops and the scan stops at its next check.
    pub fn guard(&self) -> CancelOnDrop {
        CancelOnDrop(Some(self.clone()))
    }
}

#[derive(Debug)]
pub struct CancelOnDrop(Option<CancelFlag>);

impl CancelOnDrop {
    /// Completed normally; nothing to cancel
    pub fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(flag) = self.0.take() {
            flag.cancel();
        }
    }
}
