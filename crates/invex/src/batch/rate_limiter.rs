//! Concurrency gate for outbound extraction calls.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;

/// Bounds how many tasks run at once; excess tasks wait in FIFO order.
///
/// The limiter never looks at a task's output: results and errors pass
/// through untouched.
#[derive(Debug)]
pub struct RateLimiter {
    semaphore: Semaphore,
    max_concurrent: usize,
    running: AtomicUsize,
    queued: AtomicUsize,
}

/// Decrements a counter when dropped, so cancelled futures still release.
struct CountGuard<'a>(&'a AtomicUsize);

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RateLimiter {
    /// The limit is clamped to `1..=Semaphore::MAX_PERMITS`: 0 would
    /// deadlock and anything above the permit ceiling would panic.
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
            running: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
        }
    }

    /// Builds a limiter from an untyped setting, treating any non-positive
    /// or non-numeric value as 1.
    pub fn from_setting(value: &serde_json::Value) -> Self {
        Self::new(normalize_max_concurrent(value))
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Tasks currently holding a slot.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Tasks waiting for a slot.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Runs `task` once a slot is free and returns its output unchanged.
    ///
    /// `task` is not called until the slot has been granted.
    pub async fn add<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.queued.fetch_add(1, Ordering::SeqCst);
        let waiting = CountGuard(&self.queued);
        // The semaphore is owned here and never closed, so acquire cannot fail.
        let permit = self.semaphore.acquire().await.ok();
        drop(waiting);

        self.running.fetch_add(1, Ordering::SeqCst);
        let _running = CountGuard(&self.running);
        let output = task().await;
        drop(permit);
        output
    }
}

/// Normalizes a concurrency setting: positive numbers are floored, anything
/// else becomes 1.
pub fn normalize_max_concurrent(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                (v as usize).max(1)
            } else if let Some(v) = n.as_f64() {
                if v.is_finite() && v >= 1.0 {
                    v.floor() as usize
                } else {
                    1
                }
            } else {
                1
            }
        }
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 1.0)
            .map(|v| v.floor() as usize)
            .unwrap_or(1),
        _ => 1,
    }
}
