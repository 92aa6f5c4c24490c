//! # Batch processor
//!
//! A generic coalescer: items accumulate under a mutex until either the
//! configured size is reached or the configured timeout elapses since the
//! last flush, whichever comes first. Not wired into the update pipeline
//! today — reserved for batching embedding calls across documents — so it
//! is exercised only by its own unit tests.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Size/timeout-triggered batch coalescer over items of type `T`.
pub struct BatchProcessor<T> {
    batch_size: usize,
    batch_timeout: Duration,
    buffer: Mutex<Vec<T>>,
    last_flush: Mutex<Instant>,
}

impl<T: Send> BatchProcessor<T> {
    pub fn new(batch_size: usize, batch_timeout: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            batch_timeout,
            buffer: Mutex::new(Vec::new()),
            last_flush: Mutex::new(Instant::now()),
        }
    }

    /// Add `item`; if this fills the batch, drain and invoke `handler`
    /// with the collected items in FIFO order.
    pub async fn add<F, Fut, E>(&self, item: T, handler: F) -> Result<(), E>
    where
        F: FnOnce(Vec<T>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let mut buffer = self.buffer.lock().await;
        buffer.push(item);
        if buffer.len() >= self.batch_size {
            let drained: Vec<T> = buffer.drain(..self.batch_size).collect();
            drop(buffer);
            *self.last_flush.lock().await = Instant::now();
            return handler(drained).await;
        }
        Ok(())
    }

    /// Drain whatever is currently buffered, regardless of size, and
    /// invoke `handler`. A no-op when the buffer is empty.
    pub async fn flush<F, Fut, E>(&self, handler: F) -> Result<(), E>
    where
        F: FnOnce(Vec<T>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let mut buffer = self.buffer.lock().await;
        if buffer.is_empty() {
            return Ok(());
        }
        let drained: Vec<T> = buffer.drain(..).collect();
        drop(buffer);
        *self.last_flush.lock().await = Instant::now();
        handler(drained).await
    }

    /// True once `batch_timeout` has elapsed since the last flush.
    pub async fn timeout_elapsed(&self) -> bool {
        self.last_flush.lock().await.elapsed() >= self.batch_timeout
    }

    /// Suspend until the configured timeout from the last flush.
    pub async fn wait_for_timeout(&self) {
        let remaining = self
            .batch_timeout
            .saturating_sub(self.last_flush.lock().await.elapsed());
        if !remaining.is_zero() {
            sleep(remaining).await;
        }
    }
}
