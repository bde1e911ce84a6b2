//! Subscription handles with deterministic unsubscribe.
//!
//! A [`Subscription`] owns the receiving end of an event channel and,
//! optionally, the background task feeding it. Once unsubscribed it yields
//! nothing more, even if events were already queued.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Receiving handle for a stream of events.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

impl<T> Subscription<T> {
    /// Wrap a receiver that is fed by someone else.
    pub fn new(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self {
            rx,
            task: None,
            closed: false,
        }
    }

    /// Wrap a receiver together with the task producing its events.
    /// The task is aborted on unsubscribe.
    pub fn with_task(rx: mpsc::UnboundedReceiver<T>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            task: Some(task),
            closed: false,
        }
    }

    /// Create a connected sender/subscription pair.
    pub fn channel() -> (mpsc::UnboundedSender<T>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(rx))
    }

    /// Wait for the next event. `None` once unsubscribed or when every
    /// producer has gone away.
    pub async fn next(&mut self) -> Option<T> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    /// Take an already-queued event without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        if self.closed {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Stop delivery. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.rx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
