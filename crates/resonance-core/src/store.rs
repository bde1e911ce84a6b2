//! Memory stores.
//!
//! [`MemoryStore`] is the seam between a session and wherever entries are
//! kept. [`LocalStore`] keeps them in process; the networked store lives
//! in `resonance-client`.

use crate::entry::{now_millis, Entry, EntryDraft};
use crate::error::StoreResult;
use crate::feed::FeedEvent;
use crate::subscription::Subscription;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Most entries a store retains. Older entries are evicted first.
pub const CAP: usize = 100;

/// Append-only, capped entry storage.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Accept a draft. Durable stores assign the id; every store assigns
    /// the timestamp.
    async fn append(&self, draft: EntryDraft) -> StoreResult<Entry>;

    /// Up to `limit` entries, most recent first.
    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<Entry>>;

    /// Remove every entry.
    async fn clear_all(&self) -> StoreResult<()>;

    /// Whether accepted entries are shared beyond this process.
    fn is_durable(&self) -> bool;
}

/// In-process store. Never unavailable.
///
/// Mutations are echoed to subscribers so a session in local-only mode
/// follows the same update path as one backed by the network.
pub struct LocalStore {
    cap: usize,
    /// Oldest at the front
    entries: Mutex<VecDeque<Entry>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<FeedEvent>>>,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore {
    pub fn new() -> Self {
        Self::with_cap(CAP)
    }

    /// Store retaining at most `cap` entries (at least one).
    pub fn with_cap(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            entries: Mutex::new(VecDeque::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Receive insert/clear echoes for every later mutation.
    pub fn subscribe(&self) -> Subscription<FeedEvent> {
        let (tx, sub) = Subscription::channel();
        self.lock_subscribers().push(tx);
        sub
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, event: FeedEvent) {
        // Closed subscriptions drop out here.
        self.lock_subscribers()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    // A poisoned lock only means another thread panicked mid-push; the
    // deque itself is still consistent.
    fn lock_entries(&self) -> std::sync::MutexGuard<'_, VecDeque<Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_subscribers(
        &self,
    ) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<FeedEvent>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl MemoryStore for LocalStore {
    async fn append(&self, draft: EntryDraft) -> StoreResult<Entry> {
        draft.validate()?;
        let entry = Entry::accept(draft, None, now_millis());
        {
            let mut entries = self.lock_entries();
            entries.push_back(entry.clone());
            while entries.len() > self.cap {
                entries.pop_front();
            }
        }
        self.publish(FeedEvent::Inserted(entry.clone()));
        Ok(entry)
    }

    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<Entry>> {
        Ok(self
            .lock_entries()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn clear_all(&self) -> StoreResult<()> {
        self.lock_entries().clear();
        self.publish(FeedEvent::Cleared);
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}
