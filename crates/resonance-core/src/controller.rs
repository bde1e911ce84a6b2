//! Feed controller - turns submissions and feed events into the view.
//!
//! Successful durable writes are not added to the view directly: the
//! entry comes back through the live feed like everyone else's, so there
//! is exactly one path into the view. Failed writes land in the view
//! immediately and mark the session degraded.

use crate::entry::{now_millis, Entry, EntryDraft};
use crate::error::{StoreError, StoreResult};
use crate::feed::{FeedEvent, FeedState};
use crate::store::MemoryStore;
use crate::view::{MemoryView, VIEW_CAPACITY};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default bound on bootstrap, append and reconciliation.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a session is degraded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedReason {
    Unauthorized,
    RateLimited,
    StoreUnavailable(String),
    Rejected(String),
    FeedReconnecting,
    ReconcileFailed(String),
}

impl std::fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "credential refused"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::StoreUnavailable(e) => write!(f, "store unavailable: {}", e),
            Self::Rejected(e) => write!(f, "entry rejected: {}", e),
            Self::FeedReconnecting => write!(f, "live feed reconnecting"),
            Self::ReconcileFailed(e) => write!(f, "reconciliation failed: {}", e),
        }
    }
}

impl From<StoreError> for DegradedReason {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unauthorized => Self::Unauthorized,
            StoreError::RateLimited => Self::RateLimited,
            StoreError::Unavailable(e) => Self::StoreUnavailable(e),
            StoreError::Rejected(e) => Self::Rejected(e),
        }
    }
}

/// Session connection state, for display only. Writes are never blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Checking,
    Connected,
    Degraded(DegradedReason),
    LocalOnly,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Checking => write!(f, "checking"),
            Self::Connected => write!(f, "connected"),
            Self::Degraded(reason) => write!(f, "degraded ({})", reason),
            Self::LocalOnly => write!(f, "local-only"),
        }
    }
}

/// What became of a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Blank intent; nothing happened
    Ignored,
    /// Accepted by the store; the view updates when the echo arrives
    Stored(Entry),
    /// Store refused or failed; shown locally only
    Local(Entry),
}

/// Orchestrates store writes, feed events and the displayed view.
pub struct FeedController {
    store: Arc<dyn MemoryStore>,
    view: MemoryView,
    state: ConnectionState,
    feed_state: FeedState,
    presence: usize,
    op_timeout: Duration,
}

impl FeedController {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self {
            store,
            view: MemoryView::new(VIEW_CAPACITY),
            state: ConnectionState::Checking,
            feed_state: FeedState::Idle,
            presence: 0,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Set the bound after which store calls count as unavailable.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Seed the view from the store.
    pub async fn bootstrap(&mut self) {
        let store = Arc::clone(&self.store);
        match bounded(self.op_timeout, store.list_recent(VIEW_CAPACITY)).await {
            Ok(entries) => {
                info!("Bootstrapped view with {} entries", entries.len());
                self.view.replace(entries);
                self.state = if self.store.is_durable() {
                    ConnectionState::Connected
                } else {
                    ConnectionState::LocalOnly
                };
            }
            Err(StoreError::Unauthorized) => {
                warn!("Store refused the credential; continuing without it");
                self.view.clear();
                self.state = ConnectionState::Degraded(DegradedReason::Unauthorized);
            }
            Err(e) => {
                warn!("Bootstrap failed, running local-only: {}", e);
                self.view.clear();
                self.state = ConnectionState::LocalOnly;
            }
        }
    }

    /// Score and store a submission.
    pub async fn submit(&mut self, intent: &str, tone: &str) -> SubmitOutcome {
        if intent.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }
        let draft = EntryDraft::compute(intent, tone);
        let store = Arc::clone(&self.store);
        match bounded(self.op_timeout, store.append(draft.clone())).await {
            Ok(entry) => {
                debug!("Stored entry {:?}", entry.id);
                if self.store.is_durable() && self.can_reconnect_state() {
                    self.state = ConnectionState::Connected;
                }
                SubmitOutcome::Stored(entry)
            }
            Err(e) => {
                warn!("Append failed, keeping entry locally: {}", e);
                let entry = Entry::accept(draft, None, now_millis());
                self.view.merge(entry.clone());
                self.state = ConnectionState::Degraded(e.into());
                SubmitOutcome::Local(entry)
            }
        }
    }

    /// Administrative clear. Observers reset when the clear echoes back.
    pub async fn clear_all(&mut self) -> StoreResult<()> {
        let store = Arc::clone(&self.store);
        let result = bounded(self.op_timeout, store.clear_all()).await;
        if let Err(ref e) = result {
            warn!("Clear failed: {}", e);
            self.state = ConnectionState::Degraded(e.clone().into());
        }
        result
    }

    /// Dispatch one live-feed event.
    pub async fn handle(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Inserted(entry) => self.on_live_feed_insert(entry),
            FeedEvent::Cleared => self.on_live_feed_clear(),
            FeedEvent::PossibleGap => self.on_possible_gap().await,
            FeedEvent::State(state) => self.on_feed_state(state),
        }
    }

    pub fn on_live_feed_insert(&mut self, entry: Entry) {
        if !self.view.merge(entry) {
            debug!("Ignored duplicate or stale entry");
        }
    }

    pub fn on_live_feed_clear(&mut self) {
        info!("Store cleared; resetting view");
        self.view.clear();
    }

    /// Reconcile after a possible gap: reload and replace the view.
    pub async fn on_possible_gap(&mut self) {
        info!("Possible gap in live feed; reconciling");
        let store = Arc::clone(&self.store);
        match bounded(self.op_timeout, store.list_recent(VIEW_CAPACITY)).await {
            Ok(entries) => {
                self.view.replace(entries);
                if self.store.is_durable() && self.can_reconnect_state() {
                    self.state = ConnectionState::Connected;
                }
            }
            Err(e) => {
                warn!("Reconciliation failed: {}", e);
                self.state =
                    ConnectionState::Degraded(DegradedReason::ReconcileFailed(e.to_string()));
            }
        }
    }

    pub fn on_feed_state(&mut self, state: FeedState) {
        debug!("Live feed {}", state);
        self.feed_state = state;
        match state {
            FeedState::Reconnecting if self.state == ConnectionState::Connected => {
                self.state = ConnectionState::Degraded(DegradedReason::FeedReconnecting);
            }
            FeedState::Active
                if self.state == ConnectionState::Degraded(DegradedReason::FeedReconnecting) =>
            {
                self.state = ConnectionState::Connected;
            }
            _ => {}
        }
    }

    pub fn set_presence_count(&mut self, count: usize) {
        self.presence = count;
    }

    pub fn presence_count(&self) -> usize {
        self.presence
    }

    pub fn view(&self) -> &MemoryView {
        &self.view
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    // A durable answer proves the store is back, but not the feed.
    fn can_reconnect_state(&self) -> bool {
        self.feed_state != FeedState::Reconnecting
    }
}

async fn bounded<T>(limit: Duration, op: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable(format!("timed out after {:?}", limit))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Store that fails every call with the configured error.
    struct FailingStore(StoreError);

    #[async_trait]
    impl MemoryStore for FailingStore {
        async fn append(&self, _draft: EntryDraft) -> StoreResult<Entry> {
            Err(self.0.clone())
        }
        async fn list_recent(&self, _limit: usize) -> StoreResult<Vec<Entry>> {
            Err(self.0.clone())
        }
        async fn clear_all(&self) -> StoreResult<()> {
            Err(self.0.clone())
        }
        fn is_durable(&self) -> bool {
            true
        }
    }

    /// Durable-looking store that hands out sequential ids.
    #[derive(Default)]
    struct FakeDurable {
        entries: Mutex<Vec<Entry>>,
    }

    #[async_trait]
    impl MemoryStore for FakeDurable {
        async fn append(&self, draft: EntryDraft) -> StoreResult<Entry> {
            let mut entries = self.entries.lock().unwrap();
            let n = entries.len() as u64 + 1;
            let entry = Entry::accept(draft, Some(format!("id-{}", n)), n);
            entries.push(entry.clone());
            Ok(entry)
        }
        async fn list_recent(&self, limit: usize) -> StoreResult<Vec<Entry>> {
            let entries = self.entries.lock().unwrap();
            Ok(entries.iter().rev().take(limit).cloned().collect())
        }
        async fn clear_all(&self) -> StoreResult<()> {
            self.entries.lock().unwrap().clear();
            Ok(())
        }
        fn is_durable(&self) -> bool {
            true
        }
    }

    /// Durable store that can be taken down and brought back.
    #[derive(Default)]
    struct FlakyStore {
        down: AtomicBool,
        inner: FakeDurable,
    }

    impl FlakyStore {
        fn check(&self) -> StoreResult<()> {
            if self.down.load(Ordering::SeqCst) {
                Err(StoreError::Unavailable("down".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl MemoryStore for FlakyStore {
        async fn append(&self, draft: EntryDraft) -> StoreResult<Entry> {
            self.check()?;
            self.inner.append(draft).await
        }
        async fn list_recent(&self, limit: usize) -> StoreResult<Vec<Entry>> {
            self.check()?;
            self.inner.list_recent(limit).await
        }
        async fn clear_all(&self) -> StoreResult<()> {
            self.check()?;
            self.inner.clear_all().await
        }
        fn is_durable(&self) -> bool {
            true
        }
    }

    /// Store that never answers.
    struct HangingStore;

    #[async_trait]
    impl MemoryStore for HangingStore {
        async fn append(&self, _draft: EntryDraft) -> StoreResult<Entry> {
            std::future::pending().await
        }
        async fn list_recent(&self, _limit: usize) -> StoreResult<Vec<Entry>> {
            std::future::pending().await
        }
        async fn clear_all(&self) -> StoreResult<()> {
            std::future::pending().await
        }
        fn is_durable(&self) -> bool {
            true
        }
    }

    fn stored(id: &str, x: &str, timestamp: u64) -> Entry {
        Entry::accept(EntryDraft::compute(x, "Trust"), Some(id.to_string()), timestamp)
    }

    #[tokio::test]
    async fn unreachable_store_still_accepts_locally() {
        let store = Arc::new(FailingStore(StoreError::Unavailable("down".into())));
        let mut controller = FeedController::new(store);

        controller.bootstrap().await;
        assert_eq!(controller.state(), &ConnectionState::LocalOnly);

        let outcome = controller.submit("Hello", "Trust").await;
        assert!(matches!(outcome, SubmitOutcome::Local(_)));
        assert_eq!(controller.view().len(), 1);
        assert!(matches!(controller.state(), ConnectionState::Degraded(_)));

        controller.on_feed_state(FeedState::Active);
        assert_ne!(controller.state(), &ConnectionState::Connected);
    }

    #[tokio::test]
    async fn blank_intent_changes_nothing() {
        let mut controller = FeedController::new(Arc::new(FakeDurable::default()));
        controller.bootstrap().await;
        let before = controller.state().clone();

        assert_eq!(controller.submit("   ", "Trust").await, SubmitOutcome::Ignored);
        assert_eq!(controller.submit("", "Trust").await, SubmitOutcome::Ignored);
        assert!(controller.view().is_empty());
        assert_eq!(controller.state(), &before);
    }

    #[tokio::test]
    async fn durable_write_waits_for_echo() {
        let mut controller = FeedController::new(Arc::new(FakeDurable::default()));
        controller.bootstrap().await;
        assert_eq!(controller.state(), &ConnectionState::Connected);

        let entry = match controller.submit("Hello", "Trust").await {
            SubmitOutcome::Stored(entry) => entry,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert!(controller.view().is_empty());

        controller.handle(FeedEvent::Inserted(entry.clone())).await;
        controller.handle(FeedEvent::Inserted(entry)).await;
        assert_eq!(controller.view().len(), 1);
    }

    #[tokio::test]
    async fn bootstrap_seeds_most_recent_five() {
        let store = Arc::new(FakeDurable::default());
        for i in 0..8 {
            store.append(EntryDraft::compute(&format!("n{}", i), "Trust")).await.unwrap();
        }
        let mut controller = FeedController::new(store);
        controller.bootstrap().await;
        let xs: Vec<_> = controller.view().entries().iter().map(|e| e.x.clone()).collect();
        assert_eq!(xs, vec!["n7", "n6", "n5", "n4", "n3"]);
    }

    #[tokio::test]
    async fn unauthorized_bootstrap_degrades() {
        let mut controller = FeedController::new(Arc::new(FailingStore(StoreError::Unauthorized)));
        controller.bootstrap().await;
        assert_eq!(
            controller.state(),
            &ConnectionState::Degraded(DegradedReason::Unauthorized)
        );
    }

    #[tokio::test]
    async fn clear_resets_view() {
        let mut controller = FeedController::new(Arc::new(FakeDurable::default()));
        controller.on_live_feed_insert(stored("a", "x", 1));
        controller.on_live_feed_insert(stored("b", "y", 2));
        controller.handle(FeedEvent::Cleared).await;
        assert!(controller.view().is_empty());
    }

    #[tokio::test]
    async fn gap_replaces_view_from_store() {
        let store = Arc::new(FakeDurable::default());
        let mut controller = FeedController::new(Arc::clone(&store) as Arc<dyn MemoryStore>);
        controller.on_live_feed_insert(stored("ghost", "gone", 99));

        store.append(EntryDraft::compute("missed", "Trust")).await.unwrap();
        controller.handle(FeedEvent::PossibleGap).await;

        let xs: Vec<_> = controller.view().entries().iter().map(|e| e.x.as_str()).collect();
        assert_eq!(xs, vec!["missed"]);
    }

    #[tokio::test]
    async fn feed_reconnect_round_trip() {
        let mut controller = FeedController::new(Arc::new(FakeDurable::default()));
        controller.bootstrap().await;

        controller.handle(FeedEvent::State(FeedState::Reconnecting)).await;
        assert_eq!(
            controller.state(),
            &ConnectionState::Degraded(DegradedReason::FeedReconnecting)
        );
        controller.handle(FeedEvent::State(FeedState::Active)).await;
        assert_eq!(controller.state(), &ConnectionState::Connected);
    }

    #[tokio::test]
    async fn hanging_store_times_out_to_local() {
        let mut controller =
            FeedController::new(Arc::new(HangingStore)).with_timeout(Duration::from_millis(20));
        controller.bootstrap().await;
        assert_eq!(controller.state(), &ConnectionState::LocalOnly);
        assert!(matches!(
            controller.submit("Hello", "Trust").await,
            SubmitOutcome::Local(_)
        ));
    }

    #[tokio::test]
    async fn local_store_echo_path() {
        let store = Arc::new(LocalStore::new());
        let mut feed = store.subscribe();
        let mut controller = FeedController::new(Arc::clone(&store) as Arc<dyn MemoryStore>);
        controller.bootstrap().await;
        assert_eq!(controller.state(), &ConnectionState::LocalOnly);

        assert!(matches!(
            controller.submit("Hello", "Trust").await,
            SubmitOutcome::Stored(_)
        ));
        let event = feed.next().await.unwrap();
        controller.handle(event).await;
        assert_eq!(controller.view().len(), 1);
        assert_eq!(controller.state(), &ConnectionState::LocalOnly);
    }

    #[tokio::test]
    async fn reconcile_restores_connected_once_store_answers() {
        let store = Arc::new(FlakyStore::default());
        store.down.store(true, Ordering::SeqCst);
        let mut controller = FeedController::new(Arc::clone(&store) as Arc<dyn MemoryStore>);
        controller.bootstrap().await;
        assert_eq!(controller.state(), &ConnectionState::LocalOnly);

        controller.handle(FeedEvent::PossibleGap).await;
        assert!(matches!(
            controller.state(),
            ConnectionState::Degraded(DegradedReason::ReconcileFailed(_))
        ));

        store.down.store(false, Ordering::SeqCst);
        store.append(EntryDraft::compute("back", "Trust")).await.unwrap();
        controller.handle(FeedEvent::State(FeedState::Active)).await;
        controller.handle(FeedEvent::PossibleGap).await;
        assert_eq!(controller.state(), &ConnectionState::Connected);
        assert_eq!(controller.view().len(), 1);
    }

    #[tokio::test]
    async fn reconcile_while_reconnecting_stays_degraded() {
        let mut controller = FeedController::new(Arc::new(FakeDurable::default()));
        controller.bootstrap().await;
        controller.handle(FeedEvent::State(FeedState::Reconnecting)).await;

        controller.handle(FeedEvent::PossibleGap).await;
        assert_eq!(
            controller.state(),
            &ConnectionState::Degraded(DegradedReason::FeedReconnecting)
        );
    }

    #[tokio::test]
    async fn reconcile_on_local_store_stays_local_only() {
        let store = Arc::new(LocalStore::new());
        let mut controller = FeedController::new(Arc::clone(&store) as Arc<dyn MemoryStore>);
        controller.bootstrap().await;

        let long = "a".repeat(2000);
        assert!(matches!(
            controller.submit(&long, "Trust").await,
            SubmitOutcome::Stored(_)
        ));
        controller.handle(FeedEvent::PossibleGap).await;
        assert_eq!(controller.state(), &ConnectionState::LocalOnly);
        assert_eq!(controller.view().entries()[0].x, long);
    }
}
