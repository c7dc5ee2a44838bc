/// Generic cursor pagination: one "load page / load more" primitive shared
/// by the conversation list, event history and screenshot history.
///
/// Pages are requested strictly backward in time with an exclusive
/// `before_timestamp` cursor; the accumulated items are newest-first and
/// older pages are concatenated at the tail.
use crate::error::Result;
use crate::types::PageOf;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Parameters for one page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub limit: usize,
    pub before_timestamp: Option<DateTime<Utc>>,
}

/// A source of pages for one resource. Implementations close over whatever
/// extra arguments the underlying endpoint needs (e.g. a conversation id).
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch_page(&self, params: PageParams) -> Result<PageOf<T>>;
}

/// Accumulated pagination state, readable as a snapshot
#[derive(Debug, Clone)]
pub struct PageSnapshot<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub next_cursor_timestamp: Option<DateTime<Utc>>,
    pub total_items: Option<u64>,
    pub loading: bool,
    pub loading_more: bool,
    pub error: Option<String>,
}

struct PageState<T> {
    items: Vec<T>,
    next_cursor: Option<DateTime<Utc>>,
    has_more: bool,
    total_items: Option<u64>,
    loading: bool,
    loading_more: bool,
    error: Option<String>,
}

impl<T> PageState<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            has_more: false,
            total_items: None,
            loading: false,
            loading_more: false,
            error: None,
        }
    }
}

/// Cursor paginator with a request staleness guard: every request carries a
/// monotonically increasing ticket, and a response is applied only if its
/// ticket is still the latest issued. A slow early response can never
/// clobber a faster later one.
pub struct Paginator<T> {
    source: Arc<dyn PageSource<T>>,
    page_size: usize,
    state: Arc<RwLock<PageState<T>>>,
    ticket: Arc<AtomicU64>,
}

impl<T> Clone for Paginator<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            page_size: self.page_size,
            state: self.state.clone(),
            ticket: self.ticket.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Paginator<T> {
    pub fn new(source: Arc<dyn PageSource<T>>, page_size: usize) -> Self {
        Self {
            source,
            page_size,
            state: Arc::new(RwLock::new(PageState::new())),
            ticket: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Load the first page. A non-refresh fetch clears accumulated items
    /// and cursors before issuing the request; a refresh keeps them until
    /// a successful response replaces them.
    pub async fn fetch(&self, is_refresh: bool) -> Result<()> {
        let ticket = self.ticket.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.write().await;
            if !is_refresh {
                state.items.clear();
                state.next_cursor = None;
                state.has_more = false;
                state.total_items = None;
            }
            state.loading = true;
            state.loading_more = false;
            state.error = None;
        }

        let result = self
            .source
            .fetch_page(PageParams {
                limit: self.page_size,
                before_timestamp: None,
            })
            .await;

        let mut state = self.state.write().await;
        if ticket != self.ticket.load(Ordering::SeqCst) {
            debug!("Dropping stale page response (ticket {})", ticket);
            return Ok(());
        }
        state.loading = false;

        match result {
            Ok(page) => {
                state.items = page.items;
                state.next_cursor = page.next_cursor_timestamp;
                state.has_more = page.has_more;
                state.total_items = page.total_items;
                Ok(())
            }
            Err(e) => {
                // Loaded items are retained; the error is a visible state
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Load the next (older) page and append it at the tail. No-op while a
    /// load is in flight, when nothing more exists, or without a cursor.
    pub async fn fetch_more(&self) -> Result<()> {
        let (ticket, before) = {
            let mut state = self.state.write().await;
            if state.loading || state.loading_more || !state.has_more {
                return Ok(());
            }
            let Some(cursor) = state.next_cursor else {
                return Ok(());
            };
            state.loading_more = true;
            state.error = None;
            (self.ticket.fetch_add(1, Ordering::SeqCst) + 1, cursor)
        };

        let result = self
            .source
            .fetch_page(PageParams {
                limit: self.page_size,
                before_timestamp: Some(before),
            })
            .await;

        let mut state = self.state.write().await;
        if ticket != self.ticket.load(Ordering::SeqCst) {
            debug!("Dropping stale page response (ticket {})", ticket);
            return Ok(());
        }
        state.loading_more = false;

        match result {
            Ok(page) => {
                state.items.extend(page.items);
                state.next_cursor = page.next_cursor_timestamp;
                state.has_more = page.has_more;
                if page.total_items.is_some() {
                    state.total_items = page.total_items;
                }
                Ok(())
            }
            Err(e) => {
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Clear all accumulated state and invalidate in-flight requests
    pub async fn reset(&self) {
        self.ticket.fetch_add(1, Ordering::SeqCst);
        *self.state.write().await = PageState::new();
    }

    /// Mutate the accumulated items in place (live inserts, metadata
    /// patches). The paginator is an accumulator; live updates land here.
    pub async fn modify<F>(&self, f: F)
    where
        F: FnOnce(&mut Vec<T>),
    {
        let mut state = self.state.write().await;
        f(&mut state.items);
    }

    pub async fn snapshot(&self) -> PageSnapshot<T> {
        let state = self.state.read().await;
        PageSnapshot {
            items: state.items.clone(),
            has_more: state.has_more,
            next_cursor_timestamp: state.next_cursor,
            total_items: state.total_items,
            loading: state.loading,
            loading_more: state.loading_more,
            error: state.error.clone(),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::time::Duration;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    /// Scripted source: each call pops the next (delay, result) entry
    struct ScriptedSource {
        script: Mutex<Vec<(Duration, Result<PageOf<u32>>)>>,
        calls: AtomicU64,
    }

    impl ScriptedSource {
        fn new(script: Vec<(Duration, Result<PageOf<u32>>)>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: AtomicU64::new(0),
            })
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageSource<u32> for ScriptedSource {
        async fn fetch_page(&self, _params: PageParams) -> Result<PageOf<u32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (delay, result) = self.script.lock().unwrap().remove(0);
            tokio::time::sleep(delay).await;
            result
        }
    }

    fn page(items: Vec<u32>, cursor: Option<i64>, has_more: bool) -> PageOf<u32> {
        PageOf {
            items,
            next_cursor_timestamp: cursor.map(ts),
            has_more,
            total_items: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_then_fetch_more_appends_at_tail() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(page(vec![30, 20], Some(20), true))),
            (Duration::ZERO, Ok(page(vec![10, 5], None, false))),
        ]);
        let paginator = Paginator::new(source.clone(), 2);

        paginator.fetch(false).await.unwrap();
        paginator.fetch_more().await.unwrap();

        let snap = paginator.snapshot().await;
        assert_eq!(snap.items, vec![30, 20, 10, 5]);
        assert!(!snap.has_more);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_more_noop_without_more() {
        let source = ScriptedSource::new(vec![(
            Duration::ZERO,
            Ok(page(vec![1], Some(1), false)),
        )]);
        let paginator = Paginator::new(source.clone(), 1);

        paginator.fetch(false).await.unwrap();
        paginator.fetch_more().await.unwrap();
        paginator.fetch_more().await.unwrap();

        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_fetch_more_noop_without_cursor() {
        let source = ScriptedSource::new(vec![(
            Duration::ZERO,
            // has_more claimed, but no cursor to page from
            Ok(page(vec![1], None, true)),
        )]);
        let paginator = Paginator::new(source.clone(), 1);

        paginator.fetch(false).await.unwrap();
        paginator.fetch_more().await.unwrap();

        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_staleness_guard_slow_first_request() {
        // First request resolves after the second; the final state must
        // reflect the second result only.
        let source = ScriptedSource::new(vec![
            (Duration::from_millis(200), Ok(page(vec![1, 2], Some(2), true))),
            (Duration::from_millis(10), Ok(page(vec![9, 8], Some(8), true))),
        ]);
        let paginator = Paginator::new(source, 2);

        let slow = paginator.clone();
        let slow_task = tokio::spawn(async move { slow.fetch(false).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        paginator.fetch(false).await.unwrap();
        slow_task.await.unwrap().unwrap();

        let snap = paginator.snapshot().await;
        assert_eq!(snap.items, vec![9, 8]);
    }

    #[tokio::test]
    async fn test_fetch_error_keeps_loaded_items() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(page(vec![3, 2], Some(2), true))),
            (
                Duration::ZERO,
                Err(SyncError::Fetch("boom".to_string())),
            ),
        ]);
        let paginator = Paginator::new(source, 2);

        paginator.fetch(false).await.unwrap();
        assert!(paginator.fetch_more().await.is_err());

        let snap = paginator.snapshot().await;
        assert_eq!(snap.items, vec![3, 2]);
        assert!(snap.error.is_some());
        assert!(!snap.loading_more);
    }

    #[tokio::test]
    async fn test_reset_invalidates_in_flight() {
        let source = ScriptedSource::new(vec![(
            Duration::from_millis(100),
            Ok(page(vec![1], Some(1), true)),
        )]);
        let paginator = Paginator::new(source, 1);

        let slow = paginator.clone();
        let task = tokio::spawn(async move { slow.fetch(false).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        paginator.reset().await;
        task.await.unwrap().unwrap();

        assert!(paginator.is_empty().await);
    }
}
