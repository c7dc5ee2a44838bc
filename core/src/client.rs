/// Main client: conversation list, selection state, and the active
/// per-conversation sync context.
///
/// All mutation of the active conversation's state happens on one
/// serialized path: the apply loop drains live-channel messages in
/// delivery order, and history installs/appends take the same lock.
use crate::api::{ApiClient, ChatListSource, EventHistorySource, ScreenshotSource};
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::paginate::{PageSnapshot, Paginator};
use crate::protocol::{MessageCreate, ServerMessage};
use crate::session::SessionContext;
use crate::sync::{
    EventRecord, FollowController, FollowMode, LogPhase, PrefetchScheduler, Reconciler,
    ViewerVisibility,
};
use crate::transport::{ChannelTransport, LinkState};
use crate::types::{ChatEvent, Conversation, EventKind, ScreenshotRecord};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};

pub struct Client {
    config: Config,
    session: SessionContext,
    api: Arc<ApiClient>,
    chats: Paginator<Conversation>,
    active: RwLock<Option<Arc<ActiveChat>>>,
}

impl Client {
    pub fn new(session: SessionContext, config: Config) -> Result<Self> {
        let api = Arc::new(ApiClient::new(session.clone())?);
        let chats = Paginator::new(
            Arc::new(ChatListSource { api: api.clone() }),
            config.chat_page_size,
        );

        Ok(Self {
            config,
            session,
            api,
            chats,
            active: RwLock::new(None),
        })
    }

    // ─── Conversation list ───────────────────────────────────────────────

    pub async fn load_chats(&self) -> Result<()> {
        self.chats.fetch(false).await
    }

    pub async fn load_more_chats(&self) -> Result<()> {
        self.chats.fetch_more().await
    }

    pub async fn refresh_chats(&self) -> Result<()> {
        self.chats.fetch(true).await
    }

    pub async fn chats_snapshot(&self) -> PageSnapshot<Conversation> {
        self.chats.snapshot().await
    }

    pub async fn create_chat(&self, name: Option<&str>) -> Result<Conversation> {
        let chat = self.api.create_chat(name).await?;
        self.refresh_chats().await?;
        Ok(chat)
    }

    pub async fn rename_chat(&self, chat_id: &str, name: &str) -> Result<Conversation> {
        let chat = self.api.rename_chat(chat_id, name).await?;
        self.refresh_chats().await?;
        Ok(chat)
    }

    pub async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        self.api.delete_chat(chat_id).await?;

        let is_active = {
            let active = self.active.read().await;
            active.as_deref().map(|c| c.chat_id() == chat_id).unwrap_or(false)
        };
        if is_active {
            self.select_chat(None).await?;
        }
        self.refresh_chats().await
    }

    // ─── Selection ───────────────────────────────────────────────────────

    /// Switch the active conversation. The previous context is torn down
    /// first: its transport is disconnected, in-flight fetches are
    /// invalidated, and its event log is discarded.
    pub async fn select_chat(&self, chat_id: Option<&str>) -> Result<Option<Arc<ActiveChat>>> {
        {
            let mut active = self.active.write().await;
            if let Some(old) = active.take() {
                info!("Deselecting chat {}", old.chat_id());
                old.shutdown().await;
            }
        }

        let Some(chat_id) = chat_id else {
            return Ok(None);
        };

        info!("Selecting chat {}", chat_id);
        let chat = ActiveChat::spawn(
            chat_id,
            &self.session,
            self.config.clone(),
            self.api.clone(),
            self.chats.clone(),
        );

        // Fetch failures are non-fatal: they are retained as visible error
        // state on the paginators and retried explicitly.
        if let Err(e) = chat.load_history().await {
            warn!("Initial event history fetch failed: {}", e);
        }
        if let Err(e) = chat.load_screenshots().await {
            warn!("Initial screenshot fetch failed: {}", e);
        }

        *self.active.write().await = Some(chat.clone());
        Ok(Some(chat))
    }

    pub async fn active(&self) -> Option<Arc<ActiveChat>> {
        self.active.read().await.clone()
    }
}

// ─── Active conversation context ─────────────────────────────────────────────

struct SyncState {
    reconciler: Reconciler,
    follow: FollowController,
    prefetch: PrefetchScheduler,
    visibility: ViewerVisibility,
}

/// Everything bound to the currently selected conversation: the live
/// channel, both paginators, the reconciled event log and the screenshot
/// viewer state.
pub struct ActiveChat {
    chat_id: String,
    config: Config,
    transport: ChannelTransport,
    events: Paginator<ChatEvent>,
    screenshots: Paginator<ScreenshotRecord>,
    chats: Paginator<Conversation>,
    state: Arc<RwLock<SyncState>>,
    log_tx: watch::Sender<Arc<Vec<EventRecord>>>,
}

impl ActiveChat {
    fn spawn(
        chat_id: &str,
        session: &SessionContext,
        config: Config,
        api: Arc<ApiClient>,
        chats: Paginator<Conversation>,
    ) -> Arc<Self> {
        let (transport, msg_rx) = ChannelTransport::open(session, chat_id, &config);
        transport.connect();

        let events = Paginator::new(
            Arc::new(EventHistorySource {
                api: api.clone(),
                chat_id: chat_id.to_string(),
            }),
            config.event_page_size,
        );
        let screenshots = Paginator::new(
            Arc::new(ScreenshotSource {
                api,
                chat_id: chat_id.to_string(),
            }),
            config.screenshot_page_size,
        );

        Self::with_parts(chat_id, transport, msg_rx, events, screenshots, chats, config)
    }

    /// Assemble a context from its parts. Public so tests can wire scripted
    /// page sources and a local endpoint in.
    pub fn with_parts(
        chat_id: &str,
        transport: ChannelTransport,
        msg_rx: mpsc::Receiver<ServerMessage>,
        events: Paginator<ChatEvent>,
        screenshots: Paginator<ScreenshotRecord>,
        chats: Paginator<Conversation>,
        config: Config,
    ) -> Arc<Self> {
        let (log_tx, _) = watch::channel(Arc::new(Vec::new()));
        let state = SyncState {
            reconciler: Reconciler::new(chat_id),
            follow: FollowController::new(config.notify_policy),
            prefetch: PrefetchScheduler::new(
                config.prefetch_lookahead,
                config.prefetch_debounce,
                config.prefetch_min_interval,
            ),
            visibility: ViewerVisibility::Closed,
        };

        let chat = Arc::new(Self {
            chat_id: chat_id.to_string(),
            config,
            transport,
            events,
            screenshots,
            chats,
            state: Arc::new(RwLock::new(state)),
            log_tx,
        });

        let driver = chat.clone();
        tokio::spawn(async move {
            driver.run_apply_loop(msg_rx).await;
        });

        chat
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn link_state(&self) -> LinkState {
        self.transport.state()
    }

    pub fn link_watch(&self) -> watch::Receiver<LinkState> {
        self.transport.state_watch()
    }

    /// Watch of event-log snapshots (newest-first). Each update swaps in a
    /// freshly built sequence; borrowed snapshots stay stable.
    pub fn log_watch(&self) -> watch::Receiver<Arc<Vec<EventRecord>>> {
        self.log_tx.subscribe()
    }

    pub fn log_snapshot(&self) -> Arc<Vec<EventRecord>> {
        self.log_tx.borrow().clone()
    }

    pub async fn log_phase(&self) -> LogPhase {
        self.state.read().await.reconciler.phase()
    }

    pub async fn screenshots_snapshot(&self) -> PageSnapshot<ScreenshotRecord> {
        self.screenshots.snapshot().await
    }

    pub async fn events_error(&self) -> Option<String> {
        self.events.snapshot().await.error
    }

    // ─── History ─────────────────────────────────────────────────────────

    /// Load the first page of event history and install it as the log
    pub async fn load_history(&self) -> Result<()> {
        self.state.write().await.reconciler.begin_initial_load();
        let result = self.events.fetch(false).await;

        let snap = self.events.snapshot().await;
        let mut state = self.state.write().await;
        result?;
        state.reconciler.install_history(snap.items);
        self.publish_log(&state);
        Ok(())
    }

    /// Fetch the next (older) page and append it, dropping ids the log
    /// already contains
    pub async fn load_older_events(&self) -> Result<()> {
        let already_loaded = self.events.len().await;
        self.state.write().await.reconciler.begin_older_load();

        let result = self.events.fetch_more().await;

        let snap = self.events.snapshot().await;
        let mut state = self.state.write().await;
        let fresh = snap
            .items
            .get(already_loaded..)
            .map(|s| s.to_vec())
            .unwrap_or_default();
        state.reconciler.append_older(fresh);
        self.publish_log(&state);
        result
    }

    pub async fn has_older_events(&self) -> bool {
        self.events.snapshot().await.has_more
    }

    pub async fn load_screenshots(&self) -> Result<()> {
        self.screenshots.fetch(false).await
    }

    // ─── Sending ─────────────────────────────────────────────────────────

    /// Insert the optimistic placeholder pair and deliver the message.
    /// On failure the placeholders stay visible; the caller decides
    /// whether to retry.
    pub async fn send_message(&self, content: &str) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.reconciler.push_optimistic_user(content);
            self.publish_log(&state);
        }

        let delivered = self.transport.send(&MessageCreate::user(content)).await;
        if !delivered {
            return Err(SyncError::Send(format!(
                "message to chat {} was not delivered",
                self.chat_id
            )));
        }
        Ok(())
    }

    // ─── Screenshot viewer ───────────────────────────────────────────────

    pub async fn follow_mode(&self) -> FollowMode {
        self.state.read().await.follow.mode()
    }

    pub async fn viewed_screenshot(&self) -> usize {
        self.state.read().await.follow.viewed_index()
    }

    pub async fn unseen_screenshots(&self) -> u32 {
        self.state.read().await.follow.unseen()
    }

    pub async fn clear_unseen_screenshots(&self) {
        self.state.write().await.follow.clear_unseen();
    }

    pub async fn set_viewer_visibility(&self, visibility: ViewerVisibility) {
        self.state.write().await.visibility = visibility;
    }

    /// Re-engage live-follow: snap to the newest screenshot
    pub async fn follow_screenshots(&self) {
        self.state.write().await.follow.enter_live();
    }

    /// Manual navigation in the screenshot viewer. Disengages live-follow
    /// when moving off the newest item and schedules a debounced prefetch
    /// check.
    pub async fn view_screenshot(&self, index: usize) {
        {
            let mut state = self.state.write().await;
            state.follow.navigate(index);
            state.prefetch.on_navigate(Instant::now());
        }

        let state = self.state.clone();
        let screenshots = self.screenshots.clone();
        let delay = self.config.prefetch_debounce;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            Self::poll_prefetch(&state, &screenshots).await;
        });
    }

    async fn poll_prefetch(
        state: &Arc<RwLock<SyncState>>,
        screenshots: &Paginator<ScreenshotRecord>,
    ) {
        let snap = screenshots.snapshot().await;
        let decision = {
            let mut state = state.write().await;
            let viewed = state.follow.viewed_index();
            state
                .prefetch
                .poll(viewed, snap.items.len(), snap.has_more, Instant::now())
        };

        if let Some(trigger) = decision {
            debug!("Prefetching screenshots ({:?})", trigger);
            if let Err(e) = screenshots.fetch_more().await {
                warn!("Screenshot prefetch failed: {}", e);
            }
        }
    }

    // ─── Live updates ────────────────────────────────────────────────────

    async fn run_apply_loop(&self, mut rx: mpsc::Receiver<ServerMessage>) {
        while let Some(msg) = rx.recv().await {
            self.apply(msg).await;
        }
        debug!("Apply loop ended for chat {}", self.chat_id);
    }

    async fn apply(&self, msg: ServerMessage) {
        match msg {
            ServerMessage::ChatTitleUpdated { data } => {
                self.chats
                    .modify(|items| {
                        if let Some(chat) = items.iter_mut().find(|c| c.id == data.chat_id) {
                            chat.name = data.title.clone();
                            chat.updated_at = data.updated_at;
                        }
                    })
                    .await;
            }
            ServerMessage::ScreenshotCaptured { data } => {
                self.screenshots
                    .modify(|items| items.insert(0, data.screenshot))
                    .await;
                let mut state = self.state.write().await;
                let visibility = state.visibility;
                state.follow.on_artifact(visibility);
            }
            other => {
                let Some(event) = other.into_event() else {
                    return;
                };
                self.patch_latest_message(&event).await;

                let mut state = self.state.write().await;
                state.reconciler.apply_live(event);
                self.publish_log(&state);
            }
        }
    }

    /// Opportunistically refresh the denormalized list-display fields on
    /// the matching conversation, whatever is currently selected
    async fn patch_latest_message(&self, event: &ChatEvent) {
        if event.kind == EventKind::Reasoning {
            return;
        }
        let chat_id = event.chat_id.clone();
        let content = event.content.clone();
        let at = event.created_at;
        self.chats
            .modify(move |items| {
                if let Some(chat) = items.iter_mut().find(|c| c.id == chat_id) {
                    chat.latest_message_content = Some(content);
                    chat.latest_message_timestamp = Some(at);
                }
            })
            .await;
    }

    fn publish_log(&self, state: &SyncState) {
        let _ = self.log_tx.send(state.reconciler.snapshot());
    }

    // ─── Teardown ────────────────────────────────────────────────────────

    /// Disconnect the live channel and invalidate everything scoped to
    /// this conversation. In-flight page responses for the old context are
    /// ignored in their handlers via the staleness guard.
    pub async fn shutdown(&self) {
        self.transport.disconnect();
        self.events.reset().await;
        self.screenshots.reset().await;
    }
}
