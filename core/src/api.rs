/// REST client for the chat backend
///
/// Endpoints (all under the session's API base):
///   GET    /chats                      ?limit=N&before_timestamp=T
///   POST   /chats                      body: {"name": "..."|null}
///   GET    /chats/:id                  chat details
///   PATCH  /chats/:id                  body: {"name": "..."}
///   DELETE /chats/:id
///   GET    /chats/:id/messages         ?limit=N&before_timestamp=T
///   GET    /chats/:id/screenshots      ?limit=N&before_timestamp=T
use crate::error::{Result, SyncError};
use crate::paginate::{PageParams, PageSource};
use crate::session::SessionContext;
use crate::types::{ApiEnvelope, ChatEvent, Conversation, PageOf, ScreenshotRecord};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct ApiClient {
    http: Client,
    session: SessionContext,
}

impl ApiClient {
    pub fn new(session: SessionContext) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(SyncError::Http)?;

        Ok(Self { http, session })
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        params: PageParams,
    ) -> Result<PageOf<T>> {
        let url = self.session.api_endpoint(path);
        debug!("GET {} limit={} before={:?}", url, params.limit, params.before_timestamp);

        let mut request = self
            .http
            .get(&url)
            .bearer_auth(&self.session.token)
            .query(&[("limit", params.limit.to_string())]);
        if let Some(before) = params.before_timestamp {
            request = request.query(&[("before_timestamp", before.to_rfc3339())]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Fetch(format!("{} ({}): {}", url, status, body)));
        }

        let envelope: ApiEnvelope<PageOf<T>> = response.json().await?;
        envelope
            .data
            .ok_or_else(|| SyncError::Fetch(format!("{}: response carried no data", url)))
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        url: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Fetch(format!("{} ({}): {}", url, status, body)));
        }
        let envelope: ApiEnvelope<T> = response.json().await?;
        envelope
            .data
            .ok_or_else(|| SyncError::Fetch(format!("{}: response carried no data", url)))
    }

    pub async fn list_chats(&self, params: PageParams) -> Result<PageOf<Conversation>> {
        self.get_page("chats", params).await
    }

    pub async fn chat_events(&self, chat_id: &str, params: PageParams) -> Result<PageOf<ChatEvent>> {
        self.get_page(&format!("chats/{}/messages", chat_id), params)
            .await
    }

    pub async fn chat_screenshots(
        &self,
        chat_id: &str,
        params: PageParams,
    ) -> Result<PageOf<ScreenshotRecord>> {
        self.get_page(&format!("chats/{}/screenshots", chat_id), params)
            .await
    }

    pub async fn create_chat(&self, name: Option<&str>) -> Result<Conversation> {
        let url = self.session.api_endpoint("chats");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.session.token)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        Self::unwrap_envelope(&url, response).await
    }

    pub async fn rename_chat(&self, chat_id: &str, name: &str) -> Result<Conversation> {
        let url = self.session.api_endpoint(&format!("chats/{}", chat_id));
        let response = self
            .http
            .patch(&url)
            .bearer_auth(&self.session.token)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        Self::unwrap_envelope(&url, response).await
    }

    pub async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        let url = self.session.api_endpoint(&format!("chats/{}", chat_id));
        let response = self
            .http
            .delete(&url)
            .bearer_auth(&self.session.token)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Fetch(format!("{} ({}): {}", url, status, body)));
        }
        Ok(())
    }
}

// ─── Page sources ────────────────────────────────────────────────────────────

/// Conversation list (no extra args)
pub struct ChatListSource {
    pub api: Arc<ApiClient>,
}

#[async_trait]
impl PageSource<Conversation> for ChatListSource {
    async fn fetch_page(&self, params: PageParams) -> Result<PageOf<Conversation>> {
        self.api.list_chats(params).await
    }
}

/// Event history for one conversation
pub struct EventHistorySource {
    pub api: Arc<ApiClient>,
    pub chat_id: String,
}

#[async_trait]
impl PageSource<ChatEvent> for EventHistorySource {
    async fn fetch_page(&self, params: PageParams) -> Result<PageOf<ChatEvent>> {
        self.api.chat_events(&self.chat_id, params).await
    }
}

/// Screenshot history for one conversation
pub struct ScreenshotSource {
    pub api: Arc<ApiClient>,
    pub chat_id: String,
}

#[async_trait]
impl PageSource<ScreenshotRecord> for ScreenshotSource {
    async fn fetch_page(&self, params: PageParams) -> Result<PageOf<ScreenshotRecord>> {
        self.api.chat_screenshots(&self.chat_id, params).await
    }
}
