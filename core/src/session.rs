/// Session context: where the backend lives and who we are.
///
/// The auth token is carried here and injected into the transport and the
/// API client at construction time, never read from ambient state, so two
/// sessions can coexist in one process.
use crate::error::{Result, SyncError};

#[derive(Debug, Clone)]
pub struct SessionContext {
    /// REST base, e.g. `http://localhost:8000/api/v1`
    pub api_base: String,

    /// WebSocket base, e.g. `ws://localhost:8000/api/v1`
    pub ws_base: String,

    /// Bearer token for REST, passed as a query param on the live channel
    pub token: String,
}

impl SessionContext {
    /// Build a session for the given API base; the WebSocket base is
    /// derived by swapping the URL scheme
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let api_base = api_base.into();
        let trimmed = api_base.trim_end_matches('/').to_string();

        let ws_base = if let Some(rest) = trimmed.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = trimmed.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            return Err(SyncError::Config(format!(
                "API base must be http(s): {}",
                api_base
            )));
        };

        Ok(Self {
            api_base: trimmed,
            ws_base,
            token: token.into(),
        })
    }

    /// Override the derived WebSocket base (e.g. when the live channel is
    /// served from a different host)
    pub fn with_ws_base(mut self, ws_base: impl Into<String>) -> Self {
        self.ws_base = ws_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Live-channel endpoint for one conversation
    pub fn ws_endpoint(&self, chat_id: &str) -> String {
        format!("{}/ws/{}?token={}", self.ws_base, chat_id, self.token)
    }

    /// REST endpoint under the API base
    pub fn api_endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }
}
