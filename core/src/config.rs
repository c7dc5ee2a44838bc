/// Configuration management
use crate::error::{Result, SyncError};
use crate::sync::follow::NotifyPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_CHAT_PAGE_SIZE: usize = 20;
const DEFAULT_EVENT_PAGE_SIZE: usize = 20;
const DEFAULT_SCREENSHOT_PAGE_SIZE: usize = 5;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Fixed delay between reconnect attempts on the live channel
    pub reconnect_interval: Duration,

    /// Max consecutive failed connect attempts before the link parks itself
    pub max_reconnect_attempts: u32,

    /// How long `send` waits for the link to open before giving up
    pub send_timeout: Duration,

    /// Page size for the conversation list
    pub chat_page_size: usize,

    /// Page size for event history
    pub event_page_size: usize,

    /// Page size for screenshot history
    pub screenshot_page_size: usize,

    /// How close to the oldest loaded screenshot the viewer may get
    /// before the next page is fetched ahead of need
    pub prefetch_lookahead: usize,

    /// Quiet period after the last navigation before a prefetch may fire
    pub prefetch_debounce: Duration,

    /// Minimum interval between triggered prefetches (per trigger class)
    pub prefetch_min_interval: Duration,

    /// When screenshot notifications count against the unseen counter
    pub notify_policy: NotifyPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(3),
            max_reconnect_attempts: 5,
            send_timeout: Duration::from_secs(10),
            chat_page_size: DEFAULT_CHAT_PAGE_SIZE,
            event_page_size: DEFAULT_EVENT_PAGE_SIZE,
            screenshot_page_size: DEFAULT_SCREENSHOT_PAGE_SIZE,
            prefetch_lookahead: 3,
            prefetch_debounce: Duration::from_millis(250),
            prefetch_min_interval: Duration::from_secs(1),
            notify_policy: NotifyPolicy::WheneverHidden,
        }
    }
}

impl Config {
    /// Create config from command line flags (positional args are handled
    /// by the binary; this parses only the tuning flags)
    pub fn from_flags(args: &[String]) -> Result<Self> {
        let mut config = Self::default();

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--reconnect-interval-ms" => {
                    config.reconnect_interval =
                        Duration::from_millis(parse_flag_u64(args, i, "--reconnect-interval-ms")?);
                    i += 2;
                }
                "--max-reconnect-attempts" => {
                    config.max_reconnect_attempts =
                        parse_flag_u64(args, i, "--max-reconnect-attempts")? as u32;
                    i += 2;
                }
                "--send-timeout-ms" => {
                    config.send_timeout =
                        Duration::from_millis(parse_flag_u64(args, i, "--send-timeout-ms")?);
                    i += 2;
                }
                "--event-page-size" => {
                    config.event_page_size =
                        parse_flag_u64(args, i, "--event-page-size")?.clamp(1, 100) as usize;
                    i += 2;
                }
                "--screenshot-page-size" => {
                    config.screenshot_page_size =
                        parse_flag_u64(args, i, "--screenshot-page-size")?.clamp(1, 100) as usize;
                    i += 2;
                }
                "--notify-visible-tab-only" => {
                    config.notify_policy = NotifyPolicy::VisibleTabOnly;
                    i += 1;
                }
                other => {
                    return Err(SyncError::Config(format!("Unknown flag: {}", other)));
                }
            }
        }

        // Env overrides (nice for scripts)
        if let Some(ms) = std::env::var("AGENTDESK_RECONNECT_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.reconnect_interval = Duration::from_millis(ms);
        }
        if let Some(n) = std::env::var("AGENTDESK_MAX_RECONNECT_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
        {
            config.max_reconnect_attempts = n;
        }

        Ok(config)
    }
}

fn parse_flag_u64(args: &[String], i: usize, flag: &str) -> Result<u64> {
    let value = args
        .get(i + 1)
        .ok_or_else(|| SyncError::Config(format!("{} requires a value", flag)))?;
    value
        .parse::<u64>()
        .map_err(|_| SyncError::Config(format!("{} must be a valid number", flag)))
}
