/// AgentDesk Core - Chat Event Synchronization & Pagination Engine
///
/// Client-side core that reconciles a bidirectional live event stream with
/// cursor-paginated history, manages optimistic local state, and drives
/// the live-follow screenshot viewer.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod paginate;
pub mod protocol;
pub mod session;
pub mod sync;
pub mod transport;
pub mod types;

pub use client::{ActiveChat, Client};
pub use config::Config;
pub use error::{Result, SyncError};
pub use session::SessionContext;
