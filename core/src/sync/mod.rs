/// Reconciliation layer: ordered event log, live-follow mode, prefetch
pub mod follow;
pub mod prefetch;
pub mod reconciler;

pub use follow::{FollowController, FollowMode, NotifyPolicy, ViewerVisibility};
pub use prefetch::{PrefetchScheduler, PrefetchTrigger};
pub use reconciler::{EventRecord, LogPhase, PendingKind, Reconciler};
