/// Live-follow mode for the screenshot viewer
///
/// `Live` keeps the displayed artifact pinned to the newest one as new
/// artifacts arrive; any manual navigation away from the newest item drops
/// to `Browsing`, where the displayed item stays stable under arrivals.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowMode {
    Live,
    Browsing,
}

/// Where the viewer currently is, from the embedding UI's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerVisibility {
    /// Viewer open and its tab active
    Visible,
    /// Viewer open but its tab not the active one
    InactiveTab,
    /// Viewer not open at all
    Closed,
}

/// Whether an arrival counts against the unseen counter when the viewer is
/// open on an inactive tab (the fully-hidden case always counts)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// Count unless the viewer's tab is the active one
    WheneverHidden,
    /// Count only when the viewer is closed outright
    VisibleTabOnly,
}

pub struct FollowController {
    mode: FollowMode,
    viewed_index: usize,
    unseen: u32,
    policy: NotifyPolicy,
}

impl FollowController {
    pub fn new(policy: NotifyPolicy) -> Self {
        Self {
            mode: FollowMode::Live,
            viewed_index: 0,
            unseen: 0,
            policy,
        }
    }

    pub fn mode(&self) -> FollowMode {
        self.mode
    }

    pub fn viewed_index(&self) -> usize {
        self.viewed_index
    }

    pub fn unseen(&self) -> u32 {
        self.unseen
    }

    /// Explicit user toggle back to live mode; snaps to the newest item
    pub fn enter_live(&mut self) {
        self.mode = FollowMode::Live;
        self.viewed_index = 0;
    }

    /// Manual navigation. Moving anywhere but the newest item while live
    /// disengages follow mode.
    pub fn navigate(&mut self, index: usize) {
        self.viewed_index = index;
        if self.mode == FollowMode::Live && index != 0 {
            self.mode = FollowMode::Browsing;
        }
    }

    /// A new artifact arrived (and was prepended to the list)
    pub fn on_artifact(&mut self, visibility: ViewerVisibility) {
        match self.mode {
            FollowMode::Live => self.viewed_index = 0,
            // Shift by one so the currently displayed item stays the same
            FollowMode::Browsing => self.viewed_index += 1,
        }

        if self.counts_as_unseen(visibility) {
            self.unseen += 1;
        }
    }

    pub fn clear_unseen(&mut self) {
        self.unseen = 0;
    }

    fn counts_as_unseen(&self, visibility: ViewerVisibility) -> bool {
        match visibility {
            ViewerVisibility::Closed => true,
            ViewerVisibility::Visible => false,
            ViewerVisibility::InactiveTab => self.policy == NotifyPolicy::WheneverHidden,
        }
    }
}
