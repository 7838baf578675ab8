//! Stage selection: which participant is shown large and recorded

use std::fmt;

/// Stage occupant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StageTarget {
    /// The local camera or screen
    Local,
    /// A remote peer by id
    Peer(String),
}

impl StageTarget {
    /// Peer id when a remote peer is staged
    pub fn peer_id(&self) -> Option<&str> {
        match self {
            StageTarget::Local => None,
            StageTarget::Peer(id) => Some(id),
        }
    }
}

impl fmt::Display for StageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageTarget::Local => write!(f, "local"),
            StageTarget::Peer(id) => write!(f, "{}", id),
        }
    }
}

/// Stage metadata for the recording overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageMeta {
    /// Display name of the staged participant
    pub name: String,
    /// User id of the staged participant (may be empty)
    pub uid: String,
    /// Whether the staged participant owns the room
    pub is_owner: bool,
}

/// Tracks the staged participant
///
/// Pure state. The session checks that a selected peer exists and calls
/// [`StageSelector::on_peer_removed`] on every departure, so the staged id is
/// always `Local` or a present peer.
#[derive(Debug, Clone)]
pub struct StageSelector {
    staged: StageTarget,
    user_pinned: bool,
}

impl Default for StageSelector {
    fn default() -> Self {
        Self {
            staged: StageTarget::Local,
            user_pinned: false,
        }
    }
}

impl StageSelector {
    /// Start with the local stream on stage
    pub fn new() -> Self {
        Self::default()
    }

    /// User selection: stage `target` and pin it
    pub fn select(&mut self, target: StageTarget) {
        self.staged = target;
        self.user_pinned = true;
    }

    /// Fall back to local if `peer_id` was staged; returns true if it was
    pub fn on_peer_removed(&mut self, peer_id: &str) -> bool {
        if self.staged.peer_id() != Some(peer_id) {
            return false;
        }
        self.staged = StageTarget::Local;
        self.user_pinned = false;
        true
    }

    /// Unpinned reset to local; returns true if the stage moved
    pub fn show_local(&mut self) -> bool {
        let moved = self.staged != StageTarget::Local;
        self.staged = StageTarget::Local;
        self.user_pinned = false;
        moved
    }

    /// Currently staged participant
    pub fn staged(&self) -> &StageTarget {
        &self.staged
    }

    /// Whether the current stage was chosen by the user
    pub fn is_user_pinned(&self) -> bool {
        self.user_pinned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_local_unpinned() {
        let stage = StageSelector::new();
        assert_eq!(stage.staged(), &StageTarget::Local);
        assert!(!stage.is_user_pinned());
    }

    #[test]
    fn test_select_pins() {
        let mut stage = StageSelector::new();
        stage.select(StageTarget::Peer("p1".to_string()));
        assert_eq!(stage.staged().peer_id(), Some("p1"));
        assert!(stage.is_user_pinned());
    }

    #[test]
    fn test_removed_staged_peer_falls_back() {
        let mut stage = StageSelector::new();
        stage.select(StageTarget::Peer("p1".to_string()));

        assert!(!stage.on_peer_removed("p2"));
        assert_eq!(stage.staged().peer_id(), Some("p1"));

        assert!(stage.on_peer_removed("p1"));
        assert_eq!(stage.staged(), &StageTarget::Local);
        assert!(!stage.is_user_pinned());
    }

    #[test]
    fn test_show_local() {
        let mut stage = StageSelector::new();
        assert!(!stage.show_local());

        stage.select(StageTarget::Peer("p1".to_string()));
        assert!(stage.show_local());
        assert!(!stage.is_user_pinned());
    }

    #[test]
    fn test_display() {
        assert_eq!(StageTarget::Local.to_string(), "local");
        assert_eq!(StageTarget::Peer("p1".to_string()).to_string(), "p1");
    }
}
