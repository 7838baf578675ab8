//! Local participant identity

use serde::{Deserialize, Serialize};

/// Identity of the local participant, resolved before joining
///
/// Read-only for the session except for two rewrites: `avatar_url` once the
/// avatar cache returns a local path, and `user_id`/`chat_id` when the server
/// announces an owner while this client holds the owner link but no user id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Name shown to other participants
    pub display_name: String,

    /// Stable user id (may be empty until resolved)
    pub user_id: String,

    /// Avatar URL or cached web path
    pub avatar_url: String,

    /// Whether this client was opened through the owner link
    pub is_owner_by_link: bool,

    /// Chat that receives finished recordings
    pub chat_id: String,

    /// Free-form user info forwarded in `hello`
    #[serde(default)]
    pub info: serde_json::Value,
}

impl Identity {
    /// Create an identity with a display name and user id
    pub fn new(display_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Adopt the announced owner id if this client owns the room by link
    /// but has no user id yet. Returns true when the identity changed.
    pub(crate) fn adopt_owner_uid(&mut self, owner_uid: &str) -> bool {
        if !self.is_owner_by_link || !self.user_id.is_empty() || owner_uid.is_empty() {
            return false;
        }

        self.user_id = owner_uid.to_string();
        if self.chat_id.is_empty() {
            self.chat_id = self.user_id.clone();
        }
        true
    }

    /// Whether this identity is the given room owner
    pub fn is_owner(&self, owner_uid: &str) -> bool {
        !owner_uid.is_empty() && self.user_id == owner_uid
    }
}
