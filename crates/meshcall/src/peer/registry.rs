//! Peer registry: who is in the call
//!
//! Pure storage plus metadata merge. Connection teardown and stage fallback
//! on removal are side effects owned by the session.

use super::connection::{LinkState, MediaConnection};
use crate::media::RemoteMedia;
use crate::signaling::PeerSummary;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Negotiation role of this side toward one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    /// This side discovered the peer in a room snapshot and sends the offer
    Offerer,
    /// The peer joined after us or offered first; this side only answers
    Answerer,
}

/// Per-peer connection phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    /// No connection object yet
    None,
    /// Connection created, no remote media yet
    Connecting,
    /// First remote track arrived
    Connected,
}

/// Partial metadata update for a peer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerMetadata {
    /// Display name
    pub display_name: String,
    /// Avatar URL
    pub avatar_url: String,
    /// Stable user id of the remote participant
    pub remote_user_id: String,
}

impl From<&PeerSummary> for PeerMetadata {
    fn from(p: &PeerSummary) -> Self {
        Self {
            display_name: p.name.clone(),
            avatar_url: p.avatar.clone(),
            remote_user_id: p.uid.clone(),
        }
    }
}

/// State kept for one remote participant
pub struct PeerEntry {
    /// Server-assigned peer id
    pub peer_id: String,

    /// Display name (last non-empty value)
    pub display_name: String,

    /// Avatar URL (last non-empty value)
    pub avatar_url: String,

    /// Remote user id (last non-empty value)
    pub remote_user_id: String,

    is_owner: bool,

    /// Negotiated connection, owned exclusively by this entry
    pub connection: Option<Arc<dyn MediaConnection>>,

    /// Role fixed when the connection was created
    pub role: Option<NegotiationRole>,

    /// Connection phase
    pub link: LinkPhase,

    /// Last transport state reported by the connection
    pub link_state: LinkState,

    /// Most recently received remote stream
    pub remote_media: Option<RemoteMedia>,
}

impl std::fmt::Debug for PeerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerEntry")
            .field("peer_id", &self.peer_id)
            .field("display_name", &self.display_name)
            .field("remote_user_id", &self.remote_user_id)
            .field("is_owner", &self.is_owner)
            .field("has_connection", &self.connection.is_some())
            .field("role", &self.role)
            .field("link", &self.link)
            .finish()
    }
}

impl PeerEntry {
    fn new(peer_id: &str) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            display_name: String::new(),
            avatar_url: String::new(),
            remote_user_id: String::new(),
            is_owner: false,
            connection: None,
            role: None,
            link: LinkPhase::None,
            link_state: LinkState::New,
            remote_media: None,
        }
    }

    /// Whether this peer is the room owner (derived from the owner uid)
    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    /// Connection id of the current connection, if any
    pub fn connection_id(&self) -> Option<uuid::Uuid> {
        self.connection.as_ref().map(|c| c.connection_id())
    }

    fn merge(&mut self, meta: PeerMetadata) {
        if !meta.display_name.is_empty() {
            self.display_name = meta.display_name;
        }
        if !meta.avatar_url.is_empty() {
            self.avatar_url = meta.avatar_url;
        }
        if !meta.remote_user_id.is_empty() {
            self.remote_user_id = meta.remote_user_id;
        }
    }

    fn derive_owner(&mut self, owner_uid: &str) {
        self.is_owner = !owner_uid.is_empty() && self.remote_user_id == owner_uid;
    }
}

/// Mapping from peer id to peer state
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: BTreeMap<String, PeerEntry>,
}

impl PeerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or merge an entry; returns true when the entry was created
    ///
    /// Ownership is re-derived for the touched entry against `owner_uid`.
    pub fn upsert(&mut self, peer_id: &str, meta: PeerMetadata, owner_uid: &str) -> bool {
        let mut created = false;
        let entry = self.peers.entry(peer_id.to_string()).or_insert_with(|| {
            created = true;
            PeerEntry::new(peer_id)
        });
        entry.merge(meta);
        entry.derive_owner(owner_uid);
        created
    }

    /// Look up an entry
    pub fn get(&self, peer_id: &str) -> Option<&PeerEntry> {
        self.peers.get(peer_id)
    }

    /// Look up an entry mutably
    pub fn get_mut(&mut self, peer_id: &str) -> Option<&mut PeerEntry> {
        self.peers.get_mut(peer_id)
    }

    /// Remove an entry, handing it (and its connection) back to the caller
    pub fn remove(&mut self, peer_id: &str) -> Option<PeerEntry> {
        self.peers.remove(peer_id)
    }

    /// Re-derive `is_owner` for every entry
    pub fn recompute_ownership(&mut self, owner_uid: &str) {
        for entry in self.peers.values_mut() {
            entry.derive_owner(owner_uid);
        }
    }

    /// Whether the registry holds this id
    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Peer ids in a stable order
    pub fn ids(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    /// Iterate over entries
    pub fn iter(&self) -> impl Iterator<Item = &PeerEntry> {
        self.peers.values()
    }

    /// Live connections of every entry
    pub fn connections(&self) -> Vec<Arc<dyn MediaConnection>> {
        self.peers
            .values()
            .filter_map(|e| e.connection.clone())
            .collect()
    }

    /// Remove every entry
    pub fn drain(&mut self) -> Vec<PeerEntry> {
        std::mem::take(&mut self.peers).into_values().collect()
    }
}
