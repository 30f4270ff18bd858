use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

/// A playlist entry, simplified from the API's paging item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Absolute position in the playlist.
    pub index: usize,
    pub id: Option<String>,
    pub uri: Option<String>,
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub duration_ms: u64,
    pub added_at: Option<String>,
    pub is_local: bool,
    #[serde(default)]
    pub checked: bool,
}

impl Track {
    /// Local files and unavailable entries cannot be sent back to the add endpoint.
    pub fn is_addable(&self) -> bool {
        !self.is_local && self.uri.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistDetails {
    pub id: String,
    pub name: String,
    pub desc: Option<String>,
    pub art: Vec<Image>,
    pub is_collab: bool,
    pub is_public: bool,
    pub snapshot: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    pub details: PlaylistDetails,
    pub tracks: Vec<Track>,
    /// Entries the API returned without a track (removed from the catalogue).
    /// They still occupy positions in the remote playlist.
    pub hidden: usize,
}

/// Entry of the user's playlist library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub track_count: u64,
    pub art: Vec<Image>,
    pub is_public: bool,
    pub is_collab: bool,
    pub snapshot: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// Requested playlist edits. Every field is optional; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaylistChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub public: Option<bool>,
    pub collaborative: Option<bool>,
    /// JPEG cover as a `data:image/jpeg;base64,...` URL or bare base64.
    pub art: Option<String>,
}

impl PlaylistChanges {
    pub fn has_metadata(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.public.is_some()
            || self.collaborative.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_metadata() && self.art.is_none()
    }
}

/// Outcome of a token check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reauth {
    StillValid,
    Refreshed { access_token: String, expiry_ms: i64 },
}

impl Reauth {
    pub fn expired(&self) -> bool {
        matches!(self, Reauth::Refreshed { .. })
    }
}

/// Tokens returned by the authorization-code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Milliseconds since the Unix epoch.
    pub expiry_ms: i64,
}

/// Result of a delete-then-re-add rewrite (reorder, shuffle).
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistRewrite {
    pub snapshot_id: String,
    pub tracks: Vec<Track>,
}
