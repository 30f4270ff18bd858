use super::PlaylistService;
use crate::error::{Result, SetlistError};
use crate::models::{Playlist, PlaylistChanges, PlaylistDetails, PlaylistSummary, Reauth, Track, UserProfile};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// In-memory stand-in for the Spotify API, used in tests and offline runs.
/// Playlists are stored as URI lists; every mutation bumps the snapshot id.
/// An empty URI stands for an entry whose track is no longer available.
pub struct MockService {
    user: UserProfile,
    inner: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    authenticated: bool,
    /// Returned by `set_tokens` when the supplied expiry is in the past.
    refreshed_token: Option<(String, i64)>,
    playlists: HashMap<String, (PlaylistDetails, Vec<String>)>,
    snapshot_seq: u64,
    /// Sizes of every add/remove request, in call order.
    batches: Vec<(String, usize)>,
}

fn not_found(id: &str) -> SetlistError {
    SetlistError::Api {
        context: "mock",
        status: 404,
        body: format!("no playlist {}", id),
    }
}

fn track_for(index: usize, uri: &str) -> Track {
    Track {
        index,
        id: uri.rsplit(':').next().map(String::from),
        uri: Some(uri.to_string()),
        name: format!("Track {}", uri),
        artists: vec!["Mock Artist".into()],
        album: "Mock Album".into(),
        duration_ms: 180_000,
        added_at: None,
        is_local: uri.starts_with("spotify:local:"),
        checked: false,
    }
}

impl MockService {
    pub fn new(username: &str) -> Self {
        Self {
            user: UserProfile {
                id: username.to_string(),
                display_name: Some(username.to_string()),
                images: vec![crate::models::Image {
                    url: format!("https://img.example/{}.jpg", username),
                    height: None,
                    width: None,
                }],
            },
            inner: Mutex::new(MockState::default()),
        }
    }

    /// Make the next `set_tokens` with an expired expiry report this refreshed token.
    pub fn with_refreshed_token(self, token: &str, expiry_ms: i64) -> Self {
        self.state().refreshed_token = Some((token.to_string(), expiry_ms));
        self
    }

    pub fn insert_playlist(&self, id: &str, name: &str, uris: &[&str]) {
        let mut st = self.state();
        let details = PlaylistDetails {
            id: id.to_string(),
            name: name.to_string(),
            desc: None,
            art: Vec::new(),
            is_collab: false,
            is_public: false,
            snapshot: "snap-0".into(),
        };
        st.playlists
            .insert(id.to_string(), (details, uris.iter().map(|u| u.to_string()).collect()));
    }

    pub fn uris(&self, id: &str) -> Vec<String> {
        self.state()
            .playlists
            .get(id)
            .map(|(_, u)| u.clone())
            .unwrap_or_default()
    }

    pub fn details(&self, id: &str) -> Option<PlaylistDetails> {
        self.state().playlists.get(id).map(|(d, _)| d.clone())
    }

    pub fn batches(&self) -> Vec<(String, usize)> {
        self.state().batches.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mutate<F>(&self, id: &str, f: F) -> Result<String>
    where
        F: FnOnce(&mut Vec<String>),
    {
        let mut st = self.state();
        st.snapshot_seq += 1;
        let snapshot = format!("snap-{}", st.snapshot_seq);
        let (details, uris) = st.playlists.get_mut(id).ok_or_else(|| not_found(id))?;
        f(uris);
        details.snapshot = snapshot.clone();
        Ok(snapshot)
    }
}

#[async_trait]
impl PlaylistService for MockService {
    async fn is_authenticated(&self) -> bool {
        self.state().authenticated
    }

    async fn set_tokens(&self, _access: &str, _refresh: &str, expiry_ms: i64) -> Result<Reauth> {
        if expiry_ms == 0 {
            return Err(SetlistError::InvalidExpiry);
        }
        let mut st = self.state();
        st.authenticated = true;
        if expiry_ms <= crate::api::spotify::now_ms() {
            let (access_token, expiry_ms) = st
                .refreshed_token
                .clone()
                .ok_or(SetlistError::FailedToAuthenticate)?;
            return Ok(Reauth::Refreshed { access_token, expiry_ms });
        }
        Ok(Reauth::StillValid)
    }

    async fn get_me(&self) -> Result<UserProfile> {
        Ok(self.user.clone())
    }

    async fn get_playlist(&self, id: &str) -> Result<Playlist> {
        let st = self.state();
        let (details, uris) = st.playlists.get(id).ok_or_else(|| not_found(id))?;
        let tracks: Vec<Track> = uris
            .iter()
            .enumerate()
            .filter(|(_, u)| !u.is_empty())
            .map(|(i, u)| track_for(i, u))
            .collect();
        Ok(Playlist {
            details: details.clone(),
            hidden: uris.len() - tracks.len(),
            tracks,
        })
    }

    async fn get_user_playlists(&self, username: &str) -> Result<Vec<PlaylistSummary>> {
        let st = self.state();
        let mut out: Vec<PlaylistSummary> = st
            .playlists
            .values()
            .map(|(d, uris)| PlaylistSummary {
                id: d.id.clone(),
                name: d.name.clone(),
                owner: username.to_string(),
                track_count: uris.len() as u64,
                art: d.art.clone(),
                is_public: d.is_public,
                is_collab: d.is_collab,
                snapshot: d.snapshot.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn add_tracks(&self, id: &str, uris: &[String]) -> Result<Option<String>> {
        let mut snapshot = None;
        for chunk in uris.chunks(crate::config::API_BATCH_LIMIT) {
            self.state().batches.push(("add".into(), chunk.len()));
            snapshot = Some(self.mutate(id, |list| list.extend(chunk.iter().cloned()))?);
        }
        info!("MockService: add_tracks {} -> {} tracks", id, uris.len());
        Ok(snapshot)
    }

    async fn delete_all_playlist_tracks(&self, id: &str) -> Result<String> {
        self.mutate(id, |list| list.clear())
    }

    async fn delete_playlist_tracks(&self, id: &str, snapshot: &str, positions: &[usize]) -> Result<String> {
        let mut ordered: Vec<usize> = positions.to_vec();
        ordered.sort_unstable_by(|a, b| b.cmp(a));
        ordered.dedup();
        let mut last = snapshot.to_string();
        for chunk in ordered.chunks(crate::config::API_BATCH_LIMIT) {
            self.state().batches.push(("remove".into(), chunk.len()));
            last = self.mutate(id, |list| {
                for &p in chunk {
                    if p < list.len() {
                        list.remove(p);
                    }
                }
            })?;
        }
        Ok(last)
    }

    async fn change_playlist_details(&self, id: &str, changes: &PlaylistChanges) -> Result<()> {
        let mut st = self.state();
        let (details, _) = st.playlists.get_mut(id).ok_or_else(|| not_found(id))?;
        if let Some(n) = &changes.name {
            details.name = n.clone();
        }
        if let Some(d) = &changes.description {
            details.desc = Some(d.clone());
        }
        if let Some(p) = changes.public {
            details.is_public = p;
        }
        if let Some(c) = changes.collaborative {
            details.is_collab = c;
        }
        Ok(())
    }
}
