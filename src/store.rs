//! Application state and the actions that drive the playlist service.
//!
//! Only the session subset (tokens, login flag, user name and avatar) is
//! persisted; playlists and selections live for the lifetime of the store.
use crate::api::PlaylistService;
use crate::db;
use crate::error::{Result, SetlistError};
use crate::models::{PlaylistChanges, PlaylistDetails, PlaylistSummary, Reauth, TokenGrant, Track};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub access_token: String,
    pub expiry: i64,
    pub refresh_token: String,
    pub is_logged_in: bool,
    pub username: String,
    pub avatar_uri: String,
}

#[derive(Debug, Clone, Default)]
pub struct State {
    // User auth
    pub access_token: String,
    /// Access token expiry, ms since epoch.
    pub expiry: i64,
    pub refresh_token: String,
    pub is_logged_in: bool,

    // User details
    pub username: String,
    pub avatar_uri: String,

    pub playlists: Vec<PlaylistSummary>,

    // Playlist currently open
    pub current_playlist: Option<PlaylistDetails>,
    pub current_playlist_tracks: Vec<Track>,
    /// Unavailable entries of the current playlist, not in `current_playlist_tracks`.
    pub current_playlist_hidden: usize,
    /// Positions in `current_playlist_tracks`, in the order they were checked.
    pub checked_tracks: Vec<usize>,

    pub offline: bool,
}

impl State {
    fn from_persisted(p: PersistedSession) -> Self {
        Self {
            access_token: p.access_token,
            expiry: p.expiry,
            refresh_token: p.refresh_token,
            is_logged_in: p.is_logged_in,
            username: p.username,
            avatar_uri: p.avatar_uri,
            ..Self::default()
        }
    }

    pub fn persisted(&self) -> PersistedSession {
        PersistedSession {
            access_token: self.access_token.clone(),
            expiry: self.expiry,
            refresh_token: self.refresh_token.clone(),
            is_logged_in: self.is_logged_in,
            username: self.username.clone(),
            avatar_uri: self.avatar_uri.clone(),
        }
    }
}

pub struct Store {
    api: Arc<dyn PlaylistService>,
    db_path: PathBuf,
    key: String,
    state: State,
}

impl Store {
    /// Open the store, restoring any session saved under `key`.
    pub async fn open(api: Arc<dyn PlaylistService>, db_path: PathBuf, key: &str) -> Result<Self> {
        let path = db_path.clone();
        let k = key.to_string();
        let saved = tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let conn = db::open_or_create(&path)?;
            db::load_session(&conn, &k)
        })
        .await??;
        let state = match saved {
            Some(json) => State::from_persisted(serde_json::from_str(&json)?),
            None => State::default(),
        };
        Ok(Self {
            api,
            db_path,
            key: key.to_string(),
            state,
        })
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn api(&self) -> &Arc<dyn PlaylistService> {
        &self.api
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.is_logged_in
    }

    pub async fn persist(&self) -> Result<()> {
        let json = serde_json::to_string(&self.state.persisted())?;
        let path = self.db_path.clone();
        let key = self.key.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = db::open_or_create(&path)?;
            db::save_session(&conn, &key, &json)
        })
        .await??;
        Ok(())
    }

    // Mutations

    pub fn empty_checked_tracks(&mut self) {
        self.state.checked_tracks.clear();
        for t in &mut self.state.current_playlist_tracks {
            t.checked = false;
        }
    }

    /// Drop everything, including the persisted fields.
    pub fn reset(&mut self) {
        self.state = State::default();
    }

    pub fn set_logged_in(&mut self, logged_in: bool) {
        self.state.is_logged_in = logged_in;
    }

    pub fn set_offline(&mut self, offline: bool) {
        self.state.offline = offline;
    }

    pub fn set_playlist(&mut self, details: PlaylistDetails) {
        self.state.current_playlist = Some(details);
    }

    pub fn set_playlists(&mut self, playlists: Vec<PlaylistSummary>) {
        self.state.playlists = playlists;
    }

    pub fn set_playlist_tracks(&mut self, tracks: Vec<Track>) {
        self.state.current_playlist_tracks = tracks;
        self.state.checked_tracks.clear();
    }

    /// Update the access token and expiry; the refresh token only when given.
    pub fn set_tokens(&mut self, access_token: &str, refresh_token: Option<&str>, expiry: i64) {
        self.state.access_token = access_token.to_string();
        self.state.expiry = expiry;
        if let Some(r) = refresh_token {
            self.state.refresh_token = r.to_string();
        }
    }

    pub fn set_track_checked(&mut self, index: usize, checked: bool) -> Result<()> {
        let len = self.state.current_playlist_tracks.len();
        let track = self
            .state
            .current_playlist_tracks
            .get_mut(index)
            .ok_or(SetlistError::InvalidTrackIndex { index, len })?;
        track.checked = checked;
        let list = &mut self.state.checked_tracks;
        if checked {
            if !list.contains(&index) {
                list.push(index);
            }
        } else {
            list.retain(|&i| i != index);
        }
        Ok(())
    }

    pub fn set_user_avatar(&mut self, uri: &str) {
        self.state.avatar_uri = uri.to_string();
    }

    pub fn set_username(&mut self, username: &str) {
        self.state.username = username.to_string();
    }

    // Actions

    /// Make sure the service holds valid tokens, restoring them from the
    /// saved session when needed.
    pub async fn authenticate(&mut self) -> Result<()> {
        if self.api.is_authenticated().await {
            self.set_logged_in(true);
            return Ok(());
        }
        let (access, refresh, expiry) = (
            self.state.access_token.clone(),
            self.state.refresh_token.clone(),
            self.state.expiry,
        );
        if access.is_empty() || refresh.is_empty() || expiry == 0 {
            return Err(SetlistError::NotAuthenticated);
        }
        if let Reauth::Refreshed {
            access_token,
            expiry_ms,
        } = self.api.set_tokens(&access, &refresh, expiry).await?
        {
            debug!("Stored session token was expired; saving refreshed token");
            self.set_tokens(&access_token, None, expiry_ms);
        }
        self.set_logged_in(true);
        self.update_user_meta().await?;
        self.persist().await
    }

    /// Start a session from a fresh authorization-code grant.
    pub async fn login_with_grant(&mut self, grant: &TokenGrant) -> Result<()> {
        self.set_tokens(&grant.access_token, Some(&grant.refresh_token), grant.expiry_ms);
        if let Reauth::Refreshed {
            access_token,
            expiry_ms,
        } = self
            .api
            .set_tokens(&grant.access_token, &grant.refresh_token, grant.expiry_ms)
            .await?
        {
            self.set_tokens(&access_token, None, expiry_ms);
        }
        self.set_logged_in(true);
        self.update_user_meta().await?;
        self.persist().await?;
        info!("Logged in as {}", self.state.username);
        Ok(())
    }

    pub async fn logout(&mut self) -> Result<()> {
        self.reset();
        let path = self.db_path.clone();
        let key = self.key.clone();
        tokio::task::spawn_blocking(move || -> Result<bool> {
            let conn = db::open_or_create(&path)?;
            db::delete_session(&conn, &key)
        })
        .await??;
        Ok(())
    }

    /// Store the user name and avatar of the logged-in account.
    pub async fn update_user_meta(&mut self) -> Result<()> {
        let me = self.api.get_me().await?;
        let avatar = me.images.first().map(|i| i.url.clone()).unwrap_or_default();
        self.set_user_avatar(&avatar);
        self.set_username(&me.id);
        Ok(())
    }

    pub async fn update_playlists(&mut self) -> Result<&[PlaylistSummary]> {
        let playlists = self.api.get_user_playlists(&self.state.username).await?;
        self.set_playlists(playlists);
        Ok(&self.state.playlists)
    }

    pub async fn get_playlist(&mut self, id: &str) -> Result<()> {
        let playlist = self.api.get_playlist(id).await?;
        self.set_playlist(playlist.details);
        self.set_playlist_tracks(playlist.tracks);
        self.state.current_playlist_hidden = playlist.hidden;
        Ok(())
    }

    fn current_playlist(&self) -> Result<PlaylistDetails> {
        self.state
            .current_playlist
            .clone()
            .ok_or(SetlistError::NoPlaylist)
    }

    pub async fn change_playlist_details(&mut self, changes: &PlaylistChanges) -> Result<()> {
        let current = self.current_playlist()?;
        if changes.is_empty() {
            return Ok(());
        }
        self.api.change_playlist_details(&current.id, changes).await?;
        if let Some(details) = self.state.current_playlist.as_mut() {
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
        }
        Ok(())
    }

    /// Remove the checked tracks from the current playlist. When every entry
    /// is checked (and none is hidden) the playlist is emptied in a single request.
    pub async fn delete_playlist_tracks(&mut self) -> Result<()> {
        let current = self.current_playlist()?;
        if self.state.checked_tracks.is_empty() {
            return Ok(());
        }
        let tracks = &self.state.current_playlist_tracks;
        let snapshot = if self.state.current_playlist_hidden == 0
            && self.state.checked_tracks.len() == tracks.len()
        {
            let snapshot = self.api.delete_all_playlist_tracks(&current.id).await?;
            self.state.current_playlist_tracks.clear();
            snapshot
        } else {
            let mut positions: Vec<usize> = self
                .state
                .checked_tracks
                .iter()
                .map(|&i| tracks[i].index)
                .collect();
            positions.sort_unstable();
            let snapshot = self
                .api
                .delete_playlist_tracks(&current.id, &current.snapshot, &positions)
                .await?;
            let checked = self.state.checked_tracks.clone();
            let mut remaining: Vec<Track> = self
                .state
                .current_playlist_tracks
                .iter()
                .enumerate()
                .filter(|(i, _)| !checked.contains(i))
                .map(|(_, t)| t.clone())
                .collect();
            for t in &mut remaining {
                t.index -= positions.partition_point(|&p| p < t.index);
            }
            self.state.current_playlist_tracks = remaining;
            snapshot
        };
        if let Some(details) = self.state.current_playlist.as_mut() {
            details.snapshot = snapshot;
        }
        self.empty_checked_tracks();
        Ok(())
    }

    /// Move the checked tracks as one block after `place_after` (None = top).
    pub async fn reorder_playlist_tracks(&mut self, place_after: Option<usize>) -> Result<()> {
        let current = self.current_playlist()?;
        if self.state.checked_tracks.is_empty() {
            return Ok(());
        }
        let rewrite = self
            .api
            .reorder_playlist_tracks(
                &current.id,
                &self.state.current_playlist_tracks,
                &self.state.checked_tracks,
                place_after,
                self.state.current_playlist_hidden,
            )
            .await?;
        self.apply_rewrite(rewrite.snapshot_id, rewrite.tracks);
        Ok(())
    }

    pub async fn shuffle_playlist(&mut self) -> Result<()> {
        let current = self.current_playlist()?;
        let rewrite = self
            .api
            .shuffle_playlist(
                &current.id,
                &self.state.current_playlist_tracks,
                self.state.current_playlist_hidden,
            )
            .await?;
        self.apply_rewrite(rewrite.snapshot_id, rewrite.tracks);
        Ok(())
    }

    fn apply_rewrite(&mut self, snapshot: String, tracks: Vec<Track>) {
        if let Some(details) = self.state.current_playlist.as_mut() {
            details.snapshot = snapshot;
        }
        self.set_playlist_tracks(tracks);
    }
}
