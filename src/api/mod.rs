pub mod mock;
pub mod pkce;
pub mod spotify;
pub mod spotify_auth;

use crate::error::Result;
use crate::models::{Playlist, PlaylistChanges, PlaylistRewrite, PlaylistSummary, Reauth, Track, UserProfile};
use crate::transform;

/// Playlist operations the store needs from the remote service.
/// Implementations: spotify::SpotifyClient and mock::MockService.
#[async_trait::async_trait]
pub trait PlaylistService: Send + Sync {
    /// True once a refresh token and an expiry are known.
    async fn is_authenticated(&self) -> bool;

    /// Install tokens (expiry in ms since epoch), refreshing if already expired.
    async fn set_tokens(&self, access: &str, refresh: &str, expiry_ms: i64) -> Result<Reauth>;

    async fn get_me(&self) -> Result<UserProfile>;

    /// Playlist details plus every track.
    async fn get_playlist(&self, id: &str) -> Result<Playlist>;

    /// Playlists in the current user's library owned by `username`.
    async fn get_user_playlists(&self, username: &str) -> Result<Vec<PlaylistSummary>>;

    /// Append tracks in batches. Returns the last snapshot id, None if nothing was sent.
    async fn add_tracks(&self, id: &str, uris: &[String]) -> Result<Option<String>>;

    async fn delete_all_playlist_tracks(&self, id: &str) -> Result<String>;

    /// Remove tracks at the given absolute positions, starting from `snapshot`.
    async fn delete_playlist_tracks(&self, id: &str, snapshot: &str, positions: &[usize]) -> Result<String>;

    async fn change_playlist_details(&self, id: &str, changes: &PlaylistChanges) -> Result<()>;

    /// Empty the playlist and re-add `tracks` in order. `hidden` is the number
    /// of unavailable entries the playlist also holds; any makes this fail.
    async fn rewrite_playlist(&self, id: &str, tracks: Vec<Track>, hidden: usize) -> Result<PlaylistRewrite> {
        let uris = transform::rewrite_uris(&tracks, hidden)?;
        let cleared = self.delete_all_playlist_tracks(id).await?;
        let snapshot_id = self.add_tracks(id, &uris).await?.unwrap_or(cleared);
        Ok(PlaylistRewrite { snapshot_id, tracks })
    }

    /// Move `to_reorder` (list positions) as one block after `place_after`.
    async fn reorder_playlist_tracks(
        &self,
        id: &str,
        tracks: &[Track],
        to_reorder: &[usize],
        place_after: Option<usize>,
        hidden: usize,
    ) -> Result<PlaylistRewrite> {
        let reordered = transform::reorder_tracks(tracks, to_reorder, place_after)?;
        self.rewrite_playlist(id, reordered, hidden).await
    }

    async fn shuffle_playlist(&self, id: &str, tracks: &[Track], hidden: usize) -> Result<PlaylistRewrite> {
        let shuffled = {
            let mut rng = rand::thread_rng();
            transform::shuffle_tracks(tracks, &mut rng)
        };
        self.rewrite_playlist(id, shuffled, hidden).await
    }
}
