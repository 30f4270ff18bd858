//! Pure transforms over track and playlist lists.
use crate::error::{Result, SetlistError};
use crate::models::{Image, PlaylistSummary, Track};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;
use std::collections::BTreeSet;

pub(crate) fn decode_images(v: &Value) -> Vec<Image> {
    v.as_array()
        .map(|a| {
            a.iter()
                .filter_map(|img| serde_json::from_value::<Image>(img.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Simplify raw playlist paging items into `Track`s.
///
/// Items whose `track` is null (removed from the catalogue) are skipped, but
/// every decoded track keeps its absolute position so positional deletes stay
/// correct.
pub fn decode_playlist_tracks(items: &[Value]) -> Vec<Track> {
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let t = &item["track"];
            if !t.is_object() {
                return None;
            }
            let artists = t["artists"]
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|ar| ar["name"].as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            Some(Track {
                index,
                id: t["id"].as_str().map(String::from),
                uri: t["uri"].as_str().map(String::from),
                name: t["name"].as_str().unwrap_or("").to_string(),
                artists,
                album: t["album"]["name"].as_str().unwrap_or("").to_string(),
                duration_ms: t["duration_ms"].as_u64().unwrap_or(0),
                added_at: item["added_at"].as_str().map(String::from),
                is_local: item["is_local"].as_bool().unwrap_or(false)
                    || t["is_local"].as_bool().unwrap_or(false),
                checked: false,
            })
        })
        .collect()
}

/// Keep only playlists owned by `username`.
pub fn filter_user_playlists(playlists: &[Value], username: &str) -> Vec<PlaylistSummary> {
    playlists
        .iter()
        .filter(|pl| pl["owner"]["id"].as_str() == Some(username))
        .map(|pl| PlaylistSummary {
            id: pl["id"].as_str().unwrap_or("").to_string(),
            name: pl["name"].as_str().unwrap_or("").to_string(),
            owner: username.to_string(),
            // newer API revisions report the count under `items`
            track_count: pl["tracks"]["total"]
                .as_u64()
                .or_else(|| pl["items"]["total"].as_u64())
                .unwrap_or(0),
            art: decode_images(&pl["images"]),
            is_public: pl["public"].as_bool() == Some(true),
            is_collab: pl["collaborative"].as_bool().unwrap_or(false),
            snapshot: pl["snapshot_id"].as_str().unwrap_or("").to_string(),
        })
        .collect()
}

fn reindex(tracks: &mut [Track]) {
    for (i, t) in tracks.iter_mut().enumerate() {
        t.index = i;
        t.checked = false;
    }
}

/// Move the tracks at `to_reorder` (list positions) as one contiguous block so
/// it starts right after the track currently at `place_after`. `None` places
/// the block at the start. The moved tracks keep their relative order.
pub fn reorder_tracks(
    tracks: &[Track],
    to_reorder: &[usize],
    place_after: Option<usize>,
) -> Result<Vec<Track>> {
    let len = tracks.len();
    let selected: BTreeSet<usize> = to_reorder.iter().copied().collect();
    if let Some(&index) = selected.iter().find(|&&i| i >= len) {
        return Err(SetlistError::InvalidTrackIndex { index, len });
    }
    if let Some(index) = place_after.filter(|&i| i >= len) {
        return Err(SetlistError::InvalidTrackIndex { index, len });
    }

    let mut moved = Vec::with_capacity(selected.len());
    let mut rest = Vec::with_capacity(len - selected.len());
    let mut insert_at = 0;
    for (i, t) in tracks.iter().enumerate() {
        if selected.contains(&i) {
            moved.push(t.clone());
        } else {
            if place_after.map_or(false, |p| i <= p) {
                insert_at += 1;
            }
            rest.push(t.clone());
        }
    }

    let mut out: Vec<Track> = rest.drain(..insert_at).collect();
    out.extend(moved);
    out.extend(rest);
    reindex(&mut out);
    Ok(out)
}

/// Randomize track order (Fisher-Yates) and re-index.
pub fn shuffle_tracks<R: Rng + ?Sized>(tracks: &[Track], rng: &mut R) -> Vec<Track> {
    let mut out = tracks.to_vec();
    out.shuffle(rng);
    reindex(&mut out);
    out
}

/// URIs to re-add after a rewrite. Fails if any entry cannot be re-added,
/// hidden ones included, since the playlist is emptied first.
pub fn rewrite_uris(tracks: &[Track], hidden: usize) -> Result<Vec<String>> {
    let unmovable = tracks.iter().filter(|t| !t.is_addable()).count() + hidden;
    if unmovable > 0 {
        return Err(SetlistError::UnmovableTracks(unmovable));
    }
    Ok(tracks.iter().filter_map(|t| t.uri.clone()).collect())
}
