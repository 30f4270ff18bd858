//! CSV and ZIP export of playlist tracks.
use crate::api::PlaylistService;
use crate::error::{Result, SetlistError};
use crate::models::{Playlist, Track};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use tracing::{debug, info};
use zip::write::{FileOptions, ZipWriter};

/// A file ready to be written or downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub filename: String,
    pub bytes: Vec<u8>,
}

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]+"#).expect("static regex"));

/// Make a playlist or user name usable as a file name.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        "playlist".to_string()
    } else {
        cleaned.to_string()
    }
}

fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// `Position` is the 1-based list position, the same numbering `show` prints
/// and `remove`/`reorder` accept.
pub fn encode_tracks_csv(tracks: &[Track]) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["Position", "Name", "Artists", "Album", "Duration", "Added At", "URI"])?;
    for (pos, t) in tracks.iter().enumerate() {
        wtr.write_record([
            (pos + 1).to_string(),
            t.name.clone(),
            t.artists.join(", "),
            t.album.clone(),
            format_duration(t.duration_ms),
            t.added_at.clone().unwrap_or_default(),
            t.uri.clone().unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    wtr.into_inner()
        .map_err(|e| SetlistError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
}

pub fn export_playlist(name: &str, tracks: &[Track]) -> Result<Export> {
    Ok(Export {
        filename: format!("{}.csv", sanitize_filename(name)),
        bytes: encode_tracks_csv(tracks)?,
    })
}

/// One CSV per playlist inside a ZIP. Duplicate names get a numeric suffix.
pub fn zip_playlists(username: &str, playlists: &[Playlist]) -> Result<Export> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let mut used = std::collections::HashSet::new();
    for pl in playlists {
        let base = sanitize_filename(&pl.details.name);
        let mut name = format!("{}.csv", base);
        let mut n = 2;
        while !used.insert(name.clone()) {
            name = format!("{} ({}).csv", base, n);
            n += 1;
        }
        zip.start_file::<_, ()>(name, FileOptions::default())?;
        zip.write_all(&encode_tracks_csv(&pl.tracks)?)?;
    }
    let cursor = zip.finish()?;
    Ok(Export {
        filename: format!(
            "setlist-{}-{}.zip",
            sanitize_filename(username),
            chrono::Utc::now().format("%Y-%m-%d")
        ),
        bytes: cursor.into_inner(),
    })
}

/// Fetch each playlist in turn and bundle them as a ZIP of CSV files.
pub async fn export_playlists(
    service: &dyn PlaylistService,
    username: &str,
    ids: &[String],
) -> Result<Export> {
    let mut retrieved = Vec::with_capacity(ids.len());
    for id in ids {
        let playlist = service.get_playlist(id).await?;
        debug!("Fetched playlist {} ({} tracks) for export", id, playlist.tracks.len());
        retrieved.push(playlist);
    }
    let username = username.to_string();
    let export = tokio::task::spawn_blocking(move || zip_playlists(&username, &retrieved)).await??;
    info!("Exported {} playlist(s) to {}", ids.len(), export.filename);
    Ok(export)
}
