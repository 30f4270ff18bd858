use super::PlaylistService;
use crate::config::Config;
use crate::error::{Result, SetlistError};
use crate::models::{Playlist, PlaylistChanges, PlaylistDetails, PlaylistSummary, Reauth, UserProfile};
use crate::throttle::Throttler;
use crate::transform;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use log::{debug, warn};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Spotify rejects cover uploads above this size (base64 payload).
pub const MAX_COVER_ART_BYTES: usize = 256 * 1024;

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn basic_auth(client_id: &str, client_secret: &str) -> String {
    format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!("{}:{}", client_id, client_secret))
    )
}

/// `expires_in` arrives as a number from Spotify but as a string from some proxies.
pub(crate) fn parse_expires_in(v: &Value) -> i64 {
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
        .unwrap_or(3600)
}

/// Base64 payload for the cover upload endpoint, from raw JPEG bytes.
pub fn cover_art_from_jpeg(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Strip an optional `data:...;base64,` prefix and validate the JPEG payload.
pub fn cover_art_payload(art: &str) -> Result<String> {
    let b64 = art.split_once(',').map(|(_, b)| b).unwrap_or(art).trim();
    if b64.is_empty() {
        return Err(SetlistError::InvalidCoverArt("empty image".into()));
    }
    if b64.len() > MAX_COVER_ART_BYTES {
        return Err(SetlistError::InvalidCoverArt(format!(
            "{} bytes exceeds the {} byte limit",
            b64.len(),
            MAX_COVER_ART_BYTES
        )));
    }
    let raw = general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| SetlistError::InvalidCoverArt(e.to_string()))?;
    if !raw.starts_with(&[0xFF, 0xD8]) {
        return Err(SetlistError::InvalidCoverArt("not a JPEG image".into()));
    }
    Ok(b64.to_string())
}

fn snapshot_of(v: &Value) -> Result<String> {
    v["snapshot_id"]
        .as_str()
        .map(String::from)
        .ok_or(SetlistError::MissingField("snapshot_id"))
}

#[derive(Debug, Clone, Default)]
struct TokenState {
    access_token: String,
    refresh_token: String,
    expiry_ms: i64,
}

/// Client for the Spotify Web API.
///
/// Every call checks the access token first (refreshing it when expired) and
/// then goes through the shared throttler, so requests leave one at a time at
/// the configured rate. List endpoints are followed via their `next` cursor;
/// mutations are split into batches of at most `max_batch_size` items.
pub struct SpotifyClient {
    client: Client,
    api_base: String,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
    throttler: Throttler,
    max_batch_size: usize,
    track_page_size: usize,
    playlist_page_size: usize,
    token: tokio::sync::Mutex<TokenState>,
}

impl SpotifyClient {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            token_url: cfg.token_url(),
            client_id: cfg.client_id.clone(),
            client_secret: cfg.secret().map(String::from),
            throttler: Throttler::new(cfg.requests_per_second),
            max_batch_size: cfg.max_batch_size.clamp(1, crate::config::API_BATCH_LIMIT),
            track_page_size: cfg.track_page_size,
            playlist_page_size: cfg.playlist_page_size,
            token: tokio::sync::Mutex::new(TokenState::default()),
        }
    }

    pub async fn authenticated(&self) -> bool {
        let tok = self.token.lock().await;
        !tok.refresh_token.is_empty() && tok.expiry_ms != 0
    }

    /// Current access token and its expiry (ms since epoch).
    pub async fn access_token(&self) -> (String, i64) {
        let tok = self.token.lock().await;
        (tok.access_token.clone(), tok.expiry_ms)
    }

    /// Refresh the access token if it has expired.
    pub async fn reauth(&self) -> Result<Reauth> {
        let mut tok = self.token.lock().await;
        if now_ms() < tok.expiry_ms {
            return Ok(Reauth::StillValid);
        }
        if tok.refresh_token.is_empty() {
            return Err(SetlistError::NotAuthenticated);
        }
        debug!("Spotify access token expired, refreshing");

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", tok.refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
        ];
        let mut req = self.client.post(&self.token_url).form(&params);
        if let Some(secret) = &self.client_secret {
            req = req.header(AUTHORIZATION, basic_auth(&self.client_id, secret));
        }
        let resp = self.throttler.add(req.send()).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Spotify token refresh rejected: {} => {}", status, body);
            return Err(SetlistError::Api {
                context: "token refresh",
                status: status.as_u16(),
                body,
            });
        }
        let j: Value = resp.json().await?;
        let access_token = j["access_token"]
            .as_str()
            .ok_or(SetlistError::FailedToAuthenticate)?
            .to_string();
        let expiry_ms = now_ms() + parse_expires_in(&j["expires_in"]) * 1000;
        tok.access_token = access_token.clone();
        tok.expiry_ms = expiry_ms;
        if let Some(rotated) = j["refresh_token"].as_str() {
            tok.refresh_token = rotated.to_string();
        }
        Ok(Reauth::Refreshed {
            access_token,
            expiry_ms,
        })
    }

    pub async fn set_tokens(&self, access: &str, refresh: &str, expiry_ms: i64) -> Result<Reauth> {
        if expiry_ms == 0 {
            return Err(SetlistError::InvalidExpiry);
        }
        {
            let mut tok = self.token.lock().await;
            tok.refresh_token = refresh.to_string();
            tok.expiry_ms = expiry_ms;
        }
        let outcome = self.reauth().await?;
        if !outcome.expired() {
            self.token.lock().await.access_token = access.to_string();
        }
        Ok(outcome)
    }

    async fn read_json(context: &'static str, resp: Response) -> Result<Value> {
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            warn!("{} was rate limited (retry-after {:?})", context, retry_after);
            return Err(SetlistError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SetlistError::Api {
                context,
                status: status.as_u16(),
                body,
            });
        }
        let bytes = resp.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Authorize and send one throttled request.
    async fn send(&self, context: &'static str, req: RequestBuilder) -> Result<Value> {
        self.reauth().await?;
        let bearer = format!("Bearer {}", self.token.lock().await.access_token);
        let resp = self
            .throttler
            .add(req.header(AUTHORIZATION, bearer).send())
            .await?;
        Self::read_json(context, resp).await
    }

    /// Follow `next` from `first_url` until it is null, collecting every item.
    async fn collect_pages(&self, context: &'static str, first_url: String) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut next = Some(first_url);
        while let Some(url) = next {
            let mut page = self.send(context, self.client.get(&url)).await?;
            if let Some(Value::Array(batch)) = page.get_mut("items").map(Value::take) {
                items.extend(batch);
            }
            next = page["next"].as_str().map(String::from);
            debug!("{}: {} item(s) so far, more pages: {}", context, items.len(), next.is_some());
        }
        Ok(items)
    }

    fn playlist_url(&self, id: &str) -> String {
        format!("{}/playlists/{}", self.api_base, id)
    }

    fn tracks_url(&self, id: &str) -> String {
        format!("{}/playlists/{}/tracks", self.api_base, id)
    }

    pub async fn get_me(&self) -> Result<UserProfile> {
        let j = self
            .send("get profile", self.client.get(format!("{}/me", self.api_base)))
            .await?;
        Ok(serde_json::from_value(j)?)
    }

    /// Every track of the playlist plus the number of unavailable entries.
    pub async fn get_playlist_tracks(&self, id: &str) -> Result<(Vec<crate::models::Track>, usize)> {
        let first = format!("{}?offset=0&limit={}", self.tracks_url(id), self.track_page_size);
        let items = self.collect_pages("list playlist tracks", first).await?;
        let tracks = transform::decode_playlist_tracks(&items);
        let hidden = items.len() - tracks.len();
        if hidden > 0 {
            debug!("Playlist {} has {} unavailable entries", id, hidden);
        }
        Ok((tracks, hidden))
    }

    pub async fn get_playlist(&self, id: &str) -> Result<Playlist> {
        let body = self
            .send("get playlist", self.client.get(self.playlist_url(id)))
            .await?;
        let (tracks, hidden) = self.get_playlist_tracks(id).await?;
        let details = PlaylistDetails {
            id: id.to_string(),
            name: body["name"].as_str().unwrap_or("").to_string(),
            desc: body["description"].as_str().map(String::from),
            art: transform::decode_images(&body["images"]),
            is_collab: body["collaborative"].as_bool().unwrap_or(false),
            is_public: body["public"].as_bool() == Some(true),
            snapshot: body["snapshot_id"].as_str().unwrap_or("").to_string(),
        };
        Ok(Playlist { details, tracks, hidden })
    }

    pub async fn get_user_playlists(&self, username: &str) -> Result<Vec<PlaylistSummary>> {
        let first = format!(
            "{}/me/playlists?offset=0&limit={}",
            self.api_base, self.playlist_page_size
        );
        let all = self.collect_pages("list playlists", first).await?;
        Ok(transform::filter_user_playlists(&all, username))
    }

    pub async fn add_tracks(&self, id: &str, uris: &[String]) -> Result<Option<String>> {
        let mut snapshot = None;
        for chunk in uris.chunks(self.max_batch_size) {
            let resp = self
                .send(
                    "add tracks",
                    self.client.post(self.tracks_url(id)).json(&json!({ "uris": chunk })),
                )
                .await?;
            snapshot = Some(snapshot_of(&resp)?);
        }
        debug!("Added {} track(s) to playlist {}", uris.len(), id);
        Ok(snapshot)
    }

    pub async fn delete_all_playlist_tracks(&self, id: &str) -> Result<String> {
        let resp = self
            .send(
                "clear playlist",
                self.client.put(self.tracks_url(id)).json(&json!({ "uris": [] })),
            )
            .await?;
        snapshot_of(&resp)
    }

    pub async fn delete_playlist_tracks(&self, id: &str, snapshot: &str, positions: &[usize]) -> Result<String> {
        // Highest positions first: removing them never shifts a pending lower one.
        let ordered: Vec<usize> = positions
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .rev()
            .collect();
        let mut snapshot = snapshot.to_string();
        for chunk in ordered.chunks(self.max_batch_size) {
            let body = json!({ "positions": chunk, "snapshot_id": snapshot });
            let resp = self
                .send("remove tracks", self.client.delete(self.tracks_url(id)).json(&body))
                .await?;
            snapshot = snapshot_of(&resp)?;
        }
        Ok(snapshot)
    }

    pub async fn change_playlist_details(&self, id: &str, changes: &PlaylistChanges) -> Result<()> {
        if let Some(art) = &changes.art {
            let payload = cover_art_payload(art)?;
            self.send(
                "upload cover art",
                self.client
                    .put(format!("{}/images", self.playlist_url(id)))
                    .header(CONTENT_TYPE, "image/jpeg")
                    .body(payload),
            )
            .await?;
        }
        if changes.has_metadata() {
            let mut body = serde_json::Map::new();
            if let Some(name) = &changes.name {
                body.insert("name".into(), json!(name));
            }
            if let Some(desc) = &changes.description {
                body.insert("description".into(), json!(desc));
            }
            if let Some(public) = changes.public {
                body.insert("public".into(), json!(public));
            }
            if let Some(collab) = changes.collaborative {
                body.insert("collaborative".into(), json!(collab));
            }
            self.send(
                "change playlist details",
                self.client.put(self.playlist_url(id)).json(&Value::Object(body)),
            )
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PlaylistService for SpotifyClient {
    async fn is_authenticated(&self) -> bool {
        self.authenticated().await
    }
    async fn set_tokens(&self, access: &str, refresh: &str, expiry_ms: i64) -> Result<Reauth> {
        SpotifyClient::set_tokens(self, access, refresh, expiry_ms).await
    }
    async fn get_me(&self) -> Result<UserProfile> {
        SpotifyClient::get_me(self).await
    }
    async fn get_playlist(&self, id: &str) -> Result<Playlist> {
        SpotifyClient::get_playlist(self, id).await
    }
    async fn get_user_playlists(&self, username: &str) -> Result<Vec<PlaylistSummary>> {
        SpotifyClient::get_user_playlists(self, username).await
    }
    async fn add_tracks(&self, id: &str, uris: &[String]) -> Result<Option<String>> {
        SpotifyClient::add_tracks(self, id, uris).await
    }
    async fn delete_all_playlist_tracks(&self, id: &str) -> Result<String> {
        SpotifyClient::delete_all_playlist_tracks(self, id).await
    }
    async fn delete_playlist_tracks(&self, id: &str, snapshot: &str, positions: &[usize]) -> Result<String> {
        SpotifyClient::delete_playlist_tracks(self, id, snapshot, positions).await
    }
    async fn change_playlist_details(&self, id: &str, changes: &PlaylistChanges) -> Result<()> {
        SpotifyClient::change_playlist_details(self, id, changes).await
    }
}
