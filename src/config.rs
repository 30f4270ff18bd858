use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::path::PathBuf;

/// Spotify accepts at most this many items per playlist mutation request.
pub const API_BATCH_LIMIT: usize = 100;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub client_id: String,
    /// Optional. Without a secret the login flow uses PKCE.
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_auth_base")]
    pub auth_base: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Endpoint used for refresh_token grants. Falls back to `{auth_base}/api/token`,
    /// but may point at a proxy that holds the client secret.
    #[serde(default)]
    pub token_refresh_url: Option<String>,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub show_dialog: bool,

    // Request pacing and batching
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_track_page_size")]
    pub track_page_size: usize,
    #[serde(default = "default_playlist_page_size")]
    pub playlist_page_size: usize,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Key under which the persisted session lives in the database.
    #[serde(default = "default_session_key")]
    pub session_key: String,
}

fn default_redirect_uri() -> String { "http://127.0.0.1:8888/callback".into() }
fn default_auth_base() -> String { "https://accounts.spotify.com".into() }
fn default_api_base() -> String { "https://api.spotify.com/v1".into() }
fn default_requests_per_second() -> u32 { 5 }
fn default_max_batch_size() -> usize { API_BATCH_LIMIT }
fn default_track_page_size() -> usize { 100 }
fn default_playlist_page_size() -> usize { 50 }
fn default_session_key() -> String { "setlist".into() }

fn default_scopes() -> Vec<String> {
    vec![
        "playlist-modify-private",
        "playlist-modify-public",
        "playlist-read-collaborative",
        "playlist-read-private",
        "ugc-image-upload",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("setlist")
}

fn default_db_path() -> PathBuf { data_dir().join("setlist.db") }
fn default_log_dir() -> PathBuf { data_dir().join("logs") }

impl Config {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: Config = toml::from_str(s).context("parsing config TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(anyhow!("client_id must not be empty"));
        }
        if self.max_batch_size == 0 || self.max_batch_size > API_BATCH_LIMIT {
            return Err(anyhow!(
                "max_batch_size must be between 1 and {}, got {}",
                API_BATCH_LIMIT,
                self.max_batch_size
            ));
        }
        if self.track_page_size == 0 || self.track_page_size > 100 {
            return Err(anyhow!("track_page_size must be between 1 and 100"));
        }
        if self.playlist_page_size == 0 || self.playlist_page_size > 50 {
            return Err(anyhow!("playlist_page_size must be between 1 and 50"));
        }
        Ok(())
    }

    pub fn token_url(&self) -> String {
        match &self.token_refresh_url {
            Some(u) if !u.trim().is_empty() => u.clone(),
            _ => format!("{}/api/token", self.auth_base.trim_end_matches('/')),
        }
    }

    /// Secret, if one is configured and non-empty.
    pub fn secret(&self) -> Option<&str> {
        self.client_secret.as_deref().filter(|s| !s.trim().is_empty())
    }
}
