//! Manual OAuth login:
//! 1. Build the authorization URL (with a fresh state token, and a PKCE
//!    challenge when no client secret is configured) and print it.
//! 2. The user approves in a browser and gets redirected to the redirect URI.
//! 3. The user pastes the full redirect URL back; we check `state`, pull out
//!    `code` and exchange it for an access + refresh token.
//!
//! No embedded HTTP server is needed.
use super::pkce::PkcePair;
use super::spotify::{basic_auth, now_ms, parse_expires_in};
use crate::config::Config;
use crate::error::{Result, SetlistError};
use crate::models::TokenGrant;
use rand::Rng;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde_json::Value;
use tracing::info;
use url::Url;

const STATE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const STATE_LEN: usize = 12;

pub fn generate_state_token() -> String {
    let mut rng = rand::thread_rng();
    (0..STATE_LEN)
        .map(|_| STATE_CHARS[rng.gen_range(0..STATE_CHARS.len())] as char)
        .collect()
}

pub fn authorize_url(cfg: &Config, state: &str, code_challenge: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/authorize", cfg.auth_base.trim_end_matches('/')))?;
    {
        let mut q = url.query_pairs_mut();
        q.append_pair("client_id", &cfg.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &cfg.redirect_uri)
            .append_pair("state", state)
            .append_pair("scope", &cfg.scopes.join(" "))
            .append_pair("show_dialog", if cfg.show_dialog { "true" } else { "false" });
        if let Some(challenge) = code_challenge {
            q.append_pair("code_challenge_method", "S256")
                .append_pair("code_challenge", challenge);
        }
    }
    Ok(url)
}

/// One login attempt: the URL to open plus what is needed to finish it.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub url: Url,
    pub state: String,
    pub pkce: Option<PkcePair>,
}

impl AuthRequest {
    pub fn new(cfg: &Config) -> Result<Self> {
        let state = generate_state_token();
        let pkce = if cfg.secret().is_some() {
            None
        } else {
            Some(PkcePair::generate())
        };
        let url = authorize_url(cfg, &state, pkce.as_ref().map(|p| p.challenge.as_str()))?;
        Ok(Self { url, state, pkce })
    }
}

/// Extract the authorization code from the redirect URL.
pub fn parse_callback(redirect_url: &str, expected_state: &str) -> Result<String> {
    let parsed = Url::parse(redirect_url.trim())?;
    let param = |name: &str| {
        parsed
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };
    if let Some(err) = param("error") {
        return Err(SetlistError::Callback(err));
    }
    if param("state").as_deref() != Some(expected_state) {
        return Err(SetlistError::Callback("state mismatch".into()));
    }
    param("code").ok_or_else(|| SetlistError::Callback("no code in redirect URL".into()))
}

pub async fn exchange_code(cfg: &Config, code: &str, code_verifier: Option<&str>) -> Result<TokenGrant> {
    let mut params = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", cfg.redirect_uri.as_str()),
        ("client_id", cfg.client_id.as_str()),
    ];
    if let Some(v) = code_verifier {
        params.push(("code_verifier", v));
    }
    let mut req = Client::new().post(cfg.token_url()).form(&params);
    if let Some(secret) = cfg.secret() {
        req = req.header(AUTHORIZATION, basic_auth(&cfg.client_id, secret));
    }
    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(SetlistError::Api {
            context: "token exchange",
            status: status.as_u16(),
            body,
        });
    }
    let j: Value = resp.json().await?;
    let access_token = j["access_token"]
        .as_str()
        .ok_or(SetlistError::FailedToAuthenticate)?
        .to_string();
    let refresh_token = j["refresh_token"]
        .as_str()
        .ok_or(SetlistError::MissingField("refresh_token"))?
        .to_string();
    Ok(TokenGrant {
        access_token,
        refresh_token,
        expiry_ms: now_ms() + parse_expires_in(&j["expires_in"]) * 1000,
    })
}

/// Interactive login on stdin/stdout.
pub async fn run_login(cfg: &Config) -> anyhow::Result<TokenGrant> {
    let request = AuthRequest::new(cfg)?;
    println!(
        "Open this URL in your browser and authorize the application:\n\n{}\n",
        request.url
    );
    println!("After authorizing you'll be redirected to {}. Copy the full redirect URL and paste it here.", cfg.redirect_uri);
    println!("Paste redirect URL:");
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let code = parse_callback(&input, &request.state)?;
    let verifier = request.pkce.as_ref().map(|p| p.verifier.as_str());
    let grant = exchange_code(cfg, &code, verifier).await?;
    info!("Spotify authorization code exchanged");
    Ok(grant)
}
