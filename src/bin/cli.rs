use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use setlist as lib;
use lib::api::spotify::{cover_art_from_jpeg, SpotifyClient};
use lib::api::spotify_auth::{self, AuthRequest};
use lib::api::PlaylistService;
use lib::config::Config;
use lib::models::PlaylistChanges;
use lib::store::Store;
use lib::SetlistError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "setlist", version, about = "Manage Spotify playlists in bulk")]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize with Spotify and save the session (interactive)
    Login,
    /// Forget the saved session
    Logout,
    /// Print an authorization URL without completing the login
    AuthUrl,
    /// Show the logged-in user
    Whoami,
    /// List playlists you own
    Playlists,
    /// Show a playlist and its tracks
    Show { id: String },
    /// Append tracks (Spotify URIs) to a playlist
    Add {
        id: String,
        #[arg(required = true)]
        uris: Vec<String>,
    },
    /// Remove tracks by position (1-based, as shown by `show`)
    Remove {
        id: String,
        #[arg(long, value_delimiter = ',', required_unless_present = "all")]
        positions: Vec<usize>,
        /// Remove every track
        #[arg(long, conflicts_with = "positions")]
        all: bool,
    },
    /// Move tracks as one block after another track
    Reorder {
        id: String,
        /// Positions to move (1-based)
        #[arg(long, value_delimiter = ',', required = true)]
        tracks: Vec<usize>,
        /// Place the block after this position (1-based)
        #[arg(long, required_unless_present = "to_top")]
        after: Option<usize>,
        /// Place the block at the top of the playlist
        #[arg(long, conflicts_with = "after")]
        to_top: bool,
    },
    /// Randomize track order
    Shuffle { id: String },
    /// Change playlist name, description, visibility or cover
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        public: Option<bool>,
        #[arg(long)]
        collaborative: Option<bool>,
        /// JPEG file to upload as the cover
        #[arg(long, value_name = "FILE")]
        cover: Option<PathBuf>,
    },
    /// Export a playlist's tracks as CSV
    Export {
        id: String,
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Export several playlists (default: all you own) as a ZIP of CSV files
    ExportAll {
        ids: Vec<String>,
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Validate config file and exit
    ConfigValidate,
}

fn resolve_config_path(explicit: &Option<PathBuf>) -> PathBuf {
    if let Some(p) = explicit {
        return p.clone();
    }
    if let Some(user) = dirs::config_dir().map(|d| d.join("setlist").join("config.toml")) {
        if user.exists() {
            return user;
        }
    }
    PathBuf::from("config/setlist.toml")
}

/// Gate for every command that talks to the API.
async fn require_auth(store: &mut Store) -> Result<()> {
    match store.authenticate().await {
        Ok(()) => Ok(()),
        Err(SetlistError::NotAuthenticated) => Err(anyhow!("not logged in; run `setlist login` first")),
        Err(e) => Err(anyhow::Error::new(e).context("restoring saved session")),
    }
}

fn to_zero_based(positions: &[usize]) -> Result<Vec<usize>> {
    positions
        .iter()
        .map(|&p| p.checked_sub(1).ok_or_else(|| anyhow!("positions start at 1")))
        .collect()
}

fn write_export(export: &lib::export::Export, out: Option<PathBuf>) -> Result<PathBuf> {
    let path = out.unwrap_or_else(|| PathBuf::from(&export.filename));
    std::fs::write(&path, &export.bytes).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn print_tracks(store: &Store) {
    let st = store.state();
    if let Some(pl) = &st.current_playlist {
        println!("{} ({})", pl.name, pl.id);
        if let Some(desc) = pl.desc.as_deref().filter(|d| !d.is_empty()) {
            println!("{}", desc);
        }
        println!(
            "public: {} | collaborative: {} | snapshot: {}",
            pl.is_public, pl.is_collab, pl.snapshot
        );
    }
    for (pos, t) in st.current_playlist_tracks.iter().enumerate() {
        println!(
            "{:>4}. {} - {}{}",
            pos + 1,
            t.artists.join(", "),
            t.name,
            if t.is_local { " [local]" } else { "" }
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(&cli.config);

    if let Commands::ConfigValidate = cli.command {
        match Config::from_path(&config_path) {
            Ok(_) => println!("OK"),
            Err(e) => {
                eprintln!("Config validation failed: {:#}", e);
                std::process::exit(2);
            }
        }
        return Ok(());
    }

    let cfg = Config::from_path(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    // Logs go to stderr and a daily-rotated file in cfg.log_dir; the `log`
    // macros used by the API client are bridged into tracing.
    let _ = LogTracer::init();
    std::fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("creating log dir {}", cfg.log_dir.display()))?;
    let file_appender: RollingFileAppender = tracing_appender::rolling::daily(&cfg.log_dir, "setlist.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(fmt::layer().with_writer(std::io::stderr));
    tracing_subscriber_global::set_global_default(subscriber)
        .context("installing tracing subscriber")?;

    let client: Arc<dyn PlaylistService> = Arc::new(SpotifyClient::new(&cfg));
    let mut store = Store::open(client.clone(), cfg.db_path.clone(), &cfg.session_key)
        .await
        .with_context(|| format!("opening session store {}", cfg.db_path.display()))?;

    match cli.command {
        // handled before logging setup
        Commands::ConfigValidate => {}
        Commands::Login => {
            let grant = spotify_auth::run_login(&cfg).await?;
            store.login_with_grant(&grant).await.context("saving session")?;
            println!("Logged in as {}.", store.state().username);
        }
        Commands::Logout => {
            store.logout().await?;
            println!("Logged out.");
        }
        Commands::AuthUrl => {
            let request = AuthRequest::new(&cfg)?;
            println!("{}", request.url);
        }
        Commands::Whoami => {
            require_auth(&mut store).await?;
            let st = store.state();
            println!("{}", st.username);
            if !st.avatar_uri.is_empty() {
                println!("avatar: {}", st.avatar_uri);
            }
        }
        Commands::Playlists => {
            require_auth(&mut store).await?;
            let playlists = store.update_playlists().await?;
            println!("{} playlist(s):", playlists.len());
            for pl in playlists {
                println!("- {} ({}) [{} tracks]", pl.name, pl.id, pl.track_count);
            }
        }
        Commands::Show { id } => {
            require_auth(&mut store).await?;
            store.get_playlist(&id).await?;
            print_tracks(&store);
        }
        Commands::Add { id, uris } => {
            require_auth(&mut store).await?;
            let snapshot = store.api().add_tracks(&id, &uris).await?;
            println!("Added {} track(s). Snapshot: {}", uris.len(), snapshot.unwrap_or_default());
        }
        Commands::Remove { id, positions, all } => {
            require_auth(&mut store).await?;
            store.get_playlist(&id).await?;
            let selected: Vec<usize> = if all {
                (0..store.state().current_playlist_tracks.len()).collect()
            } else {
                to_zero_based(&positions)?
            };
            for p in &selected {
                store.set_track_checked(*p, true)?;
            }
            store.delete_playlist_tracks().await?;
            println!(
                "Removed {} track(s); {} remain.",
                selected.len(),
                store.state().current_playlist_tracks.len()
            );
        }
        Commands::Reorder { id, tracks, after, to_top } => {
            require_auth(&mut store).await?;
            store.get_playlist(&id).await?;
            for p in to_zero_based(&tracks)? {
                store.set_track_checked(p, true)?;
            }
            let place_after = if to_top {
                None
            } else {
                after
                    .map(|a| a.checked_sub(1).ok_or_else(|| anyhow!("positions start at 1")))
                    .transpose()?
            };
            store.reorder_playlist_tracks(place_after).await?;
            print_tracks(&store);
        }
        Commands::Shuffle { id } => {
            require_auth(&mut store).await?;
            store.get_playlist(&id).await?;
            store.shuffle_playlist().await?;
            println!("Shuffled {} track(s).", store.state().current_playlist_tracks.len());
        }
        Commands::Edit { id, name, description, public, collaborative, cover } => {
            let art = match cover {
                Some(path) => Some(cover_art_from_jpeg(
                    &std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?,
                )),
                None => None,
            };
            let changes = PlaylistChanges { name, description, public, collaborative, art };
            if changes.is_empty() {
                return Err(anyhow!("nothing to change"));
            }
            require_auth(&mut store).await?;
            store.get_playlist(&id).await?;
            store.change_playlist_details(&changes).await?;
            println!("Updated playlist {}.", id);
        }
        Commands::Export { id, out } => {
            require_auth(&mut store).await?;
            store.get_playlist(&id).await?;
            let st = store.state();
            let name = st.current_playlist.as_ref().map(|p| p.name.as_str()).unwrap_or(id.as_str());
            let export = lib::export::export_playlist(name, &st.current_playlist_tracks)?;
            let path = write_export(&export, out)?;
            println!("Wrote {}", path.display());
        }
        Commands::ExportAll { ids, out } => {
            require_auth(&mut store).await?;
            let ids: Vec<String> = if ids.is_empty() {
                store.update_playlists().await?.iter().map(|p| p.id.clone()).collect()
            } else {
                ids
            };
            let export = lib::export::export_playlists(client.as_ref(), &store.state().username, &ids).await?;
            let path = write_export(&export, out)?;
            println!("Wrote {} playlist(s) to {}", ids.len(), path.display());
        }
    }

    Ok(())
}
