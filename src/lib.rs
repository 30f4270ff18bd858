//! Core library for setlist, a Spotify playlist manager
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod store;
pub mod throttle;
pub mod transform;

pub use error::{Result, SetlistError};
