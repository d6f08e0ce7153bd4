use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub const UNKNOWN_ALBUM_ARTIST: &str = "Unknown Album Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_GENRE: &str = "Unknown Genre";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: u64,
    pub name: String,
    pub sort_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: u64,
    pub artist_id: u64,
    pub name: String,
    pub release_year: Option<u32>,
    pub genre: Option<String>,
    pub cover_art_path: Option<String>,
    pub date_added: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: u64,
    pub album_id: u64,
    pub artist_id: u64,
    pub title: String,
    pub track_number: u32,
    pub disc_number: u32,
    pub duration_ms: u32,
    pub file_format: String,
    pub bitrate: u32,
    pub file_size: u64,
    pub file_path: String,
}

/// Sort key for an artist name: a leading "The " becomes a trailing ", The".
pub fn sort_name(name: &str) -> String {
    match name.strip_prefix("The ") {
        Some(rest) => format!("{}, The", rest),
        None => name.to_string(),
    }
}

/// Case-folded form of a file path, used wherever paths are compared.
pub fn path_key(path: &str) -> String {
    path.to_lowercase()
}

pub fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Formats a duration as `mm:ss`, rolling minutes past 59 instead of adding hours.
pub fn format_duration(duration_ms: u32) -> String {
    let total_secs = duration_ms / 1000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_secs())
        .unwrap_or(0)
}
