use std::sync::Arc;
use std::time::SystemTime;

use axum::http::StatusCode;
use axum::Json;
use library::{Library, ScanSummary};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::settings::SettingsStore;

#[derive(Clone)]
pub struct AppState {
    pub library: Library,
    pub settings: SettingsStore,
    pub scan_status: Arc<RwLock<ScanStatus>>,
}

#[derive(Clone, Debug)]
pub enum ScanStatus {
    Idle,
    Scanning { started: SystemTime },
    Finished(ScanSummary),
    Failed(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub scan: String,
    pub last_scan: Option<ScanSummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistSummary {
    pub id: u64,
    pub name: String,
    pub sort_name: String,
    pub album_count: usize,
    pub track_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumSummary {
    pub album_id: u64,
    pub album_name: String,
    pub album_artist: String,
    pub release_year: Option<u32>,
    pub genre: Option<String>,
    pub cover_art_url: Option<String>,
    pub track_count: usize,
    pub date_added: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSummary {
    pub id: u64,
    pub track_title: String,
    pub artist: String,
    pub track_number: u32,
    pub disc_number: u32,
    pub duration: String,
    pub duration_ms: u32,
    pub file_format: String,
    pub bitrate: u32,
    pub file_size: u64,
}

#[derive(Serialize)]
pub struct AlbumTracksResponse {
    pub album: AlbumSummary,
    pub tracks: Vec<TrackSummary>,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct SearchResponse {
    pub artists: Vec<SearchArtist>,
    pub albums: Vec<SearchAlbum>,
    pub tracks: Vec<SearchTrack>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct SearchArtist {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAlbum {
    pub id: u64,
    pub name: String,
    pub artist_name: String,
    pub release_year: Option<u32>,
    pub cover_art_url: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTrack {
    pub id: u64,
    pub title: String,
    pub artist_name: String,
    pub album_name: String,
    pub duration: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumsQuery {
    pub artist_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracksQuery {
    pub album_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerNameBody {
    pub server_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerNameUpdated {
    pub message: &'static str,
    pub server_name: String,
}

pub type JsonResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;
