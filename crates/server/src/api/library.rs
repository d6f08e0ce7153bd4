use std::collections::HashMap;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use common::{format_duration, Album, Artist, Track};
use library::{CatalogStore, LibraryError, ScanSummary};

use crate::scan::run_scan;
use crate::state::{
    AlbumSummary, AlbumTracksResponse, AlbumsQuery, AppState, ArtistSummary, JsonResult,
    SearchAlbum, SearchArtist, SearchQuery, SearchResponse, SearchTrack, TrackSummary,
    TracksQuery,
};
use crate::utils::{artwork_url, image_response, json_error, json_error_response};

const SEARCH_LIMIT: usize = 50;
const RECENT_LIMIT: usize = 50;
const UNKNOWN_ARTIST: &str = "Unknown Artist";

pub async fn scan_library(State(state): State<AppState>) -> JsonResult<ScanSummary> {
    match run_scan(&state).await {
        Ok(summary) => Ok(Json(summary)),
        Err(message) => Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error scanning library: {}", message),
        )),
    }
}

pub async fn list_artists(State(state): State<AppState>) -> JsonResult<Vec<ArtistSummary>> {
    let catalog = state.library.catalog();
    let artists = catalog.list_artists().map_err(library_error)?;
    let mut items = Vec::with_capacity(artists.len());
    for artist in artists {
        items.push(ArtistSummary {
            album_count: catalog.count_artist_albums(artist.id).map_err(library_error)?,
            track_count: catalog.count_artist_tracks(artist.id).map_err(library_error)?,
            id: artist.id,
            name: artist.name,
            sort_name: artist.sort_name,
        });
    }
    Ok(Json(items))
}

pub async fn list_albums(
    State(state): State<AppState>,
    Query(params): Query<AlbumsQuery>,
) -> JsonResult<Vec<AlbumSummary>> {
    let catalog = state.library.catalog();
    let albums = catalog.list_albums(params.artist_id).map_err(library_error)?;
    let mut items = summarize_albums(catalog, albums).map_err(library_error)?;
    sort_album_summaries(&mut items);
    Ok(Json(items))
}

pub async fn list_album_tracks(
    State(state): State<AppState>,
    Query(params): Query<TracksQuery>,
) -> JsonResult<AlbumTracksResponse> {
    let catalog = state.library.catalog();
    let album = match catalog.get_album(params.album_id).map_err(library_error)? {
        Some(album) => album,
        None => return Err(json_error(StatusCode::NOT_FOUND, "Album not found")),
    };
    let tracks = catalog
        .list_album_tracks(album.id)
        .map_err(library_error)?;
    let artists = artist_names(catalog).map_err(library_error)?;

    let album = summarize_album(catalog, &artists, album).map_err(library_error)?;
    let tracks = tracks
        .into_iter()
        .map(|track| track_summary(&artists, track))
        .collect();
    Ok(Json(AlbumTracksResponse { album, tracks }))
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> JsonResult<SearchResponse> {
    let query = params.query.trim();
    if query.is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Query parameter is required.",
        ));
    }
    let catalog = state.library.catalog();
    let artists = catalog.list_artists().map_err(library_error)?;
    let albums = catalog.list_albums(None).map_err(library_error)?;
    let tracks = catalog.list_tracks().map_err(library_error)?;
    Ok(Json(search_catalog(&artists, &albums, &tracks, query)))
}

pub async fn get_artwork(
    State(state): State<AppState>,
    AxumPath(album_id): AxumPath<u64>,
) -> Response {
    let album = match state.library.catalog().get_album(album_id) {
        Ok(Some(album)) => album,
        Ok(None) => return json_error_response(StatusCode::NOT_FOUND, "Cover art not found."),
        Err(err) => {
            return json_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("library error: {}", err),
            )
        }
    };
    let path = match album.cover_art_path {
        Some(path) if !path.is_empty() => path,
        _ => return json_error_response(StatusCode::NOT_FOUND, "Cover art not found."),
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            image_response(bytes, mime.as_ref())
        }
        Err(_) => json_error_response(StatusCode::NOT_FOUND, "Cover art file does not exist."),
    }
}

pub async fn recently_added(State(state): State<AppState>) -> JsonResult<Vec<AlbumSummary>> {
    let catalog = state.library.catalog();
    let albums = catalog.list_albums(None).map_err(library_error)?;
    let recent = newest_albums(albums, RECENT_LIMIT);
    let items = summarize_albums(catalog, recent).map_err(library_error)?;
    Ok(Json(items))
}

fn library_error(err: LibraryError) -> (StatusCode, Json<crate::state::ErrorResponse>) {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("library error: {}", err),
    )
}

fn artist_names(catalog: &CatalogStore) -> Result<HashMap<u64, String>, LibraryError> {
    Ok(catalog
        .list_artists()?
        .into_iter()
        .map(|artist| (artist.id, artist.name))
        .collect())
}

fn summarize_albums(
    catalog: &CatalogStore,
    albums: Vec<Album>,
) -> Result<Vec<AlbumSummary>, LibraryError> {
    let artists = artist_names(catalog)?;
    albums
        .into_iter()
        .map(|album| summarize_album(catalog, &artists, album))
        .collect()
}

fn summarize_album(
    catalog: &CatalogStore,
    artists: &HashMap<u64, String>,
    album: Album,
) -> Result<AlbumSummary, LibraryError> {
    Ok(AlbumSummary {
        track_count: catalog.count_album_tracks(album.id)?,
        album_artist: artist_name(artists, album.artist_id),
        cover_art_url: album.cover_art_path.as_ref().map(|_| artwork_url(album.id)),
        album_id: album.id,
        album_name: album.name,
        release_year: album.release_year,
        genre: album.genre,
        date_added: album.date_added,
    })
}

fn track_summary(artists: &HashMap<u64, String>, track: Track) -> TrackSummary {
    TrackSummary {
        id: track.id,
        artist: artist_name(artists, track.artist_id),
        track_title: track.title,
        track_number: track.track_number,
        disc_number: track.disc_number,
        duration: format_duration(track.duration_ms),
        duration_ms: track.duration_ms,
        file_format: track.file_format,
        bitrate: track.bitrate,
        file_size: track.file_size,
    }
}

fn artist_name(artists: &HashMap<u64, String>, artist_id: u64) -> String {
    artists
        .get(&artist_id)
        .cloned()
        .unwrap_or_else(|| UNKNOWN_ARTIST.to_string())
}

/// Album artist ascending, then newest release first; undated albums go last.
fn sort_album_summaries(items: &mut [AlbumSummary]) {
    items.sort_by(|a, b| {
        a.album_artist
            .to_lowercase()
            .cmp(&b.album_artist.to_lowercase())
            .then_with(|| b.release_year.cmp(&a.release_year))
            .then_with(|| a.album_id.cmp(&b.album_id))
    });
}

fn newest_albums(mut albums: Vec<Album>, limit: usize) -> Vec<Album> {
    albums.sort_by(|a, b| {
        b.date_added
            .cmp(&a.date_added)
            .then_with(|| b.id.cmp(&a.id))
    });
    albums.truncate(limit);
    albums
}

/// Case-insensitive substring match over artist names, album names and track titles,
/// capped per kind.
fn search_catalog(
    artists: &[Artist],
    albums: &[Album],
    tracks: &[Track],
    query: &str,
) -> SearchResponse {
    let needle = query.trim().to_lowercase();
    let artist_names: HashMap<u64, &str> = artists
        .iter()
        .map(|artist| (artist.id, artist.name.as_str()))
        .collect();
    let album_names: HashMap<u64, &str> = albums
        .iter()
        .map(|album| (album.id, album.name.as_str()))
        .collect();
    let name_of = |id: u64| artist_names.get(&id).copied().unwrap_or(UNKNOWN_ARTIST).to_string();

    let artists = artists
        .iter()
        .filter(|artist| artist.name.to_lowercase().contains(&needle))
        .take(SEARCH_LIMIT)
        .map(|artist| SearchArtist {
            id: artist.id,
            name: artist.name.clone(),
        })
        .collect();
    let albums = albums
        .iter()
        .filter(|album| album.name.to_lowercase().contains(&needle))
        .take(SEARCH_LIMIT)
        .map(|album| SearchAlbum {
            id: album.id,
            name: album.name.clone(),
            artist_name: name_of(album.artist_id),
            release_year: album.release_year,
            cover_art_url: album.cover_art_path.as_ref().map(|_| artwork_url(album.id)),
        })
        .collect();
    let tracks = tracks
        .iter()
        .filter(|track| track.title.to_lowercase().contains(&needle))
        .take(SEARCH_LIMIT)
        .map(|track| SearchTrack {
            id: track.id,
            title: track.title.clone(),
            artist_name: name_of(track.artist_id),
            album_name: album_names
                .get(&track.album_id)
                .copied()
                .unwrap_or_default()
                .to_string(),
            duration: format_duration(track.duration_ms),
        })
        .collect();

    SearchResponse {
        artists,
        albums,
        tracks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artist(id: u64, name: &str) -> Artist {
        Artist {
            id,
            name: name.to_string(),
            sort_name: common::sort_name(name),
        }
    }

    fn album(id: u64, artist_id: u64, name: &str, year: Option<u32>, date_added: u64) -> Album {
        Album {
            id,
            artist_id,
            name: name.to_string(),
            release_year: year,
            genre: None,
            cover_art_path: None,
            date_added,
        }
    }

    fn track(id: u64, album_id: u64, artist_id: u64, title: &str) -> Track {
        Track {
            id,
            album_id,
            artist_id,
            title: title.to_string(),
            track_number: 1,
            disc_number: 1,
            duration_ms: 185_000,
            file_format: "MP3".to_string(),
            bitrate: 320,
            file_size: 1,
            file_path: format!("/music/{}.mp3", id),
        }
    }

    fn summary(id: u64, artist: &str, year: Option<u32>) -> AlbumSummary {
        AlbumSummary {
            album_id: id,
            album_name: format!("album {}", id),
            album_artist: artist.to_string(),
            release_year: year,
            genre: None,
            cover_art_url: None,
            track_count: 0,
            date_added: 0,
        }
    }

    #[test]
    fn albums_sort_by_artist_then_newest_year() {
        let mut items = vec![
            summary(1, "beta", Some(1990)),
            summary(2, "Alpha", None),
            summary(3, "alpha", Some(2001)),
            summary(4, "Alpha", Some(1995)),
        ];
        sort_album_summaries(&mut items);
        let order: Vec<u64> = items.iter().map(|item| item.album_id).collect();
        assert_eq!(order, vec![3, 4, 2, 1]);
    }

    #[test]
    fn newest_albums_are_capped() {
        let albums: Vec<Album> = (1..=60).map(|id| album(id, 1, "x", None, id * 10)).collect();
        let recent = newest_albums(albums, RECENT_LIMIT);
        assert_eq!(recent.len(), RECENT_LIMIT);
        assert_eq!(recent[0].id, 60);
        assert_eq!(recent[49].id, 11);
    }

    #[test]
    fn search_matches_substrings_ignoring_case() {
        let artists = vec![artist(1, "The Foo"), artist(2, "Bar")];
        let albums = vec![album(10, 1, "Foolish", Some(2000), 0), album(11, 2, "Other", None, 0)];
        let tracks = vec![
            track(100, 10, 1, "Food Fight"),
            track(101, 11, 2, "Nothing"),
        ];

        let results = search_catalog(&artists, &albums, &tracks, "  FOO ");
        assert_eq!(
            results.artists,
            vec![SearchArtist {
                id: 1,
                name: "The Foo".to_string()
            }]
        );
        assert_eq!(results.albums.len(), 1);
        assert_eq!(results.albums[0].artist_name, "The Foo");
        assert_eq!(results.tracks.len(), 1);
        assert_eq!(results.tracks[0].album_name, "Foolish");
        assert_eq!(results.tracks[0].duration, "03:05");
    }

    #[test]
    fn search_caps_each_kind() {
        let artists: Vec<Artist> = (1..=80).map(|id| artist(id, &format!("Band {}", id))).collect();
        let results = search_catalog(&artists, &[], &[], "band");
        assert_eq!(results.artists.len(), SEARCH_LIMIT);
        assert!(results.albums.is_empty());
        assert!(results.tracks.is_empty());
    }
}
