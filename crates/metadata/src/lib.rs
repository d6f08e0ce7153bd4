use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use common::{UNKNOWN_ALBUM, UNKNOWN_ALBUM_ARTIST, UNKNOWN_GENRE};
use lofty::error::LoftyError;
use lofty::prelude::{Accessor, AudioFile, ItemKey, TaggedFileExt};

/// Raw values as they appear in the file's tags, before any fallbacks apply.
#[derive(Debug, Default, Clone)]
pub struct TagInfo {
    pub title: Option<String>,
    pub album_artists: Vec<String>,
    pub album: Option<String>,
    pub year: Option<u32>,
    pub genres: Vec<String>,
    pub track_no: Option<u32>,
    pub disc_no: Option<u32>,
    pub duration_ms: u32,
    pub bitrate: Option<u32>,
}

/// Canonical per-file record consumed by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub album_artist: String,
    pub album: String,
    pub year: Option<u32>,
    pub genre: String,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub duration_ms: u32,
    pub file_format: String,
    pub bitrate: u32,
    pub file_size: u64,
}

impl TrackMetadata {
    pub fn from_tags(path: &Path, tags: TagInfo, file_size: u64) -> Self {
        let title = tags
            .title
            .and_then(non_empty)
            .unwrap_or_else(|| file_stem(path));
        let album_artist = tags
            .album_artists
            .into_iter()
            .find_map(non_empty)
            .unwrap_or_else(|| UNKNOWN_ALBUM_ARTIST.to_string());
        let album = tags
            .album
            .and_then(non_empty)
            .unwrap_or_else(|| UNKNOWN_ALBUM.to_string());
        let genre = tags
            .genres
            .into_iter()
            .find_map(non_empty)
            .unwrap_or_else(|| UNKNOWN_GENRE.to_string());

        Self {
            title,
            album_artist,
            album,
            year: tags.year.filter(|year| *year > 0),
            genre,
            track_number: tags.track_no.filter(|n| *n > 0),
            disc_number: tags.disc_no.filter(|n| *n > 0),
            duration_ms: tags.duration_ms,
            file_format: file_format(path),
            bitrate: tags.bitrate.unwrap_or(0),
            file_size,
        }
    }
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

/// A file whose metadata could not be read. The scan skips it and moves on.
#[derive(Debug)]
pub struct ExtractionError {
    pub path: PathBuf,
    pub source: MetadataError,
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to read {}: {}", self.path.display(), self.source)
    }
}

impl std::error::Error for ExtractionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Anything that can turn an audio file into a [`TrackMetadata`].
pub trait MetadataSource: Send + Sync {
    fn extract(&self, path: &Path) -> Result<TrackMetadata, ExtractionError>;
}

/// Reads embedded tags and audio properties with lofty.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyExtractor;

impl MetadataSource for LoftyExtractor {
    fn extract(&self, path: &Path) -> Result<TrackMetadata, ExtractionError> {
        extract(path)
    }
}

pub fn extract(path: &Path) -> Result<TrackMetadata, ExtractionError> {
    let wrap = |source: MetadataError| ExtractionError {
        path: path.to_path_buf(),
        source,
    };
    let file_size = fs::metadata(path)
        .map_err(|err| wrap(err.into()))?
        .len();
    let tags = read_tags(path).map_err(wrap)?;
    Ok(TrackMetadata::from_tags(path, tags, file_size))
}

pub fn read_tags(path: &Path) -> Result<TagInfo, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();

    let mut info = TagInfo::default();

    let duration_ms = properties.duration().as_millis();
    info.duration_ms = duration_ms.min(u128::from(u32::MAX)) as u32;
    info.bitrate = properties.audio_bitrate().or(properties.overall_bitrate());

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        info.title = tag.get_string(&ItemKey::TrackTitle).map(|v| v.to_string());
        info.album = tag.get_string(&ItemKey::AlbumTitle).map(|v| v.to_string());
        info.album_artists = tag
            .get_strings(&ItemKey::AlbumArtist)
            .map(|v| v.trim().to_string())
            .collect();
        info.track_no = tag
            .get_string(&ItemKey::TrackNumber)
            .and_then(parse_number);
        info.disc_no = tag
            .get_string(&ItemKey::DiscNumber)
            .and_then(parse_number);
        info.year = tag.year().or_else(|| {
            tag.get_string(&ItemKey::RecordingDate)
                .and_then(parse_year)
        });
        for value in tag.get_strings(&ItemKey::Genre) {
            info.genres.extend(parse_genres(value));
        }
    }

    Ok(info)
}

/// Upper-cased extension without the leading dot, e.g. `MP3`.
pub fn file_format(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_uppercase())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

// "3/12" style values carry the total after the slash.
fn parse_number(text: &str) -> Option<u32> {
    let head = text.split('/').next().unwrap_or(text).trim();
    head.parse().ok()
}

fn parse_year(text: &str) -> Option<u32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    digits.parse().ok()
}

fn parse_genres(text: &str) -> Vec<String> {
    text.split(&[';', '/', '|', '\0'][..])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
