use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{now_secs, path_key, Album, Artist, Track};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{LibraryError, LibraryStats};

const KEY_SEP: char = '\x1f';

const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");
const ARTISTS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("artists");
const ARTISTS_BY_NAME_TABLE: TableDefinition<&str, u64> = TableDefinition::new("artists_by_name");
const ALBUMS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("albums");
const ALBUMS_BY_NAME_TABLE: TableDefinition<&str, u64> = TableDefinition::new("albums_by_name");
const ARTIST_ALBUMS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("artist_albums");
const TRACKS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("tracks");
const TRACKS_BY_PATH_TABLE: TableDefinition<&str, u64> = TableDefinition::new("tracks_by_path");
const ALBUM_TRACKS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("album_tracks");
const ARTIST_TRACKS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("artist_tracks");

const NEXT_ARTIST_ID: &str = "next_artist_id";
const NEXT_ALBUM_ID: &str = "next_album_id";
const NEXT_TRACK_ID: &str = "next_track_id";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAlbum {
    pub name: String,
    pub artist_id: u64,
    pub release_year: Option<u32>,
    pub genre: Option<String>,
    pub cover_art_path: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrack {
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

impl NewTrack {
    fn into_track(self, id: u64) -> Track {
        Track {
            id,
            album_id: self.album_id,
            artist_id: self.artist_id,
            title: self.title,
            track_number: self.track_number,
            disc_number: self.disc_number,
            duration_ms: self.duration_ms,
            file_format: self.file_format,
            bitrate: self.bitrate,
            file_size: self.file_size,
            file_path: self.file_path,
        }
    }
}

/// Track inserts and deletions gathered during a scan pass, applied by [`CatalogStore::commit`].
#[derive(Debug, Default)]
pub struct PendingChanges {
    tracks: Vec<NewTrack>,
    removals: Vec<String>,
}

impl PendingChanges {
    pub fn create_track(&mut self, track: NewTrack) {
        self.tracks.push(track);
    }

    pub fn delete_tracks<I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.removals.extend(paths);
    }

    pub fn staged_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn staged_removals(&self) -> usize {
        self.removals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty() && self.removals.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    pub added: usize,
    pub removed: usize,
}

/// Artist/Album/Track tables and their lookup indexes.
///
/// Every mutation runs inside a redb write transaction, and redb admits one writer at a
/// time, so a lookup followed by an insert in the same transaction cannot race another
/// writer.
#[derive(Clone)]
pub struct CatalogStore {
    db: Arc<Database>,
}

impl CatalogStore {
    pub fn open_db(path: &Path) -> Result<Arc<Database>, LibraryError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let db = if path.exists() {
            Database::open(path)?
        } else {
            Database::create(path)?
        };
        Ok(Arc::new(db))
    }

    pub fn new(db: Arc<Database>) -> Result<Self, LibraryError> {
        let store = Self { db };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<(), LibraryError> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(META_TABLE)?;
            let _ = write_txn.open_table(ARTISTS_TABLE)?;
            let _ = write_txn.open_table(ARTISTS_BY_NAME_TABLE)?;
            let _ = write_txn.open_table(ALBUMS_TABLE)?;
            let _ = write_txn.open_table(ALBUMS_BY_NAME_TABLE)?;
            let _ = write_txn.open_table(ARTIST_ALBUMS_TABLE)?;
            let _ = write_txn.open_table(TRACKS_TABLE)?;
            let _ = write_txn.open_table(TRACKS_BY_PATH_TABLE)?;
            let _ = write_txn.open_table(ALBUM_TRACKS_TABLE)?;
            let _ = write_txn.open_table(ARTIST_TRACKS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn list_all_track_paths(&self) -> Result<HashSet<String>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRACKS_TABLE)?;
        let mut paths = HashSet::new();
        for entry in table.iter()? {
            let entry = entry?;
            let track: Track = decode_value(entry.1.value())?;
            paths.insert(track.file_path);
        }
        Ok(paths)
    }

    pub fn find_artist_by_name(&self, name: &str) -> Result<Option<Artist>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let by_name = read_txn.open_table(ARTISTS_BY_NAME_TABLE)?;
        let id = match by_name.get(artist_key(name).as_str())? {
            Some(value) => value.value(),
            None => return Ok(None),
        };
        let artists = read_txn.open_table(ARTISTS_TABLE)?;
        let artist = match artists.get(id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(artist)
    }

    /// Returns the artist with this name (case-insensitive), creating it when absent.
    /// The flag is `true` only for the caller whose transaction inserted the row.
    pub fn create_artist_if_absent(
        &self,
        name: &str,
        sort_name: &str,
    ) -> Result<(Artist, bool), LibraryError> {
        let key = artist_key(name);
        let write_txn = self.db.begin_write()?;

        let existing = {
            let by_name = write_txn.open_table(ARTISTS_BY_NAME_TABLE)?;
            let id = by_name.get(key.as_str())?.map(|value| value.value());
            match id {
                Some(id) => {
                    let artists = write_txn.open_table(ARTISTS_TABLE)?;
                    let artist: Option<Artist> = match artists.get(id)? {
                        Some(value) => Some(decode_value(value.value())?),
                        None => None,
                    };
                    artist
                }
                None => None,
            }
        };
        if let Some(artist) = existing {
            write_txn.abort()?;
            return Ok((artist, false));
        }

        let artist = Artist {
            id: next_id(&write_txn, NEXT_ARTIST_ID)?,
            name: name.to_string(),
            sort_name: sort_name.to_string(),
        };
        {
            let mut artists = write_txn.open_table(ARTISTS_TABLE)?;
            artists.insert(artist.id, encode_value(&artist)?.as_slice())?;
            let mut by_name = write_txn.open_table(ARTISTS_BY_NAME_TABLE)?;
            by_name.insert(key.as_str(), artist.id)?;
        }
        write_txn.commit()?;
        Ok((artist, true))
    }

    pub fn find_album(&self, name: &str, artist_id: u64) -> Result<Option<Album>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let by_name = read_txn.open_table(ALBUMS_BY_NAME_TABLE)?;
        let id = match by_name.get(album_key(name, artist_id).as_str())? {
            Some(value) => value.value(),
            None => return Ok(None),
        };
        let albums = read_txn.open_table(ALBUMS_TABLE)?;
        let album = match albums.get(id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(album)
    }

    /// Returns the album for `(name, artist_id)`, creating it from `new` when absent.
    /// An existing album is returned untouched, including its cover and date added.
    pub fn create_album_if_absent(&self, new: NewAlbum) -> Result<(Album, bool), LibraryError> {
        let key = album_key(&new.name, new.artist_id);
        let write_txn = self.db.begin_write()?;

        let existing = {
            let by_name = write_txn.open_table(ALBUMS_BY_NAME_TABLE)?;
            let id = by_name.get(key.as_str())?.map(|value| value.value());
            match id {
                Some(id) => {
                    let albums = write_txn.open_table(ALBUMS_TABLE)?;
                    let album: Option<Album> = match albums.get(id)? {
                        Some(value) => Some(decode_value(value.value())?),
                        None => None,
                    };
                    album
                }
                None => None,
            }
        };
        if let Some(album) = existing {
            write_txn.abort()?;
            return Ok((album, false));
        }

        let artist_known = {
            let artists = write_txn.open_table(ARTISTS_TABLE)?;
            let known = artists.get(new.artist_id)?.is_some();
            known
        };
        if !artist_known {
            write_txn.abort()?;
            return Err(LibraryError::Integrity(format!(
                "album {:?} references missing artist {}",
                new.name, new.artist_id
            )));
        }

        let album = Album {
            id: next_id(&write_txn, NEXT_ALBUM_ID)?,
            artist_id: new.artist_id,
            name: new.name,
            release_year: new.release_year,
            genre: new.genre,
            cover_art_path: new.cover_art_path,
            date_added: now_secs(),
        };
        {
            let mut albums = write_txn.open_table(ALBUMS_TABLE)?;
            albums.insert(album.id, encode_value(&album)?.as_slice())?;
            let mut by_name = write_txn.open_table(ALBUMS_BY_NAME_TABLE)?;
            by_name.insert(key.as_str(), album.id)?;
            let mut artist_albums = write_txn.open_table(ARTIST_ALBUMS_TABLE)?;
            artist_albums.insert(index_key(album.artist_id, album.id).as_str(), album.id)?;
        }
        write_txn.commit()?;
        Ok((album, true))
    }

    /// Applies a scan pass's staged inserts and deletions in a single transaction.
    ///
    /// Staged tracks whose path is already catalogued (another scan got there first) are
    /// skipped, as are removals of paths that are already gone.
    pub fn commit(&self, pending: PendingChanges) -> Result<CommitOutcome, LibraryError> {
        let mut outcome = CommitOutcome::default();
        if pending.is_empty() {
            return Ok(outcome);
        }

        let write_txn = self.db.begin_write()?;
        let mut next_track_id = {
            let meta = write_txn.open_table(META_TABLE)?;
            let next = meta.get(NEXT_TRACK_ID)?.map(|value| value.value()).unwrap_or(1);
            next
        };

        {
            let artists = write_txn.open_table(ARTISTS_TABLE)?;
            let albums = write_txn.open_table(ALBUMS_TABLE)?;
            let mut tracks = write_txn.open_table(TRACKS_TABLE)?;
            let mut by_path = write_txn.open_table(TRACKS_BY_PATH_TABLE)?;
            let mut album_tracks = write_txn.open_table(ALBUM_TRACKS_TABLE)?;
            let mut artist_tracks = write_txn.open_table(ARTIST_TRACKS_TABLE)?;

            for path in &pending.removals {
                let id = match by_path.remove(path_key(path).as_str())? {
                    Some(value) => value.value(),
                    None => continue,
                };
                let removed: Option<Track> = match tracks.remove(id)? {
                    Some(value) => Some(decode_value(value.value())?),
                    None => None,
                };
                if let Some(track) = removed {
                    album_tracks.remove(index_key(track.album_id, track.id).as_str())?;
                    artist_tracks.remove(index_key(track.artist_id, track.id).as_str())?;
                    debug!("Removed track: {}", track.title);
                    outcome.removed += 1;
                }
            }

            for new in pending.tracks {
                let key = path_key(&new.file_path);
                if by_path.get(key.as_str())?.is_some() {
                    debug!("Already catalogued: {}", new.file_path);
                    continue;
                }
                if albums.get(new.album_id)?.is_none() || artists.get(new.artist_id)?.is_none() {
                    return Err(LibraryError::Integrity(format!(
                        "track {} references missing album {} or artist {}",
                        new.file_path, new.album_id, new.artist_id
                    )));
                }

                let track = new.into_track(next_track_id);
                next_track_id += 1;
                tracks.insert(track.id, encode_value(&track)?.as_slice())?;
                by_path.insert(key.as_str(), track.id)?;
                album_tracks.insert(index_key(track.album_id, track.id).as_str(), track.id)?;
                artist_tracks.insert(index_key(track.artist_id, track.id).as_str(), track.id)?;
                debug!("Added track: {}", track.title);
                outcome.added += 1;
            }
        }

        {
            let mut meta = write_txn.open_table(META_TABLE)?;
            meta.insert(NEXT_TRACK_ID, next_track_id)?;
        }
        write_txn.commit()?;
        Ok(outcome)
    }

    pub fn get_artist(&self, artist_id: u64) -> Result<Option<Artist>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ARTISTS_TABLE)?;
        let artist = match table.get(artist_id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(artist)
    }

    pub fn get_album(&self, album_id: u64) -> Result<Option<Album>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ALBUMS_TABLE)?;
        let album = match table.get(album_id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(album)
    }

    pub fn get_track(&self, track_id: u64) -> Result<Option<Track>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRACKS_TABLE)?;
        let track = match table.get(track_id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(track)
    }

    /// All artists ordered by sort name.
    pub fn list_artists(&self) -> Result<Vec<Artist>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ARTISTS_TABLE)?;
        let mut artists = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let artist: Artist = decode_value(entry.1.value())?;
            artists.push(artist);
        }
        artists.sort_by(|a, b| {
            a.sort_name
                .to_lowercase()
                .cmp(&b.sort_name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(artists)
    }

    /// Albums in id order, optionally restricted to one artist.
    pub fn list_albums(&self, artist_id: Option<u64>) -> Result<Vec<Album>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let album_table = read_txn.open_table(ALBUMS_TABLE)?;
        let mut albums = Vec::new();

        match artist_id {
            Some(artist_id) => {
                let index = read_txn.open_table(ARTIST_ALBUMS_TABLE)?;
                let (start, end) = prefix_range(artist_id);
                for entry in index.range(start.as_str()..end.as_str())? {
                    let entry = entry?;
                    let album_id = entry.1.value();
                    if let Some(value) = album_table.get(album_id)? {
                        albums.push(decode_value(value.value())?);
                    }
                }
            }
            None => {
                for entry in album_table.iter()? {
                    let entry = entry?;
                    albums.push(decode_value(entry.1.value())?);
                }
            }
        }

        Ok(albums)
    }

    /// Tracks of one album ordered by disc, then track number.
    pub fn list_album_tracks(&self, album_id: u64) -> Result<Vec<Track>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let track_table = read_txn.open_table(TRACKS_TABLE)?;
        let index = read_txn.open_table(ALBUM_TRACKS_TABLE)?;
        let (start, end) = prefix_range(album_id);
        let mut tracks: Vec<Track> = Vec::new();
        for entry in index.range(start.as_str()..end.as_str())? {
            let entry = entry?;
            let track_id = entry.1.value();
            if let Some(value) = track_table.get(track_id)? {
                tracks.push(decode_value(value.value())?);
            }
        }
        tracks.sort_by(|a, b| {
            a.disc_number
                .cmp(&b.disc_number)
                .then_with(|| a.track_number.cmp(&b.track_number))
                .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        });
        Ok(tracks)
    }

    pub fn list_tracks(&self) -> Result<Vec<Track>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRACKS_TABLE)?;
        let mut tracks = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            tracks.push(decode_value(entry.1.value())?);
        }
        Ok(tracks)
    }

    pub fn count_artist_albums(&self, artist_id: u64) -> Result<usize, LibraryError> {
        self.count_children(ARTIST_ALBUMS_TABLE, artist_id)
    }

    pub fn count_artist_tracks(&self, artist_id: u64) -> Result<usize, LibraryError> {
        self.count_children(ARTIST_TRACKS_TABLE, artist_id)
    }

    pub fn count_album_tracks(&self, album_id: u64) -> Result<usize, LibraryError> {
        self.count_children(ALBUM_TRACKS_TABLE, album_id)
    }

    pub fn stats(&self) -> Result<LibraryStats, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let artists = read_txn.open_table(ARTISTS_TABLE)?.len()?;
        let albums = read_txn.open_table(ALBUMS_TABLE)?.len()?;
        let tracks = read_txn.open_table(TRACKS_TABLE)?.len()?;
        Ok(LibraryStats {
            artists: artists as usize,
            albums: albums as usize,
            tracks: tracks as usize,
        })
    }

    fn count_children(
        &self,
        table: TableDefinition<'static, &'static str, u64>,
        parent_id: u64,
    ) -> Result<usize, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(table)?;
        let (start, end) = prefix_range(parent_id);
        let mut count = 0usize;
        for entry in index.range(start.as_str()..end.as_str())? {
            entry?;
            count += 1;
        }
        Ok(count)
    }
}

fn next_id(txn: &WriteTransaction, counter: &str) -> Result<u64, LibraryError> {
    let mut meta = txn.open_table(META_TABLE)?;
    let id = meta.get(counter)?.map(|value| value.value()).unwrap_or(1);
    meta.insert(counter, id + 1)?;
    Ok(id)
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, LibraryError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, LibraryError> {
    Ok(bincode::deserialize(bytes)?)
}

fn artist_key(name: &str) -> String {
    name.to_lowercase()
}

fn album_key(name: &str, artist_id: u64) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:020}", artist_id));
    out.push(KEY_SEP);
    out.push_str(name);
    out
}

fn index_key(parent_id: u64, child_id: u64) -> String {
    format!("{:020}{}{:020}", parent_id, KEY_SEP, child_id)
}

fn prefix_range(parent_id: u64) -> (String, String) {
    let mut start = format!("{:020}", parent_id);
    start.push(KEY_SEP);
    let mut end = start.clone();
    end.push('\u{10ffff}');
    (start, end)
}
