use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use common::{path_key, path_to_string, sort_name, Artist};
use metadata::{MetadataSource, TrackMetadata};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cover::resolve_cover_art;
use crate::store::{CatalogStore, NewAlbum, NewTrack, PendingChanges};
use crate::LibraryError;

const AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "flac", "wav", "ogg"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub added: usize,
    pub removed: usize,
    pub skipped: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanPhase {
    #[default]
    Idle,
    Enumerating,
    Diffing,
    /// Index into the new paths of the file being processed.
    Processing(usize),
    Cleaning,
    Committed,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanPhase::Idle => f.write_str("idle"),
            ScanPhase::Enumerating => f.write_str("enumerating"),
            ScanPhase::Diffing => f.write_str("diffing"),
            ScanPhase::Processing(index) => write!(f, "processing({})", index),
            ScanPhase::Cleaning => f.write_str("cleaning"),
            ScanPhase::Committed => f.write_str("committed"),
        }
    }
}

/// Audio files found under a root, plus the directories the walk could not read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Enumeration {
    pub files: Vec<PathBuf>,
    pub unreadable: Vec<PathBuf>,
}

/// Paths to add and paths to drop, as seen by one scan pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanDiff {
    pub new_paths: Vec<PathBuf>,
    pub stale_paths: Vec<String>,
}

/// Set difference between the files on disk and the catalogued paths, ignoring case.
///
/// Catalogued paths under an `unreadable` directory are never reported stale: the walk
/// could not see them, which says nothing about whether they still exist.
pub fn diff_paths(
    enumerated: &[PathBuf],
    stored: &HashSet<String>,
    unreadable: &[PathBuf],
) -> ScanDiff {
    let stored_keys: HashSet<String> = stored.iter().map(|path| path_key(path)).collect();
    let enumerated_keys: HashSet<String> = enumerated
        .iter()
        .map(|path| path_key(&path_to_string(path)))
        .collect();
    let unreadable_keys: Vec<PathBuf> = unreadable
        .iter()
        .map(|dir| PathBuf::from(path_key(&path_to_string(dir))))
        .collect();

    let new_paths = enumerated
        .iter()
        .filter(|path| !stored_keys.contains(&path_key(&path_to_string(path))))
        .cloned()
        .collect();
    let mut stale_paths: Vec<String> = stored
        .iter()
        .filter(|path| {
            let key = path_key(path);
            !enumerated_keys.contains(&key)
                && !unreadable_keys
                    .iter()
                    .any(|dir| Path::new(&key).starts_with(dir))
        })
        .cloned()
        .collect();
    stale_paths.sort();

    ScanDiff {
        new_paths,
        stale_paths,
    }
}

pub fn is_audio_file(path: &Path) -> bool {
    let name = match path.file_name() {
        Some(name) => name,
        None => return false,
    };
    let name = match name.to_str() {
        Some(name) => name,
        None => {
            warn!("Ignoring {:?}: file name is not valid UTF-8", path);
            return false;
        }
    };
    // covers `._` resource forks too
    if name.starts_with('.') {
        return false;
    }
    let ext = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_ascii_lowercase(),
        None => return false,
    };
    AUDIO_EXTENSIONS.contains(&ext.as_str())
}

/// Walks `root` for audio files. A directory that cannot be read is recorded in
/// `unreadable`; an error with no path attached fails the whole walk.
pub fn collect_audio_files(root: &Path) -> Result<Enumeration, LibraryError> {
    let mut found = Enumeration::default();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => match err.path() {
                Some(path) => {
                    warn!("Failed to read {:?}: {}", path, err);
                    found.unreadable.push(path.to_path_buf());
                    continue;
                }
                None => return Err(std::io::Error::from(err).into()),
            },
        };
        if entry.file_type().is_file() && is_audio_file(entry.path()) {
            found.files.push(entry.into_path());
        }
    }
    found.files.sort();
    Ok(found)
}

/// One reconcile pass over a music root.
pub struct Scanner<'a> {
    root: &'a Path,
    store: &'a CatalogStore,
    source: &'a dyn MetadataSource,
    phase: ScanPhase,
    artists: HashMap<String, Artist>,
    albums: HashMap<(String, u64), u64>,
}

impl<'a> Scanner<'a> {
    pub fn new(root: &'a Path, store: &'a CatalogStore, source: &'a dyn MetadataSource) -> Self {
        Self {
            root,
            store,
            source,
            phase: ScanPhase::Idle,
            artists: HashMap::new(),
            albums: HashMap::new(),
        }
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn run(&mut self) -> Result<ScanSummary, LibraryError> {
        let mut summary = ScanSummary::default();
        if !self.root.is_dir() {
            warn!("Music root {:?} does not exist; nothing to scan", self.root);
            return Ok(summary);
        }

        self.enter(ScanPhase::Enumerating);
        let found = collect_audio_files(self.root)?;
        info!("Found {} audio files under {:?}", found.files.len(), self.root);
        if !found.unreadable.is_empty() {
            warn!(
                "{} directories could not be read; their catalogued tracks are kept",
                found.unreadable.len()
            );
        }

        self.enter(ScanPhase::Diffing);
        let stored = self.store.list_all_track_paths()?;
        let diff = diff_paths(&found.files, &stored, &found.unreadable);
        info!(
            "{} new and {} stale of {} catalogued tracks",
            diff.new_paths.len(),
            diff.stale_paths.len(),
            stored.len()
        );

        let mut pending = PendingChanges::default();
        for (index, path) in diff.new_paths.iter().enumerate() {
            self.enter(ScanPhase::Processing(index));
            let meta = match self.source.extract(path) {
                Ok(meta) => meta,
                Err(err) => {
                    warn!("Skipping {:?}: {}", path, err);
                    summary.skipped += 1;
                    continue;
                }
            };
            let track = self.resolve_track(path, meta)?;
            pending.create_track(track);
        }

        self.enter(ScanPhase::Cleaning);
        pending.delete_tracks(diff.stale_paths);

        let outcome = self.store.commit(pending)?;
        self.enter(ScanPhase::Committed);
        summary.added = outcome.added;
        summary.removed = outcome.removed;
        info!(
            "Library scan complete: {} added, {} removed, {} skipped",
            summary.added, summary.removed, summary.skipped
        );

        self.phase = ScanPhase::Idle;
        Ok(summary)
    }

    fn enter(&mut self, phase: ScanPhase) {
        match (self.phase, phase) {
            // per-file steps stay at debug
            (ScanPhase::Processing(_), ScanPhase::Processing(_)) => {
                debug!("Scan phase {} -> {}", self.phase, phase)
            }
            _ => info!("Scan phase {} -> {}", self.phase, phase),
        }
        self.phase = phase;
    }

    fn resolve_track(&mut self, path: &Path, meta: TrackMetadata) -> Result<NewTrack, LibraryError> {
        let artist = self.resolve_artist(&meta.album_artist)?;
        let album_id = self.resolve_album(path, &meta, artist.id)?;
        Ok(NewTrack {
            album_id,
            artist_id: artist.id,
            title: meta.title,
            track_number: meta.track_number.unwrap_or(0),
            disc_number: meta.disc_number.unwrap_or(1),
            duration_ms: meta.duration_ms,
            file_format: meta.file_format,
            bitrate: meta.bitrate,
            file_size: meta.file_size,
            file_path: path_to_string(path),
        })
    }

    fn resolve_artist(&mut self, name: &str) -> Result<Artist, LibraryError> {
        let key = name.to_lowercase();
        if let Some(artist) = self.artists.get(&key) {
            return Ok(artist.clone());
        }
        let artist = match self.store.find_artist_by_name(name)? {
            Some(artist) => artist,
            None => {
                let (artist, created) = self.store.create_artist_if_absent(name, &sort_name(name))?;
                if created {
                    info!("New artist: {}", artist.name);
                }
                artist
            }
        };
        self.artists.insert(key, artist.clone());
        Ok(artist)
    }

    fn resolve_album(
        &mut self,
        path: &Path,
        meta: &TrackMetadata,
        artist_id: u64,
    ) -> Result<u64, LibraryError> {
        let key = (meta.album.clone(), artist_id);
        if let Some(album_id) = self.albums.get(&key) {
            return Ok(*album_id);
        }
        let album = match self.store.find_album(&meta.album, artist_id)? {
            Some(album) => album,
            None => {
                let cover_art_path = path
                    .parent()
                    .and_then(resolve_cover_art)
                    .map(|cover| path_to_string(&cover));
                let (album, created) = self.store.create_album_if_absent(NewAlbum {
                    name: meta.album.clone(),
                    artist_id,
                    release_year: meta.year,
                    genre: Some(meta.genre.clone()),
                    cover_art_path,
                })?;
                if created {
                    info!("New album: {}", album.name);
                }
                album
            }
        };
        self.albums.insert(key, album.id);
        Ok(album.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metadata::{ExtractionError, MetadataError, TagInfo};
    use std::fs;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeSource {
        tags: HashMap<String, TagInfo>,
        broken: HashSet<String>,
    }

    impl FakeSource {
        fn with(mut self, file_name: &str, artist: &str, album: &str) -> Self {
            self.tags.insert(
                file_name.to_string(),
                TagInfo {
                    title: Some(file_name.to_string()),
                    album_artists: vec![artist.to_string()],
                    album: Some(album.to_string()),
                    year: Some(2001),
                    genres: vec!["Rock".to_string()],
                    track_no: Some(1),
                    disc_no: Some(1),
                    duration_ms: 180_000,
                    bitrate: Some(320),
                },
            );
            self
        }

        fn broken(mut self, file_name: &str) -> Self {
            self.broken.insert(file_name.to_string());
            self
        }
    }

    impl MetadataSource for FakeSource {
        fn extract(&self, path: &Path) -> Result<TrackMetadata, ExtractionError> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            if self.broken.contains(&name) {
                return Err(ExtractionError {
                    path: path.to_path_buf(),
                    source: MetadataError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "corrupt header",
                    )),
                });
            }
            let tags = self.tags.get(&name).cloned().unwrap_or_default();
            Ok(TrackMetadata::from_tags(path, tags, 42))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        store: CatalogStore,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("music");
            fs::create_dir_all(&root).unwrap();
            let db = CatalogStore::open_db(&dir.path().join("catalog.redb")).unwrap();
            let store = CatalogStore::new(db).unwrap();
            Self {
                _dir: dir,
                root,
                store,
            }
        }

        fn touch(&self, rel: &str) -> PathBuf {
            let path = self.root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"audio").unwrap();
            path
        }

        fn scan(&self, source: &FakeSource) -> ScanSummary {
            Scanner::new(&self.root, &self.store, source).run().unwrap()
        }
    }

    #[test]
    fn catalogs_the_foo_and_removes_deleted_tracks() {
        let fx = Fixture::new();
        fx.touch("The Foo/Bar/01.mp3");
        let second = fx.touch("The Foo/Bar/02.mp3");
        fx.touch("The Foo/Bar/cover.jpg");
        fx.touch("The Foo/Bar/folder.jpg");
        let source = FakeSource::default()
            .with("01.mp3", "The Foo", "Bar")
            .with("02.mp3", "The Foo", "Bar");

        let summary = fx.scan(&source);
        assert_eq!(summary, ScanSummary { added: 2, removed: 0, skipped: 0 });

        let artists = fx.store.list_artists().unwrap();
        assert_eq!(artists.len(), 1);
        assert_eq!(artists[0].name, "The Foo");
        assert_eq!(artists[0].sort_name, "Foo, The");

        let albums = fx.store.list_albums(Some(artists[0].id)).unwrap();
        assert_eq!(albums.len(), 1);
        let cover = path_to_string(&fx.root.join("The Foo/Bar/cover.jpg"));
        assert_eq!(albums[0].cover_art_path.as_deref(), Some(cover.as_str()));
        assert_eq!(albums[0].release_year, Some(2001));
        assert_eq!(fx.store.count_album_tracks(albums[0].id).unwrap(), 2);

        fs::remove_file(second).unwrap();
        let summary = fx.scan(&source);
        assert_eq!(summary, ScanSummary { added: 0, removed: 1, skipped: 0 });
        assert_eq!(fx.store.stats().unwrap().tracks, 1);
        assert_eq!(fx.store.stats().unwrap().albums, 1);
    }

    #[test]
    fn rescan_without_changes_is_a_no_op() {
        let fx = Fixture::new();
        fx.touch("a/1.mp3");
        fx.touch("b/2.flac");
        let source = FakeSource::default()
            .with("1.mp3", "A", "X")
            .with("2.flac", "B", "Y");

        fx.scan(&source);
        let tracks_before = fx.store.list_tracks().unwrap();
        let albums_before = fx.store.list_albums(None).unwrap();

        let summary = fx.scan(&source);
        assert_eq!(summary, ScanSummary::default());
        assert_eq!(fx.store.list_tracks().unwrap(), tracks_before);
        assert_eq!(fx.store.list_albums(None).unwrap(), albums_before);
    }

    #[test]
    fn artists_dedupe_ignoring_case() {
        let fx = Fixture::new();
        fx.touch("1.mp3");
        fx.touch("2.mp3");
        let source = FakeSource::default()
            .with("1.mp3", "Foo Fighters", "One")
            .with("2.mp3", "FOO FIGHTERS", "Two");

        fx.scan(&source);
        let artists = fx.store.list_artists().unwrap();
        assert_eq!(artists.len(), 1);
        assert_eq!(fx.store.count_artist_albums(artists[0].id).unwrap(), 2);
        assert_eq!(fx.store.count_artist_tracks(artists[0].id).unwrap(), 2);
    }

    #[test]
    fn albums_dedupe_across_folders() {
        let fx = Fixture::new();
        fx.touch("cd1/1.mp3");
        fx.touch("cd2/2.mp3");
        let source = FakeSource::default()
            .with("1.mp3", "A", "Double")
            .with("2.mp3", "A", "Double");

        fx.scan(&source);
        let albums = fx.store.list_albums(None).unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(fx.store.count_album_tracks(albums[0].id).unwrap(), 2);
    }

    #[test]
    fn only_visible_audio_files_become_tracks() {
        let fx = Fixture::new();
        fx.touch("a/song.mp3");
        fx.touch("a/LOUD.MP3");
        fx.touch("a/deep/nested/tune.ogg");
        fx.touch("a/take.wav");
        fx.touch("a/.hidden.mp3");
        fx.touch("a/._song.mp3");
        fx.touch("a/notes.txt");
        fx.touch("a/cover.jpg");

        let summary = fx.scan(&FakeSource::default());
        assert_eq!(summary.added, 4);

        let paths = fx.store.list_all_track_paths().unwrap();
        let expected: HashSet<String> = ["a/song.mp3", "a/LOUD.MP3", "a/deep/nested/tune.ogg", "a/take.wav"]
            .iter()
            .map(|rel| path_to_string(&fx.root.join(rel)))
            .collect();
        assert_eq!(paths, expected);
    }

    #[test]
    fn missing_tags_fall_back_to_defaults() {
        let fx = Fixture::new();
        fx.touch("untagged.flac");

        fx.scan(&FakeSource::default());
        let track = fx.store.list_tracks().unwrap().remove(0);
        assert_eq!(track.title, "untagged");
        assert_eq!(track.disc_number, 1);
        assert_eq!(track.track_number, 0);
        assert_eq!(track.file_format, "FLAC");

        let artist = fx.store.get_artist(track.artist_id).unwrap().unwrap();
        assert_eq!(artist.name, common::UNKNOWN_ALBUM_ARTIST);
        let album = fx.store.get_album(track.album_id).unwrap().unwrap();
        assert_eq!(album.name, common::UNKNOWN_ALBUM);
        assert_eq!(album.genre.as_deref(), Some(common::UNKNOWN_GENRE));
        assert_eq!(album.release_year, None);
        assert_eq!(album.cover_art_path, None);
    }

    #[test]
    fn unreadable_files_are_skipped_every_pass() {
        let fx = Fixture::new();
        fx.touch("good.mp3");
        fx.touch("bad.mp3");
        let source = FakeSource::default()
            .with("good.mp3", "A", "X")
            .broken("bad.mp3");

        let summary = fx.scan(&source);
        assert_eq!(summary, ScanSummary { added: 1, removed: 0, skipped: 1 });
        let summary = fx.scan(&source);
        assert_eq!(summary, ScanSummary { added: 0, removed: 0, skipped: 1 });
    }

    #[test]
    fn missing_root_scans_nothing() {
        let fx = Fixture::new();
        let gone = fx.root.join("not-here");
        let source = FakeSource::default();
        let mut scanner = Scanner::new(&gone, &fx.store, &source);
        assert_eq!(scanner.run().unwrap(), ScanSummary::default());
        assert_eq!(scanner.phase(), ScanPhase::Idle);
        assert_eq!(fx.store.stats().unwrap(), crate::LibraryStats::default());
    }

    #[test]
    fn concurrent_scans_do_not_duplicate_rows() {
        let fx = Fixture::new();
        let mut source = FakeSource::default();
        for n in 0..12 {
            let name = format!("{:02}.mp3", n);
            fx.touch(&format!("album{}/{}", n % 3, name));
            source = source.with(&name, &format!("Artist {}", n % 2), &format!("Album {}", n % 3));
        }
        let source = Arc::new(source);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let root = fx.root.clone();
                let store = fx.store.clone();
                let source = Arc::clone(&source);
                std::thread::spawn(move || {
                    Scanner::new(&root, &store, source.as_ref()).run().unwrap()
                })
            })
            .collect();
        let added: usize = handles
            .into_iter()
            .map(|handle| handle.join().unwrap().added)
            .sum();

        assert_eq!(added, 12);
        let stats = fx.store.stats().unwrap();
        assert_eq!(stats.tracks, 12);
        assert_eq!(stats.artists, 2);
        // (album name, artist) pairs: n % 3 and n % 2 cycle through all six combinations
        assert_eq!(stats.albums, 6);
    }

    #[test]
    fn diff_ignores_path_case() {
        let enumerated = vec![PathBuf::from("/m/A.mp3"), PathBuf::from("/m/new.mp3")];
        let stored: HashSet<String> = ["/m/a.MP3", "/m/gone.mp3"]
            .iter()
            .map(|p| p.to_string())
            .collect();

        let diff = diff_paths(&enumerated, &stored, &[]);
        assert_eq!(diff.new_paths, vec![PathBuf::from("/m/new.mp3")]);
        assert_eq!(diff.stale_paths, vec!["/m/gone.mp3".to_string()]);
    }

    #[test]
    fn audio_file_filter() {
        assert!(is_audio_file(Path::new("/m/a.Flac")));
        assert!(is_audio_file(Path::new("/m/a.ogg")));
        assert!(!is_audio_file(Path::new("/m/a.m4a")));
        assert!(!is_audio_file(Path::new("/m/.a.mp3")));
        assert!(!is_audio_file(Path::new("/m/._a.mp3")));
        assert!(!is_audio_file(Path::new("/m/mp3")));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_are_not_audio() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(OsStr::from_bytes(b"/m/\xff.mp3"));
        assert!(!is_audio_file(path));
    }

    #[test]
    fn diff_keeps_tracks_under_unreadable_dirs() {
        let enumerated = vec![PathBuf::from("/m/open/1.mp3")];
        let stored: HashSet<String> = [
            "/m/open/1.mp3",
            "/m/Locked/deep/2.mp3",
            "/m/lockedness/3.mp3",
        ]
        .iter()
        .map(|p| p.to_string())
        .collect();

        let diff = diff_paths(&enumerated, &stored, &[PathBuf::from("/m/locked")]);
        assert!(diff.new_paths.is_empty());
        assert_eq!(diff.stale_paths, vec!["/m/lockedness/3.mp3".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_keeps_its_tracks() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new();
        fx.touch("open/1.mp3");
        fx.touch("locked/2.mp3");
        let source = FakeSource::default()
            .with("1.mp3", "A", "X")
            .with("2.mp3", "B", "Y");
        assert_eq!(fx.scan(&source).added, 2);

        let locked = fx.root.join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // permission bits do not apply to root
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let found = collect_audio_files(&fx.root).unwrap();
        assert_eq!(found.unreadable, vec![locked.clone()]);
        let summary = fx.scan(&source);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(summary, ScanSummary::default());
        assert_eq!(fx.store.stats().unwrap().tracks, 2);
    }

    #[test]
    fn processing_phase_carries_the_file_index() {
        assert_eq!(ScanPhase::Processing(3).to_string(), "processing(3)");
        assert_eq!(ScanPhase::Cleaning.to_string(), "cleaning");
        assert_ne!(ScanPhase::Processing(0), ScanPhase::Processing(1));
    }
}
