mod cover;
mod scan;
mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use metadata::{LoftyExtractor, MetadataSource};
use redb::{CommitError, Database, DatabaseError, StorageError, TableError, TransactionError};
use serde::{Deserialize, Serialize};
use tracing::info;

pub use cover::resolve_cover_art;
pub use scan::{
    collect_audio_files, diff_paths, is_audio_file, Enumeration, ScanDiff, ScanPhase, ScanSummary,
    Scanner,
};
pub use store::{CatalogStore, CommitOutcome, NewAlbum, NewTrack, PendingChanges};

/// A music folder bound to the catalog that mirrors it.
#[derive(Clone)]
pub struct Library {
    root: PathBuf,
    store: CatalogStore,
    source: Arc<dyn MetadataSource>,
}

impl Library {
    pub fn open(root: PathBuf, db_path: &Path) -> Result<Self, LibraryError> {
        let db = CatalogStore::open_db(db_path)?;
        Self::with_db(root, db)
    }

    pub fn with_db(root: PathBuf, db: Arc<Database>) -> Result<Self, LibraryError> {
        let store = CatalogStore::new(db)?;
        info!("Catalog opened for {}", root.display());
        Ok(Self {
            root,
            store,
            source: Arc::new(LoftyExtractor),
        })
    }

    /// Replaces the tag reader used by scans.
    pub fn with_source(mut self, source: Arc<dyn MetadataSource>) -> Self {
        self.source = source;
        self
    }

    /// Brings the catalog in line with the files currently under the root.
    pub fn run_scan(&self) -> Result<ScanSummary, LibraryError> {
        Scanner::new(&self.root, &self.store, self.source.as_ref()).run()
    }

    pub fn stats(&self) -> Result<LibraryStats, LibraryError> {
        self.store.stats()
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.store
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryStats {
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
}

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
    Integrity(String),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Redb(err) => write!(f, "db error: {}", err),
            LibraryError::Bincode(err) => write!(f, "bincode error: {}", err),
            LibraryError::Integrity(message) => write!(f, "integrity error: {}", message),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<redb::Error> for LibraryError {
    fn from(err: redb::Error) -> Self {
        LibraryError::Redb(err)
    }
}

impl From<DatabaseError> for LibraryError {
    fn from(err: DatabaseError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<TableError> for LibraryError {
    fn from(err: TableError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<TransactionError> for LibraryError {
    fn from(err: TransactionError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<StorageError> for LibraryError {
    fn from(err: StorageError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<CommitError> for LibraryError {
    fn from(err: CommitError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for LibraryError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        LibraryError::Bincode(err)
    }
}
