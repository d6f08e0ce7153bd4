use std::sync::Arc;

use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition,
    TableError, TransactionError,
};
use serde::{Deserialize, Serialize};

const SETTINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");
const SERVER_SETTINGS_KEY: &str = "server";

pub const DEFAULT_SERVER_NAME: &str = "Audiarr";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub server_name: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
        }
    }
}

/// Single-record server settings kept beside the catalog tables.
#[derive(Clone)]
pub struct SettingsStore {
    db: Arc<Database>,
}

impl SettingsStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn init_tables(&self) -> Result<(), SettingsError> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(SETTINGS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn server_settings(&self) -> Result<ServerSettings, SettingsError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(SETTINGS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(ServerSettings::default()),
            Err(err) => return Err(err.into()),
        };
        let settings = match table.get(SERVER_SETTINGS_KEY)? {
            Some(value) => decode_value(value.value())?,
            None => ServerSettings::default(),
        };
        Ok(settings)
    }

    pub fn server_name(&self) -> Result<String, SettingsError> {
        Ok(self.server_settings()?.server_name)
    }

    /// Stores a new server name. Blank names are rejected.
    pub fn set_server_name(&self, name: &str) -> Result<ServerSettings, SettingsError> {
        if name.trim().is_empty() {
            return Err(SettingsError::EmptyName);
        }
        let settings = ServerSettings {
            server_name: name.to_string(),
        };
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS_TABLE)?;
            let bytes = encode_value(&settings)?;
            table.insert(SERVER_SETTINGS_KEY, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(settings)
    }
}

#[derive(Debug)]
pub enum SettingsError {
    EmptyName,
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::EmptyName => write!(f, "server name cannot be empty"),
            SettingsError::Redb(err) => write!(f, "db error: {}", err),
            SettingsError::Bincode(err) => write!(f, "bincode error: {}", err),
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<redb::Error> for SettingsError {
    fn from(err: redb::Error) -> Self {
        SettingsError::Redb(err)
    }
}

impl From<DatabaseError> for SettingsError {
    fn from(err: DatabaseError) -> Self {
        SettingsError::Redb(err.into())
    }
}

impl From<TableError> for SettingsError {
    fn from(err: TableError) -> Self {
        SettingsError::Redb(err.into())
    }
}

impl From<TransactionError> for SettingsError {
    fn from(err: TransactionError) -> Self {
        SettingsError::Redb(err.into())
    }
}

impl From<StorageError> for SettingsError {
    fn from(err: StorageError) -> Self {
        SettingsError::Redb(err.into())
    }
}

impl From<CommitError> for SettingsError {
    fn from(err: CommitError) -> Self {
        SettingsError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for SettingsError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        SettingsError::Bincode(err)
    }
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, SettingsError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, SettingsError> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store(dir: &std::path::Path) -> SettingsStore {
        let db = Arc::new(Database::create(dir.join("settings.redb")).unwrap());
        SettingsStore::new(db)
    }

    #[test]
    fn defaults_before_anything_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        assert_eq!(store.server_name().unwrap(), DEFAULT_SERVER_NAME);
        store.init_tables().unwrap();
        assert_eq!(store.server_name().unwrap(), DEFAULT_SERVER_NAME);
    }

    #[test]
    fn stores_and_replaces_the_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.init_tables().unwrap();

        store.set_server_name("Living Room").unwrap();
        assert_eq!(store.server_name().unwrap(), "Living Room");
        store.set_server_name("Basement").unwrap();
        assert_eq!(store.server_name().unwrap(), "Basement");
    }

    #[test]
    fn init_tables_is_safe_on_every_startup() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.init_tables().unwrap();
        store.set_server_name("Den").unwrap();
        drop(store);

        let store = open_store(dir.path());
        store.init_tables().unwrap();
        assert_eq!(store.server_name().unwrap(), "Den");
    }

    #[test]
    fn rejects_blank_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.set_server_name("Kept").unwrap();

        assert!(matches!(store.set_server_name("   "), Err(SettingsError::EmptyName)));
        assert_eq!(store.server_name().unwrap(), "Kept");
    }
}
