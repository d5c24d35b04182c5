//! # Savefile Persistence
//!
//! The mock server can persist its whole store to a JSON file after every successful
//! mutation and load it again on startup.
//!
//! ## File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "saved_at": "2024-01-01T12:00:00Z",
//!   "data": { "index_sets": [], "users": [], "roles": [], ... }
//! }
//! ```
//!
//! Writes go to a sibling temporary file that is renamed over the savefile, so a reader
//! never observes a half-written document.
//!
//! ## Usage Examples
//!
//! ```rust
//! use graylog_mock::{DataStore, InMemoryDataStore, Role, SavefileManager};
//!
//! let path = std::env::temp_dir().join(format!("graylog-mock-doc-{}.json", std::process::id()));
//! let manager = SavefileManager::new(path.clone());
//!
//! let store = InMemoryDataStore::new();
//! store.add_role(Role::new("reader", &["users:list"])).unwrap();
//! manager.save_store(&store).unwrap();
//!
//! let snapshot = manager.load().unwrap().unwrap();
//! assert_eq!(snapshot.roles.len(), 1);
//! std::fs::remove_file(path).unwrap();
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DataStore, Snapshot};

/// Version written into new savefiles.
pub const SAVEFILE_VERSION: u32 = 1;

/// The document stored in a savefile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveFile {
    /// Format version.
    pub version: u32,
    /// When the snapshot was taken.
    pub saved_at: DateTime<Utc>,
    /// The store contents.
    pub data: Snapshot,
}

/// Writes and reads store snapshots at a fixed path.
#[derive(Debug)]
pub struct SavefileManager {
    savefile_path: PathBuf,
    write_lock: Mutex<()>,
}

impl SavefileManager {
    /// Creates a manager for the savefile at `savefile_path`.
    pub fn new(savefile_path: PathBuf) -> Self {
        Self {
            savefile_path,
            write_lock: Mutex::new(()),
        }
    }

    /// The savefile location.
    pub fn path(&self) -> &Path {
        &self.savefile_path
    }

    /// Writes a snapshot, replacing the previous savefile.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), std::io::Error> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| std::io::Error::other("savefile lock poisoned"))?;
        self.write_file(snapshot)
    }

    /// Snapshots `store` and writes it.
    ///
    /// The snapshot is taken while holding the write lock so that concurrent saves land
    /// in the order their snapshots were taken. No store lock is held during file I/O.
    pub fn save_store(&self, store: &dyn DataStore) -> Result<(), std::io::Error> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| std::io::Error::other("savefile lock poisoned"))?;
        let snapshot = store.snapshot().map_err(std::io::Error::other)?;
        self.write_file(&snapshot)
    }

    fn write_file(&self, snapshot: &Snapshot) -> Result<(), std::io::Error> {
        let document = SaveFile {
            version: SAVEFILE_VERSION,
            saved_at: Utc::now(),
            data: snapshot.clone(),
        };
        let json = serde_json::to_vec_pretty(&document)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut tmp_name = self.savefile_path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&json)?;
        file.flush()?;
        std::fs::rename(&tmp_path, &self.savefile_path)
    }

    /// Loads the snapshot from the savefile.
    ///
    /// # Returns
    /// * `Ok(None)` - No savefile exists yet
    /// * `Ok(Some(Snapshot))` - The stored snapshot
    /// * `Err(_)` - The file could not be read or parsed
    pub fn load(&self) -> Result<Option<Snapshot>, std::io::Error> {
        if !self.savefile_path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read(&self.savefile_path)?;
        let document: SaveFile = serde_json::from_slice(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if document.version != SAVEFILE_VERSION {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unsupported savefile version {}", document.version),
            ));
        }
        Ok(Some(document.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryDataStore, Role, User};
    use std::process;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn test_path(name: &str) -> PathBuf {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "test_savefile_{}_{}_{}.json",
            name,
            process::id(),
            timestamp
        ))
    }

    #[test]
    fn missing_savefile_loads_as_none() {
        let manager = SavefileManager::new(test_path("missing"));
        assert!(manager.load().unwrap().is_none());
    }

    #[test]
    fn save_and_load_round_trip_a_store() {
        let path = test_path("roundtrip");
        let manager = SavefileManager::new(path.clone());

        let store = InMemoryDataStore::new();
        store.add_role(Role::new("reader", &["users:list"])).unwrap();
        let mut user = User::new("alice", "secret");
        user.roles = vec!["reader".to_string()];
        store.add_user(user).unwrap();
        manager.save_store(&store).unwrap();

        let snapshot = manager.load().unwrap().unwrap();
        assert_eq!(snapshot, store.snapshot().unwrap());
        assert_eq!(snapshot.users[0].password.as_deref(), Some("secret"));

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        assert!(!PathBuf::from(tmp).exists());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn corrupt_savefile_is_an_error() {
        let path = test_path("corrupt");
        std::fs::write(&path, b"not json").unwrap();
        let manager = SavefileManager::new(path.clone());
        assert!(manager.load().is_err());
        std::fs::remove_file(path).unwrap();
    }
}
