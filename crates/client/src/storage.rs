//! Persistent key/value storage as JSON files in the platform config
//! directory:
//!   - Linux: `~/.config/luci/`
//!   - macOS: `~/Library/Application Support/luci/`
//!   - Windows: `%APPDATA%\luci\`

use std::io;
use std::path::{Path, PathBuf};

use luci_shared::SessionIdentity;
use serde::{de::DeserializeOwned, Serialize};

use crate::ws::TransportManager;

const APP_DIR: &str = "luci";
const SESSION_KEY: &str = "session";

/// A directory of JSON documents addressed by key.
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The platform config directory, if the platform has one.
    pub fn platform_default() -> Option<Self> {
        Some(Self::at(dirs::config_dir()?.join(APP_DIR)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, key: &str) -> PathBuf {
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{}.json", safe_key))
    }

    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.file_path(key), json)
    }

    /// `None` if the key does not exist or does not deserialize.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = std::fs::read_to_string(self.file_path(key)).ok()?;
        match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, "ignoring unreadable stored value: {}", e);
                None
            }
        }
    }

    pub fn remove(&self, key: &str) -> io::Result<()> {
        match std::fs::remove_file(self.file_path(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.file_path(key).exists()
    }
}

/// The signed-in identity, kept across restarts.
#[derive(Debug, Clone)]
pub struct SessionStore {
    storage: Storage,
}

impl SessionStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn save(&self, identity: &SessionIdentity) -> io::Result<()> {
        self.storage.save(SESSION_KEY, identity)
    }

    pub fn load(&self) -> Option<SessionIdentity> {
        self.storage
            .load::<SessionIdentity>(SESSION_KEY)
            .filter(|s| !s.user_id.trim().is_empty())
    }

    pub fn clear(&self) -> io::Result<()> {
        self.storage.remove(SESSION_KEY)
    }

    /// End the session: forget the identity and fully close the realtime
    /// connection, dropping every listener.
    pub fn logout(&self, transport: &TransportManager) -> io::Result<()> {
        transport.disconnect();
        tracing::info!("logged out");
        self.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::{ConnectionState, ReconnectConfig, TransportKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn session_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(Storage::at(dir.path().join("nested")));
        assert_eq!(store.load(), None);

        let identity = SessionIdentity {
            user_id: "U1".into(),
            display_name: Some("Ann".into()),
            email: None,
        };
        store.save(&identity).unwrap();
        assert_eq!(store.load(), Some(identity));

        store.clear().unwrap();
        assert_eq!(store.load(), None);
        store.clear().unwrap();
    }

    #[test]
    fn corrupt_file_reads_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("session.json"), "{not json").unwrap();
        let store = SessionStore::new(Storage::at(dir.path()));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn keys_are_sanitized() {
        let storage = Storage::at("/tmp/x");
        assert_eq!(storage.file_path("a/b:c"), PathBuf::from("/tmp/x/a_b_c.json"));
    }

    #[tokio::test]
    async fn logout_disconnects_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(Storage::at(dir.path()));
        store.save(&SessionIdentity::new("U1")).unwrap();

        let transport = TransportManager::new(
            "http://127.0.0.1:9",
            ReconnectConfig::default(),
            TransportKind::default_order(),
        );
        let _rx = transport.attach_loopback("U1");
        transport.on("booking_accepted", |_| {});

        store.logout(&transport).unwrap();
        assert_eq!(store.load(), None);
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(transport.listener_count("booking_accepted"), 0);
    }
}
