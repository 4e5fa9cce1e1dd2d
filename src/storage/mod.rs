//! # Persistent stores
//!
//! Two small sled databases live under `storage.data_dir`:
//!
//! - [`PresenceStore`] - "last seen" and AFK records keyed by user id
//! - [`reminders::ReminderStore`] - durable reminder jobs keyed by uuid
//!
//! Records are bincode-encoded. Both stores are opened once per process and
//! shared by every session the controller builds, so only one session may
//! exist at a time.

pub mod reminders;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::transport::UserId;

const TREE_LAST_SEEN: &str = "last_seen";
const TREE_AFK: &str = "afk";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("time out of range: {0}")]
    OutOfRange(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSeen {
    pub user_id: UserId,
    pub nick: String,
    pub timestamp: DateTime<Utc>,
    /// What the user was doing, phrased to follow "when they ...".
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfkRecord {
    pub user_id: UserId,
    pub nick: String,
    pub reason: String,
    pub since: DateTime<Utc>,
}

fn user_key(user_id: UserId) -> [u8; 4] {
    user_id.to_be_bytes()
}

/// Sled-backed "last seen" and AFK records.
#[derive(Clone)]
pub struct PresenceStore {
    _db: sled::Db,
    last_seen: sled::Tree,
    afk: sled::Tree,
}

impl PresenceStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        Self::from_db(sled::open(path_ref)?)
    }

    /// Throwaway store that lives only as long as the process.
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let last_seen = db.open_tree(TREE_LAST_SEEN)?;
        let afk = db.open_tree(TREE_AFK)?;
        Ok(Self {
            _db: db,
            last_seen,
            afk,
        })
    }

    pub fn record_seen(&self, user_id: UserId, nick: &str, action: &str) -> Result<(), StoreError> {
        self.record_seen_at(user_id, nick, action, Utc::now())
    }

    pub fn record_seen_at(
        &self,
        user_id: UserId,
        nick: &str,
        action: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let record = LastSeen {
            user_id,
            nick: nick.to_string(),
            timestamp,
            action: action.to_string(),
        };
        self.last_seen
            .insert(user_key(user_id), bincode::serialize(&record)?)?;
        Ok(())
    }

    pub fn last_seen(&self, user_id: UserId) -> Result<Option<LastSeen>, StoreError> {
        match self.last_seen.get(user_key(user_id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Most recent record whose nickname matches `nick`, ignoring case.
    pub fn last_seen_by_nick(&self, nick: &str) -> Result<Option<LastSeen>, StoreError> {
        let wanted = nick.trim();
        let mut best: Option<LastSeen> = None;
        for item in self.last_seen.iter() {
            let (_, bytes) = item?;
            let record: LastSeen = bincode::deserialize(&bytes)?;
            if !record.nick.eq_ignore_ascii_case(wanted) {
                continue;
            }
            if best.as_ref().map_or(true, |b| record.timestamp > b.timestamp) {
                best = Some(record);
            }
        }
        Ok(best)
    }

    pub fn set_afk(&self, user_id: UserId, nick: &str, reason: &str) -> Result<AfkRecord, StoreError> {
        let record = AfkRecord {
            user_id,
            nick: nick.to_string(),
            reason: reason.to_string(),
            since: Utc::now(),
        };
        self.afk.insert(user_key(user_id), bincode::serialize(&record)?)?;
        Ok(record)
    }

    pub fn afk(&self, user_id: UserId) -> Result<Option<AfkRecord>, StoreError> {
        match self.afk.get(user_key(user_id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete the AFK record of a returning user, returning it if one existed.
    pub fn clear_afk(&self, user_id: UserId) -> Result<Option<AfkRecord>, StoreError> {
        match self.afk.remove(user_key(user_id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.last_seen.flush()?;
        self.afk.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn nickname_lookup_returns_most_recent_record() {
        let store = PresenceStore::temporary().unwrap();
        let now = Utc::now();
        store
            .record_seen_at(1, "Alice", "logged in", now - Duration::minutes(10))
            .unwrap();
        store
            .record_seen_at(2, "alice", "sent a message", now)
            .unwrap();
        let seen = store.last_seen_by_nick("ALICE").unwrap().unwrap();
        assert_eq!(seen.user_id, 2);
        assert_eq!(seen.action, "sent a message");
        assert!(store.last_seen_by_nick("bob").unwrap().is_none());
    }

    #[test]
    fn afk_is_deleted_on_return() {
        let store = PresenceStore::temporary().unwrap();
        store.set_afk(5, "eve", "lunch").unwrap();
        assert_eq!(store.afk(5).unwrap().unwrap().reason, "lunch");
        let cleared = store.clear_afk(5).unwrap();
        assert_eq!(cleared.map(|r| r.nick), Some("eve".to_string()));
        assert!(store.afk(5).unwrap().is_none());
        assert!(store.clear_afk(5).unwrap().is_none());
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PresenceStore::open(dir.path()).unwrap();
            store.record_seen(3, "carol", "joined a channel").unwrap();
            store.flush().unwrap();
        }
        let store = PresenceStore::open(dir.path()).unwrap();
        assert_eq!(store.last_seen(3).unwrap().unwrap().nick, "carol");
    }
}
