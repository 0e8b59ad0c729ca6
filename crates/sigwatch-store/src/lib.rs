//! # sigwatch-store
//!
//! The narrow persistence interface the engine consumes, plus the SQLite
//! backend. The engine never holds a transaction across a suspension
//! point: every trait call is one self-contained read or write.

use std::path::Path;
use std::sync::Mutex;

use sigwatch_core::{Result, SigwatchError};

/// Chat role bitmask values.
pub mod role {
    pub const USER: u32 = 1;
    pub const MODERATOR: u32 = 2;
    pub const MASTER: u32 = 4;
    pub const DEVELOPER: u32 = 8;
}

/// A persisted listener definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerDef {
    pub listener_id: i64,
    pub name: String,
    /// Driver kind tag: `files`, `folders`, `sql`.
    pub kind: String,
    /// Kind-specific JSON parameter blob.
    pub parameters: String,
    pub cron: String,
    pub active: bool,
}

/// A known chat with its role bitmask.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRow {
    pub chat_id: i64,
    pub name: String,
    /// `private`, `group`, ...
    pub kind: String,
    pub role: u32,
    pub active: bool,
}

impl ChatRow {
    pub fn has_role(&self, bit: u32) -> bool {
        self.role & bit != 0
    }
}

/// Narrow storage interface; the engine owns no schema knowledge beyond it.
pub trait Storage: Send + Sync {
    /// Listener definitions, optionally restricted to active ones.
    fn listeners(&self, active_only: bool) -> Result<Vec<ListenerDef>>;
    /// Chat ids subscribed to a listener. With `active_only`, only active
    /// subscriptions of active chats count.
    fn subscribers(&self, listener_id: i64, active_only: bool) -> Result<Vec<i64>>;
    /// Known chats, optionally active and/or private only.
    fn chats(&self, active_only: bool, private_only: bool) -> Result<Vec<ChatRow>>;
    /// Upserts used by the external administrative surface.
    fn set_chat(&self, chat: &ChatRow) -> Result<()>;
    fn set_listener(&self, def: &ListenerDef) -> Result<()>;
    fn set_subscription(&self, chat_id: i64, listener_id: i64, active: bool) -> Result<()>;
}

/// SQLite-backed storage.
pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    /// Open or create the database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| SigwatchError::Storage(format!("DB open: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| SigwatchError::Storage(format!("DB open: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "
            -- Source definitions the actualizer reconciles against
            CREATE TABLE IF NOT EXISTS listeners (
                listener_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,              -- 'files', 'folders', 'sql'
                parameters TEXT NOT NULL DEFAULT '{}',  -- JSON payload
                cron TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            -- Chats messages can be delivered to
            CREATE TABLE IF NOT EXISTS chats (
                chat_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'private',
                role INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            -- chat <-> listener subscriptions
            CREATE TABLE IF NOT EXISTS subscriptions (
                subscription_id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                listener_id INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (chat_id, listener_id)
            );
            ",
            )
            .map_err(|e| SigwatchError::Storage(format!("Migration: {e}")))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| SigwatchError::Storage("Connection lock poisoned".into()))
    }
}

impl Storage for SqliteStore {
    fn listeners(&self, active_only: bool) -> Result<Vec<ListenerDef>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT listener_id, name, kind, parameters, cron, active
                 FROM listeners WHERE (?1 = 0 OR active = 1) ORDER BY listener_id",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([active_only as i64], |row| {
                Ok(ListenerDef {
                    listener_id: row.get(0)?,
                    name: row.get(1)?,
                    kind: row.get(2)?,
                    parameters: row.get(3)?,
                    cron: row.get(4)?,
                    active: row.get(5)?,
                })
            })
            .map_err(storage_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)
    }

    fn subscribers(&self, listener_id: i64, active_only: bool) -> Result<Vec<i64>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT s.chat_id FROM subscriptions s
                 JOIN chats c ON c.chat_id = s.chat_id
                 WHERE s.listener_id = ?1
                   AND (?2 = 0 OR (s.active = 1 AND c.active = 1))
                 ORDER BY s.chat_id",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([listener_id, active_only as i64], |row| row.get(0))
            .map_err(storage_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)
    }

    fn chats(&self, active_only: bool, private_only: bool) -> Result<Vec<ChatRow>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT chat_id, name, kind, role, active FROM chats
                 WHERE (?1 = 0 OR active = 1) AND (?2 = 0 OR kind = 'private')
                 ORDER BY chat_id",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([active_only as i64, private_only as i64], |row| {
                Ok(ChatRow {
                    chat_id: row.get(0)?,
                    name: row.get(1)?,
                    kind: row.get(2)?,
                    role: row.get(3)?,
                    active: row.get(4)?,
                })
            })
            .map_err(storage_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)
    }

    fn set_chat(&self, chat: &ChatRow) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO chats (chat_id, name, kind, role, active) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (chat_id) DO UPDATE SET
                   name = excluded.name, kind = excluded.kind, role = excluded.role,
                   active = excluded.active, updated = CURRENT_TIMESTAMP",
                rusqlite::params![chat.chat_id, chat.name, chat.kind, chat.role, chat.active],
            )
            .map_err(storage_err)?;
        tracing::debug!("💾 Chat {} [{}] saved", chat.name, chat.chat_id);
        Ok(())
    }

    fn set_listener(&self, def: &ListenerDef) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO listeners (listener_id, name, kind, parameters, cron, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (listener_id) DO UPDATE SET
                   name = excluded.name, kind = excluded.kind, parameters = excluded.parameters,
                   cron = excluded.cron, active = excluded.active, updated = CURRENT_TIMESTAMP",
                rusqlite::params![
                    def.listener_id,
                    def.name,
                    def.kind,
                    def.parameters,
                    def.cron,
                    def.active
                ],
            )
            .map_err(storage_err)?;
        tracing::debug!("💾 Listener {} [{}] saved", def.name, def.listener_id);
        Ok(())
    }

    fn set_subscription(&self, chat_id: i64, listener_id: i64, active: bool) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO subscriptions (chat_id, listener_id, active) VALUES (?1, ?2, ?3)
                 ON CONFLICT (chat_id, listener_id) DO UPDATE SET
                   active = excluded.active, updated = CURRENT_TIMESTAMP",
                rusqlite::params![chat_id, listener_id, active],
            )
            .map_err(storage_err)?;
        Ok(())
    }
}

fn storage_err(e: rusqlite::Error) -> SigwatchError {
    SigwatchError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(chat_id: i64, role: u32, active: bool) -> ChatRow {
        ChatRow {
            chat_id,
            name: format!("chat-{chat_id}"),
            kind: "private".into(),
            role,
            active,
        }
    }

    fn listener(listener_id: i64, active: bool) -> ListenerDef {
        ListenerDef {
            listener_id,
            name: format!("listener-{listener_id}"),
            kind: "files".into(),
            parameters: "{\"paths\": []}".into(),
            cron: "*/5 * * * *".into(),
            active,
        }
    }

    #[test]
    fn test_listener_upsert_and_filter() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_listener(&listener(1, true)).unwrap();
        store.set_listener(&listener(2, false)).unwrap();

        assert_eq!(store.listeners(false).unwrap().len(), 2);
        let active = store.listeners(true).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].listener_id, 1);

        // Upsert replaces, it never duplicates.
        let mut updated = listener(1, true);
        updated.cron = "0 8 * * *".into();
        store.set_listener(&updated).unwrap();
        let all = store.listeners(false).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].cron, "0 8 * * *");
    }

    #[test]
    fn test_subscribers_respect_active_flags() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_listener(&listener(1, true)).unwrap();
        for id in 1..=4 {
            store.set_chat(&chat(id, role::USER, id != 4)).unwrap();
        }
        store.set_subscription(1, 1, true).unwrap();
        store.set_subscription(2, 1, true).unwrap();
        store.set_subscription(3, 1, false).unwrap(); // inactive subscription
        store.set_subscription(4, 1, true).unwrap(); // inactive chat

        assert_eq!(store.subscribers(1, true).unwrap(), vec![1, 2]);
        assert_eq!(store.subscribers(1, false).unwrap().len(), 4);
    }

    #[test]
    fn test_subscription_toggle() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_chat(&chat(1, role::USER, true)).unwrap();
        store.set_subscription(1, 9, true).unwrap();
        store.set_subscription(1, 9, false).unwrap();
        assert!(store.subscribers(9, true).unwrap().is_empty());
    }

    #[test]
    fn test_private_chat_role_filter() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_chat(&chat(1, role::USER | role::DEVELOPER, true)).unwrap();
        store.set_chat(&chat(2, role::USER, true)).unwrap();
        let mut group = chat(3, role::DEVELOPER, true);
        group.kind = "group".into();
        store.set_chat(&group).unwrap();

        let privates = store.chats(true, true).unwrap();
        assert_eq!(privates.len(), 2);
        let devs: Vec<i64> = privates
            .iter()
            .filter(|c| c.has_role(role::DEVELOPER))
            .map(|c| c.chat_id)
            .collect();
        assert_eq!(devs, vec![1]);
    }
}
