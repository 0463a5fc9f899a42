use anyhow::Result;
use rusqlite::{named_params, params, Connection, OptionalExtension};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// Durable string storage addressed by key. No transactional guarantees.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

pub struct Database {
    path: PathBuf,
    pub conn: Connection,
}

impl Database {
    pub fn from_path(path: PathBuf) -> Result<Database> {
        let connection = Connection::open(&path)?;
        let database = Self {
            path,
            conn: connection,
        };
        database.init()?;
        Ok(database)
    }

    pub fn in_memory() -> Result<Database> {
        let database = Self {
            path: PathBuf::from(":memory:"),
            conn: Connection::open_in_memory()?,
        };
        database.init()?;
        Ok(database)
    }

    pub fn init(&self) -> Result<()> {
        info!("Opening database at {}", self.path.display());
        self.conn.execute_batch(include_str!("../sql/schema.sql"))?;
        Ok(())
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM kv WHERE key = (?)")?;
        let value = stmt.query_row(params![key], |row| row.get(0)).optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        debug!("Writing {} to {}", key, self.path.display());
        let mut stmt = self
            .conn
            .prepare_cached(include_str!("../sql/upsert_kv.sql"))?;
        stmt.execute(named_params! {
            ":key": key,
            ":value": value,
        })?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
