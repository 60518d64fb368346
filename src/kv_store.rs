use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::error::Error;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::utils;

/* The durable key-value store shared by the foreground process and the
background callback. Both sides may open their own handle to the same
underlying storage (e.g. the same sqlite file), so nothing in here can rely
on in-memory state being shared.
*/
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<()>> + Send;

    fn remove(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

impl<S: KvStore> KvStore for Arc<S> {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<()>> + Send {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).remove(key)
    }
}

#[derive(Default)]
pub struct MemoryKvStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.map
            .lock()
            .map_err(|_| anyhow!("memory kv store lock poisoned"))
    }
}

impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[allow(clippy::type_complexity)]
fn open_db_and_run_migration(
    support_dir: &str,
    file_name: &str,
    migrations: &[&dyn Fn(&Transaction) -> Result<()>],
) -> Result<Connection> {
    debug!("open and run migration for {}", file_name);
    let mut conn = Connection::open(Path::new(support_dir).join(file_name))?;
    let tx = conn.transaction()?;

    let version = utils::db::init_metadata_and_get_version(&tx)? as usize;
    let target_version = migrations.len();
    debug!(
        "current version = {}, target_version = {}",
        version, target_version
    );
    match version.cmp(&target_version) {
        Ordering::Equal => (),
        Ordering::Less => {
            for (i, migration) in migrations.iter().enumerate().skip(version) {
                info!("running migration for version: {}", i + 1);
                migration(&tx)?;
            }
            utils::db::set_version_in_metadata(&tx, target_version as i32)?;
        }
        Ordering::Greater => {
            bail!(
                "version too high: current version = {}, target_version = {}",
                version,
                target_version
            );
        }
    }
    tx.commit()?;
    Ok(conn)
}

pub const SESSION_DB_FILE_NAME: &str = "session.db";

/* `kv` holds whatever the session store puts in it, mostly json. `setting`
keeps user facing switches that should survive restarts (e.g. raw data mode).
*/
pub struct SqliteKvStore {
    conn: Mutex<Connection>,
}

impl SqliteKvStore {
    pub fn open(support_dir: &str) -> Result<SqliteKvStore> {
        let conn = open_db_and_run_migration(
            support_dir,
            SESSION_DB_FILE_NAME,
            &[&|tx| {
                let sql = "
                CREATE TABLE kv (
                    key               TEXT    PRIMARY KEY
                                              NOT NULL
                                              UNIQUE,
                    value             TEXT    NOT NULL
                );
                CREATE TABLE setting (
                    key               TEXT    PRIMARY KEY
                                              NOT NULL
                                              UNIQUE,
                    value             TEXT
                );
                ";
                tx.execute_batch(sql)?;
                Ok(())
            }],
        )?;
        Ok(SqliteKvStore {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, O>(&self, f: F) -> Result<O>
    where
        F: FnOnce(&mut Connection) -> Result<O>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("sqlite kv store lock poisoned"))?;
        f(&mut conn)
    }

    fn get_setting<T: FromStr>(&self, setting: Setting) -> Result<Option<T>>
    where
        <T as FromStr>::Err: Error + Send + Sync + 'static,
    {
        let result: Option<String> = self.with_conn(|conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM setting WHERE key = ?1;",
                    [setting.to_db_key()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })?;
        match result {
            None => Ok(None),
            Some(s) => {
                let v = FromStr::from_str(&s)?;
                Ok(Some(v))
            }
        }
    }

    pub fn get_setting_with_default<T: FromStr>(&self, setting: Setting, default: T) -> T
    where
        <T as FromStr>::Err: Error + Send + Sync + 'static,
    {
        match self.get_setting(setting) {
            Ok(v) => v,
            Err(error) => {
                warn!(
                    "[kv_store.get_setting_with_default] setting:{:?}, error:{}",
                    setting, error
                );
                None
            }
        }
        .unwrap_or(default)
    }

    pub fn set_setting<T: ToString>(&self, setting: Setting, value: T) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO setting (key, value) VALUES (?1, ?2);",
                (setting.to_db_key(), value.to_string()),
            )?;
            Ok(())
        })
    }
}

impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let mut query = conn.prepare_cached("SELECT value FROM kv WHERE key = ?1;")?;
            let value = query.query_row([key], |row| row.get(0)).optional()?;
            Ok(value)
        })
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.prepare_cached("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2);")?
                .execute((key, &value))?;
            tx.commit()?;
            Ok(())
        })
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1;", (key,))?;
            Ok(())
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Setting {
    RawDataMode,
}

impl Setting {
    fn to_db_key(self) -> &'static str {
        match self {
            Self::RawDataMode => "RAW_DATA_MODE",
        }
    }
}
