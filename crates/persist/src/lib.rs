//! Helmdock persistence: per-tab state rows scoped by storage key.
//! Keep code tiny and predictable.

#![forbid(unsafe_code)]

use anyhow::{anyhow, Context, Result};
use metrics::{counter, histogram};
use rustc_hash::FxHashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Keyed storage backing a tab store. `storage_key` scopes rows so stores never collide.
pub trait Storage: Send + Sync {
    fn put(&self, storage_key: &str, tab_id: &str, value: &serde_json::Value) -> Result<()>;
    fn get(&self, storage_key: &str, tab_id: &str) -> Result<Option<serde_json::Value>>;
    fn delete(&self, storage_key: &str, tab_id: &str) -> Result<()>;
    /// All rows for a storage key, ordered by tab id. Rows that do not parse are skipped.
    fn load_all(&self, storage_key: &str) -> Result<Vec<(String, serde_json::Value)>>;
}

/// SQLite-backed storage. Simple, synchronous; rows are small JSON blobs.
pub struct SqliteStorage {
    db: Mutex<rusqlite::Connection>,
}

impl SqliteStorage {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("HELMDOCK_DB_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", &"WAL").ok();
        db.pragma_update(None, "synchronous", &"NORMAL").ok();
        db.execute(
            "CREATE TABLE IF NOT EXISTS tab_state (
                storage_key TEXT NOT NULL,
                tab_id      TEXT NOT NULL,
                ts          INTEGER NOT NULL,
                json        TEXT NOT NULL,
                PRIMARY KEY (storage_key, tab_id)
            )",
            [],
        ).context("creating tab_state table")?;
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        debug!(path = %path, "persist: sqlite opened");
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.db.lock().map_err(|_| anyhow!("sqlite connection mutex poisoned"))
    }
}

impl Storage for SqliteStorage {
    fn put(&self, storage_key: &str, tab_id: &str, value: &serde_json::Value) -> Result<()> {
        let started = std::time::Instant::now();
        let json = serde_json::to_string(value).context("encoding tab state")?;
        let db = self.conn()?;
        db.execute(
            "INSERT INTO tab_state(storage_key, tab_id, ts, json) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(storage_key, tab_id) DO UPDATE SET ts = excluded.ts, json = excluded.json",
            (storage_key, tab_id, now_ts(), &json),
        )?;
        histogram!("persist_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_put_total", 1u64);
        Ok(())
    }

    fn get(&self, storage_key: &str, tab_id: &str) -> Result<Option<serde_json::Value>> {
        let started = std::time::Instant::now();
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT json FROM tab_state WHERE storage_key = ?1 AND tab_id = ?2")?;
        let mut rows = stmt.query((storage_key, tab_id))?;
        let out = match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                Some(serde_json::from_str(&json).context("decoding tab state")?)
            }
            None => None,
        };
        histogram!("persist_get_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(out)
    }

    fn delete(&self, storage_key: &str, tab_id: &str) -> Result<()> {
        let db = self.conn()?;
        db.execute("DELETE FROM tab_state WHERE storage_key = ?1 AND tab_id = ?2", (storage_key, tab_id))?;
        counter!("persist_delete_total", 1u64);
        Ok(())
    }

    fn load_all(&self, storage_key: &str) -> Result<Vec<(String, serde_json::Value)>> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT tab_id, json FROM tab_state WHERE storage_key = ?1 ORDER BY tab_id")?;
        let mut rows = stmt.query([storage_key])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let tab_id: String = row.get(0)?;
            let json: String = row.get(1)?;
            match serde_json::from_str(&json) {
                Ok(value) => out.push((tab_id, value)),
                Err(e) => {
                    warn!(key = %storage_key, tab = %tab_id, error = %e, "persist: skipping unreadable row");
                    counter!("persist_decode_errors_total", 1u64);
                }
            }
        }
        Ok(out)
    }
}

/// In-memory storage for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
    rows: Mutex<FxHashMap<(String, String), serde_json::Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }

    fn rows(&self) -> Result<std::sync::MutexGuard<'_, FxHashMap<(String, String), serde_json::Value>>> {
        self.rows.lock().map_err(|_| anyhow!("memory storage mutex poisoned"))
    }
}

impl Storage for MemoryStorage {
    fn put(&self, storage_key: &str, tab_id: &str, value: &serde_json::Value) -> Result<()> {
        self.rows()?.insert((storage_key.to_string(), tab_id.to_string()), value.clone());
        Ok(())
    }

    fn get(&self, storage_key: &str, tab_id: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.rows()?.get(&(storage_key.to_string(), tab_id.to_string())).cloned())
    }

    fn delete(&self, storage_key: &str, tab_id: &str) -> Result<()> {
        self.rows()?.remove(&(storage_key.to_string(), tab_id.to_string()));
        Ok(())
    }

    fn load_all(&self, storage_key: &str) -> Result<Vec<(String, serde_json::Value)>> {
        let rows = self.rows()?;
        let mut out: Vec<(String, serde_json::Value)> = rows
            .iter()
            .filter(|((k, _), _)| k == storage_key)
            .map(|((_, tab), v)| (tab.clone(), v.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".helmdock");
        let _ = std::fs::create_dir_all(&p);
        p.push("helmdock.db");
        return p.to_string_lossy().to_string();
    }
    // Fallback to current directory
    "helmdock.db".to_string()
}

/// Seconds since epoch.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_db() -> String {
        let dir = std::env::temp_dir();
        static SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
        let f = format!("helmdock-test-{}-{}-{}.db", std::process::id(), nanos, seq);
        dir.join(f).to_string_lossy().to_string()
    }

    #[test]
    fn sqlite_put_get_replace_delete() {
        let path = temp_db();
        let s = SqliteStorage::open(&path).unwrap();
        s.put("install_charts", "tab-1", &json!({"name": "a", "version": "1"})).unwrap();
        s.put("install_charts", "tab-1", &json!({"name": "a", "version": "2"})).unwrap();
        let got = s.get("install_charts", "tab-1").unwrap().unwrap();
        assert_eq!(got["version"], "2");
        s.delete("install_charts", "tab-1").unwrap();
        assert!(s.get("install_charts", "tab-1").unwrap().is_none());
    }

    #[test]
    fn sqlite_storage_keys_do_not_collide() {
        let path = temp_db();
        let s = SqliteStorage::open(&path).unwrap();
        s.put("install_charts", "tab-1", &json!({"name": "a"})).unwrap();
        s.put("install_charts_versions", "tab-1", &json!(["2", "1"])).unwrap();
        let data = s.load_all("install_charts").unwrap();
        let versions = s.load_all("install_charts_versions").unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(versions, vec![("tab-1".to_string(), json!(["2", "1"]))]);
    }

    #[test]
    fn sqlite_rows_survive_reopen() {
        let path = temp_db();
        {
            let s = SqliteStorage::open(&path).unwrap();
            s.put("install_charts", "b", &json!(1)).unwrap();
            s.put("install_charts", "a", &json!(2)).unwrap();
        }
        let s = SqliteStorage::open(&path).unwrap();
        let rows = s.load_all("install_charts").unwrap();
        assert_eq!(rows.iter().map(|(t, _)| t.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn sqlite_skips_unreadable_rows() {
        let path = temp_db();
        let s = SqliteStorage::open(&path).unwrap();
        s.put("install_charts", "good", &json!({"name": "nginx"})).unwrap();
        s.conn()
            .unwrap()
            .execute(
                "INSERT INTO tab_state(storage_key, tab_id, ts, json) VALUES ('install_charts', 'bad', 0, '{not json')",
                [],
            )
            .unwrap();
        s.put("install_charts", "later", &json!({"name": "redis"})).unwrap();

        let rows = s.load_all("install_charts").unwrap();
        assert_eq!(rows.iter().map(|(t, _)| t.as_str()).collect::<Vec<_>>(), vec!["good", "later"]);
    }

    #[test]
    fn memory_storage_scopes_by_key() {
        let s = MemoryStorage::new();
        s.put("x", "t", &json!("one")).unwrap();
        s.put("y", "t", &json!("two")).unwrap();
        assert_eq!(s.get("x", "t").unwrap(), Some(json!("one")));
        s.delete("x", "t").unwrap();
        assert!(s.get("x", "t").unwrap().is_none());
        assert_eq!(s.load_all("y").unwrap().len(), 1);
    }
}
