//! sqlite-adapter: SQLite implementation of the `Repository` port.
//!
//! Purpose
//! - Provide a file-based store for running the service without extra
//!   infrastructure.
//! - Implements the `Repository` trait from the `domain` crate.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - `short_code` is the PRIMARY KEY, so duplicate inserts fail atomically and
//!   surface as `CoreError::Conflict`.
//! - Hits are incremented in SQL (`hits = hits + 1`), never read-modify-write.
//! - Stores expiry as whole seconds since UNIX_EPOCH plus a nanosecond
//!   remainder column, so it round-trips exactly.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use domain::{CoreError, Repository, ShortCode, ShortUrl};
use rusqlite::{params, Connection, OptionalExtension};

const SELECT_COLUMNS: &str =
    "SELECT short_code, full_url, expiry_date, hits, is_deleted, expiry_nanos FROM urls";

/// SQLite-backed repository.
pub struct SqliteRepo {
    conn: Mutex<Connection>,
}

impl SqliteRepo {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(map_sqerr)?;
        Self::from_connection(conn)
    }

    /// A private in-memory database; contents vanish with the value.
    #[cfg(test)]
    fn in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqerr)?;
        Self::from_connection(conn)
    }

    /// Open the database at `path`, creating parent directories first.
    pub fn open_creating_dirs<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        if let Some(dir) = path.as_ref().parent() {
            std::fs::create_dir_all(dir).map_err(map_sqerr)?;
        }
        Self::new(path)
    }

    fn from_connection(conn: Connection) -> Result<Self, CoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Storage("mutex poisoned".into()))
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS urls (
            short_code TEXT PRIMARY KEY,
            full_url TEXT NOT NULL,
            expiry_date INTEGER,
            hits INTEGER NOT NULL DEFAULT 0,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            expiry_nanos INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )
    .map_err(map_sqerr)?;

    // databases created before expiry_nanos existed
    if conn.prepare("SELECT expiry_nanos FROM urls LIMIT 0").is_err() {
        conn.execute_batch("ALTER TABLE urls ADD COLUMN expiry_nanos INTEGER NOT NULL DEFAULT 0;")
            .map_err(map_sqerr)?;
    }
    Ok(())
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::Storage(format!("sqlite error: {e}"))
}

/// Split into (seconds, subsecond nanos) since UNIX_EPOCH.
fn system_time_to_parts(t: SystemTime) -> (i64, i64) {
    let d = t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    (
        i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        i64::from(d.subsec_nanos()),
    )
}

fn parts_to_system_time(secs: i64, nanos: i64) -> SystemTime {
    let nanos = u32::try_from(nanos.clamp(0, 999_999_999)).unwrap_or(0);
    UNIX_EPOCH + Duration::new(secs.max(0) as u64, nanos)
}

fn row_to_short_url(row: &rusqlite::Row) -> Result<ShortUrl, CoreError> {
    let code: String = row.get(0).map_err(map_sqerr)?;
    let target_url: String = row.get(1).map_err(map_sqerr)?;
    let expiry: Option<i64> = row.get(2).map_err(map_sqerr)?;
    let hits: i64 = row.get(3).map_err(map_sqerr)?;
    let deleted: i64 = row.get(4).map_err(map_sqerr)?;
    let expiry_nanos: i64 = row.get(5).map_err(map_sqerr)?;

    let code = ShortCode::new(code)
        .map_err(|e| CoreError::Storage(format!("bad short_code in db: {e}")))?;
    Ok(ShortUrl {
        code,
        target_url,
        expiry: expiry.map(|secs| parts_to_system_time(secs, expiry_nanos)),
        hits: hits.max(0) as u64,
        deleted: deleted != 0,
    })
}

fn collect_rows(mut rows: rusqlite::Rows<'_>) -> Result<Vec<ShortUrl>, CoreError> {
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(map_sqerr)? {
        out.push(row_to_short_url(row)?);
    }
    Ok(out)
}

impl Repository for SqliteRepo {
    fn find_by_code(&self, code: &ShortCode) -> Result<Option<ShortUrl>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE short_code = ?1"))
            .map_err(map_sqerr)?;
        let mut rows = stmt.query(params![code.as_str()]).map_err(map_sqerr)?;
        match rows.next().map_err(map_sqerr)? {
            Some(row) => Ok(Some(row_to_short_url(row)?)),
            None => Ok(None),
        }
    }

    fn exists_by_code(&self, code: &ShortCode) -> Result<bool, CoreError> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM urls WHERE short_code = ?1",
                params![code.as_str()],
                |_| Ok(()),
            )
            .optional()
            .map_err(map_sqerr)?;
        Ok(found.is_some())
    }

    fn insert(&self, record: ShortUrl) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let expiry = record.expiry.map(system_time_to_parts);
        let res = conn.execute(
            "INSERT INTO urls(short_code, full_url, expiry_date, expiry_nanos, hits, is_deleted) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.code.as_str(),
                record.target_url,
                expiry.map(|(secs, _)| secs),
                expiry.map_or(0, |(_, nanos)| nanos),
                record.hits as i64,
                record.deleted as i64,
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(CoreError::Conflict(record.code.to_string()))
            }
            Err(e) => Err(map_sqerr(e)),
        }
    }

    fn increment_hits(&self, code: &ShortCode) -> Result<usize, CoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE urls SET hits = hits + 1 WHERE short_code = ?1",
            params![code.as_str()],
        )
        .map_err(map_sqerr)
    }

    fn mark_deleted(&self, code: &ShortCode) -> Result<usize, CoreError> {
        let conn = self.lock()?;
        // SQLite counts every matched row, so repeat deletes still report 1.
        conn.execute(
            "UPDATE urls SET is_deleted = 1 WHERE short_code = ?1",
            params![code.as_str()],
        )
        .map_err(map_sqerr)
    }

    fn search(&self, substring: Option<&str>) -> Result<Vec<ShortUrl>, CoreError> {
        let conn = self.lock()?;
        match substring {
            // instr() is case-sensitive and has no LIKE wildcards to escape
            Some(s) => {
                let mut stmt = conn
                    .prepare(&format!("{SELECT_COLUMNS} WHERE instr(full_url, ?1) > 0 ORDER BY rowid"))
                    .map_err(map_sqerr)?;
                let rows = stmt.query(params![s]).map_err(map_sqerr)?;
                collect_rows(rows)
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!("{SELECT_COLUMNS} ORDER BY rowid"))
                    .map_err(map_sqerr)?;
                let rows = stmt.query([]).map_err(map_sqerr)?;
                collect_rows(rows)
            }
        }
    }
}
