pub mod chats;
pub mod events;
pub mod goals;
pub mod mental_states;
pub mod migrations;
pub mod notifications;

pub use chats::ChatRepository;
pub use events::EventRepository;
pub use goals::{DependencyError, GoalRepository};
pub use mental_states::MentalStateRepository;
pub use notifications::NotificationRepository;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use directories::BaseDirs;
use duckdb::types::Type;
use duckdb::Connection;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Shared handle to the DuckDB database. Cloning shares the connection.
#[derive(Clone)]
pub struct Persistence {
    conn: Arc<Mutex<Connection>>,
}

impl Persistence {
    /// Create or open the database at the provided path and run migrations.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = expand_tilde(db_path.as_ref())?;
        if let Some(dir) = db_path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).context("creating DB directory")?;
            }
        }
        let conn = Connection::open(&db_path).context("opening DuckDB")?;
        migrations::run(&conn).context("running migrations")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, used by tests and the `mock` provider demo.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory DuckDB")?;
        migrations::run(&conn).context("running migrations")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates or opens the default database at ~/.aimi/aimi.duckdb
    pub fn new_default() -> Result<Self> {
        let base = BaseDirs::new().context("base directories not available")?;
        let path = base.home_dir().join(".aimi").join("aimi.duckdb");
        Self::new(path)
    }

    /// Checkpoint the database so WAL data lands in the main file before shutdown.
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch("CHECKPOINT;")
            .context("checkpointing database")
    }

    /// Exclusive access to the shared connection.
    ///
    /// A poisoned lock only means another thread panicked mid-call; DuckDB
    /// rolls back the open transaction on drop, so the connection stays usable.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` inside one transaction. Returning an error (or panicking)
    /// drops the transaction, which rolls it back.
    pub fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<duckdb::Error>,
        F: FnOnce(&Connection) -> std::result::Result<T, E>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let path_str = path.to_string_lossy();
    if path_str == "~" {
        let base = BaseDirs::new().context("base directories not available")?;
        Ok(base.home_dir().to_path_buf())
    } else if let Some(stripped) = path_str.strip_prefix("~/") {
        let base = BaseDirs::new().context("base directories not available")?;
        Ok(base.home_dir().join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

// ---------- Column codecs ----------
//
// Timestamps are written as text and cast by DuckDB, and read back with
// `CAST(col AS TEXT)`, so the Rust side owns every clock value.

const TIMESTAMP_WRITE: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TIMESTAMP_READ: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Current time at the precision DuckDB stores, so written and re-read values compare equal.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_WRITE).to_string()
}

pub(crate) fn date_to_sql(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn conversion_error<E>(idx: usize, err: E) -> duckdb::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn ts_from_sql(idx: usize, raw: &str) -> duckdb::Result<DateTime<Utc>> {
    let trimmed = raw.trim_end_matches("+00");
    NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_READ)
        .map(|naive| naive.and_utc())
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_ts_from_sql(
    idx: usize,
    raw: Option<String>,
) -> duckdb::Result<Option<DateTime<Utc>>> {
    raw.map(|s| ts_from_sql(idx, &s)).transpose()
}

pub(crate) fn date_from_sql(idx: usize, raw: &str) -> duckdb::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_date_from_sql(idx: usize, raw: Option<String>) -> duckdb::Result<Option<NaiveDate>> {
    raw.map(|s| date_from_sql(idx, &s)).transpose()
}

pub(crate) fn uuid_from_sql(idx: usize, raw: &str) -> duckdb::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_uuid_from_sql(idx: usize, raw: Option<String>) -> duckdb::Result<Option<Uuid>> {
    raw.map(|s| uuid_from_sql(idx, &s)).transpose()
}

pub(crate) fn enum_from_sql<T>(idx: usize, raw: &str) -> duckdb::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_enum_from_sql<T>(idx: usize, raw: Option<String>) -> duckdb::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.map(|s| enum_from_sql(idx, &s)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn expands_home_directory_prefix() {
        let base = BaseDirs::new().expect("home directory available");
        let expected = base.home_dir().join("aimi.duckdb");
        let result = expand_tilde(Path::new("~/aimi.duckdb")).expect("path expansion succeeds");
        assert_eq!(result, expected);
    }

    #[test]
    fn leaves_regular_paths_unchanged() {
        let input = Path::new("relative/aimi.duckdb");
        let result = expand_tilde(input).expect("path expansion succeeds");
        assert_eq!(result, input);
    }

    #[test]
    fn timestamps_survive_text_round_trip() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(ts_from_sql(0, &ts_to_sql(&ts)).unwrap(), ts);
        // DuckDB drops the fraction when it is zero
        assert_eq!(ts_from_sql(0, "2025-03-14 09:26:53").unwrap(), ts);
    }

    #[test]
    fn bad_uuid_is_a_conversion_failure() {
        let err = uuid_from_sql(3, "nope").unwrap_err();
        assert!(matches!(err, duckdb::Error::FromSqlConversionFailure(3, _, _)));
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let db = Persistence::in_memory().unwrap();
        let result: Result<(), anyhow::Error> = db.transaction(|conn| {
            conn.execute(
                "INSERT INTO chats (id, user_id, model, last_seq, created_at) VALUES ('c', 'u', 'm', 0, CAST('2025-01-01 00:00:00' AS TIMESTAMP))",
                [],
            )?;
            anyhow::bail!("abort");
        });
        assert!(result.is_err());

        let conn = db.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
