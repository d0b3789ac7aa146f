pub mod accounts;
pub mod migrations;
pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

pub use accounts::{DEFAULT_HEADER_IMAGE_URL, DEFAULT_IMAGE_URL};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// UNIQUE, NOT NULL or FOREIGN KEY rejected by the schema.
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("password must not be empty")]
    MissingPassword,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("unsupported database url: {0}")]
    Url(String),

    #[error("database lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl Error {
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, msg)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Constraint(msg.clone().unwrap_or_else(|| err.to_string()))
            }
            _ => Self::Sqlite(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Where `DATABASE_URL` points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

impl DatabaseLocation {
    /// Accepts `sqlite::memory:`, `:memory:`, `sqlite://path`, `sqlite:path`
    /// or a bare filesystem path.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);

        if path == ":memory:" {
            return Ok(Self::Memory);
        }
        if path.is_empty() || path.contains("://") {
            return Err(Error::Url(url.to_string()));
        }
        Ok(Self::File(PathBuf::from(path)))
    }
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn connect(url: &str) -> Result<Self> {
        match DatabaseLocation::parse(url)? {
            DatabaseLocation::Memory => Self::open_in_memory(),
            DatabaseLocation::File(path) => Self::open(&path),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Fresh private database, used by the test suites.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| Error::Poisoned)?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| Error::Poisoned)?;
        f(&mut conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_database_urls() {
        assert_eq!(DatabaseLocation::parse("sqlite::memory:").unwrap(), DatabaseLocation::Memory);
        assert_eq!(DatabaseLocation::parse(":memory:").unwrap(), DatabaseLocation::Memory);
        assert_eq!(
            DatabaseLocation::parse("sqlite://warbler_test.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("warbler_test.db"))
        );
        assert_eq!(
            DatabaseLocation::parse("sqlite:data/warbler.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("data/warbler.db"))
        );
        assert_eq!(
            DatabaseLocation::parse("warbler.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("warbler.db"))
        );
    }

    #[test]
    fn rejects_foreign_urls() {
        assert!(matches!(
            DatabaseLocation::parse("postgresql:///warbler_test"),
            Err(Error::Url(_))
        ));
        assert!(matches!(DatabaseLocation::parse(""), Err(Error::Url(_))));
    }

    #[test]
    fn migrations_are_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| migrations::run(conn)).unwrap();

        let version: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(version, migrations::CURRENT_VERSION);
    }
}
