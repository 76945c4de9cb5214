use std::time::Duration;

pub const DEFAULT_MAPPING_CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct DbConfig {
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub sqlite: SqliteConfig,
    pub mapping_chunk_size: usize,
}

impl DbConfig {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty());

        let mapping_chunk_size =
            env_usize("TOPIC_MAPPING_CHUNK_SIZE", DEFAULT_MAPPING_CHUNK_SIZE).max(1);

        Self {
            database_url,
            sqlite: SqliteConfig::from_env(),
            mapping_chunk_size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub max_connections: u32,
    pub busy_timeout: Duration,
    pub journal_mode: SqliteJournalMode,
}

impl SqliteConfig {
    fn from_env() -> Self {
        let max_connections = env_u32("DB_MAX_CONNECTIONS", 5).max(1);
        let busy_timeout_ms = env_u64("SQLITE_BUSY_TIMEOUT_MS", 5000);
        let journal_mode = std::env::var("SQLITE_JOURNAL_MODE")
            .ok()
            .as_deref()
            .and_then(SqliteJournalMode::parse)
            .unwrap_or(SqliteJournalMode::Wal);

        Self {
            max_connections,
            busy_timeout: Duration::from_millis(busy_timeout_ms),
            journal_mode,
        }
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_millis(5000),
            journal_mode: SqliteJournalMode::Wal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqliteJournalMode {
    Wal,
    Delete,
    Truncate,
    Memory,
}

impl SqliteJournalMode {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "WAL" => Some(Self::Wal),
            "DELETE" => Some(Self::Delete),
            "TRUNCATE" => Some(Self::Truncate),
            "MEMORY" => Some(Self::Memory),
            _ => None,
        }
    }

    pub fn as_sqlx(self) -> sqlx::sqlite::SqliteJournalMode {
        match self {
            SqliteJournalMode::Wal => sqlx::sqlite::SqliteJournalMode::Wal,
            SqliteJournalMode::Delete => sqlx::sqlite::SqliteJournalMode::Delete,
            SqliteJournalMode::Truncate => sqlx::sqlite::SqliteJournalMode::Truncate,
            SqliteJournalMode::Memory => sqlx::sqlite::SqliteJournalMode::Memory,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}
