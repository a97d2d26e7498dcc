use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::error::{Result, StoreError};

/// One downloadable content package for a game.
///
/// `path` is stored relative to the installation root with forward
/// slashes regardless of host OS; `present_on_disk` implies a non-null
/// path that stays inside the root.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct GameDataRecord {
    pub id: i64,
    pub game_id: String,
    pub sha256: String,
    pub size: i64,
    pub present_on_disk: bool,
    pub path: Option<String>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS game (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    active_data_id INTEGER,
    active_data_on_disk INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS game_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id TEXT NOT NULL,
    sha256 TEXT NOT NULL,
    size INTEGER NOT NULL,
    present_on_disk INTEGER NOT NULL DEFAULT 0,
    path TEXT
);
CREATE INDEX IF NOT EXISTS idx_game_data_game ON game_data(game_id);
";

/// SQLite-backed store for the handful of fields the delivery core reads
/// and writes to record download state.
#[derive(Clone)]
pub struct GameDataStore {
    pool: Pool<Sqlite>,
    install_root: PathBuf,
}

impl GameDataStore {
    /// Open (creating if missing) the database at `db_path`.
    pub async fn open(db_path: &Path, install_root: impl Into<PathBuf>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))
            .map_err(StoreError::Db)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::with_pool(pool, install_root).await
    }

    /// In-memory database, used by tests and by collaborators that stage
    /// state before committing to a real file.
    pub async fn in_memory(install_root: impl Into<PathBuf>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool, install_root).await
    }

    async fn with_pool(pool: Pool<Sqlite>, install_root: impl Into<PathBuf>) -> Result<Self> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self {
            pool,
            install_root: install_root.into(),
        })
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// Resolve a stored relative path against the installation root,
    /// rejecting escapes. Validation, not trust.
    pub fn resolve_path(&self, relative: &str) -> Result<PathBuf> {
        Ok(webarc_fs::safe_join(&self.install_root, relative)?)
    }

    pub async fn game_data(&self, id: i64) -> Result<Option<GameDataRecord>> {
        let record = sqlx::query_as::<_, GameDataRecord>(
            "SELECT id, game_id, sha256, size, present_on_disk, path
             FROM game_data WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// The record the owning game's active pointer currently designates.
    pub async fn active_data_for_game(&self, game_id: &str) -> Result<Option<GameDataRecord>> {
        let record = sqlx::query_as::<_, GameDataRecord>(
            "SELECT d.id, d.game_id, d.sha256, d.size, d.present_on_disk, d.path
             FROM game_data d
             JOIN game g ON g.active_data_id = d.id
             WHERE g.id = ?",
        )
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Record a completed import: set the relative path and presence flag,
    /// and flip the owning game's denormalized flag when its active
    /// pointer matches this record. One transaction; atomic across both
    /// tables.
    pub async fn mark_downloaded(&self, id: i64, relative_path: &str) -> Result<()> {
        // Reject escapes before any write happens.
        self.resolve_path(relative_path)?;

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE game_data SET present_on_disk = 1, path = ? WHERE id = ?",
        )
        .bind(relative_path)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        sqlx::query(
            "UPDATE game SET active_data_on_disk = 1
             WHERE active_data_id = ?
               AND id = (SELECT game_id FROM game_data WHERE id = ?)",
        )
        .bind(id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::info!(id, path = relative_path, "marked game data downloaded");
        Ok(())
    }

    /// Reverse of [`mark_downloaded`](Self::mark_downloaded).
    pub async fn mark_not_downloaded(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE game_data SET present_on_disk = 0, path = NULL WHERE id = ?",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        sqlx::query(
            "UPDATE game SET active_data_on_disk = 0
             WHERE active_data_id = ?
               AND id = (SELECT game_id FROM game_data WHERE id = ?)",
        )
        .bind(id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::info!(id, "marked game data not downloaded");
        Ok(())
    }

    /// Seed a game row. Collaborating subsystems own the full catalog;
    /// the core only needs the active pointer.
    pub async fn upsert_game(&self, game_id: &str, active_data_id: Option<i64>) -> Result<()> {
        sqlx::query(
            "INSERT INTO game (id, active_data_id) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET active_data_id = excluded.active_data_id",
        )
        .bind(game_id)
        .bind(active_data_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Seed a data record. `path` carries a historical relative location
    /// when catalog metadata already knows one; presence starts false
    /// either way.
    pub async fn insert_game_data(
        &self,
        game_id: &str,
        sha256: &str,
        size: i64,
        path: Option<&str>,
    ) -> Result<i64> {
        if let Some(path) = path {
            self.resolve_path(path)?;
        }
        let result = sqlx::query(
            "INSERT INTO game_data (game_id, sha256, size, path) VALUES (?, ?, ?, ?)",
        )
        .bind(game_id)
        .bind(sha256)
        .bind(size)
        .bind(path)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Denormalized flag on the owning game, for tests and diagnostics.
    pub async fn game_active_data_on_disk(&self, game_id: &str) -> Result<bool> {
        let flag: Option<(bool,)> =
            sqlx::query_as("SELECT active_data_on_disk FROM game WHERE id = ?")
                .bind(game_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(flag.map(|(v,)| v).unwrap_or(false))
    }
}
