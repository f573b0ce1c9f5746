//! PostgreSQL release store implementation.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, warn};

use crate::config::DatabaseConfig;
use crate::error::{ReleaseError, ReleaseResult};
use crate::formation::{Constraints, Formation, Process};
use crate::sequencer::{version_from_db, version_to_db, VersionSequencer};
use crate::types::{
    AppName, ConfigId, NewRelease, ProcessType, Release, ReleaseId, ReleaseVersion, SlugId,
};

use super::{ProcessStore, ReleaseStore};

/// PostgreSQL-backed release and process store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    sequencer: VersionSequencer,
}

impl PostgresStore {
    /// Connect to PostgreSQL and create a new store.
    ///
    /// The required tables are created if they don't exist.
    pub async fn new(url: &str, sequencer: VersionSequencer) -> ReleaseResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;

        Self::from_pool(pool, sequencer).await
    }

    /// Connect using pool settings from configuration.
    pub async fn from_config(
        config: &DatabaseConfig,
        sequencer: VersionSequencer,
    ) -> ReleaseResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        Self::from_pool(pool, sequencer).await
    }

    /// Create a store from an existing connection pool.
    pub async fn from_pool(pool: PgPool, sequencer: VersionSequencer) -> ReleaseResult<Self> {
        let store = Self { pool, sequencer };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Ensure the required tables exist.
    async fn ensure_schema(&self) -> ReleaseResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS releases (
                id TEXT PRIMARY KEY,
                app_id TEXT NOT NULL,
                version BIGINT NOT NULL CHECK (version >= 1),
                config_id TEXT NOT NULL,
                slug_id TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (app_id, version)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processes (
                release_id TEXT NOT NULL REFERENCES releases(id),
                process_type TEXT NOT NULL,
                command TEXT NOT NULL,
                quantity BIGINT NOT NULL,
                memory_mb BIGINT NOT NULL,
                cpu_shares BIGINT NOT NULL,
                PRIMARY KEY (release_id, process_type)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Parse a row into a Release.
    fn row_to_release(row: &PgRow) -> ReleaseResult<Release> {
        let raw_version: i64 = row.get("version");
        let version = version_from_db(raw_version)?.ok_or_else(|| {
            ReleaseError::Serialisation(format!("invalid release version: {raw_version}"))
        })?;

        Ok(Release {
            id: ReleaseId::new(row.get::<String, _>("id")),
            version,
            app: AppName::new(row.get::<String, _>("app_id")),
            config_id: ConfigId::new(row.get::<String, _>("config_id")),
            slug_id: SlugId::new(row.get::<String, _>("slug_id")),
            created_at: row.get("created_at"),
        })
    }

    /// Parse a row into a Process.
    fn row_to_process(row: &PgRow) -> ReleaseResult<Process> {
        Ok(Process {
            process_type: ProcessType::new(row.get::<String, _>("process_type")),
            command: row.get("command"),
            quantity: u32_column(row, "quantity")?,
            constraints: Constraints {
                memory_mb: u32_column(row, "memory_mb")?,
                cpu_shares: u32_column(row, "cpu_shares")?,
            },
        })
    }

    async fn insert_release(&self, release: NewRelease) -> ReleaseResult<Release> {
        let mut tx = self.pool.begin().await?;

        let version = self.sequencer.next_version(&mut tx, &release.app).await?;
        let release = release.into_release(version);

        sqlx::query(
            r#"
            INSERT INTO releases (id, app_id, version, config_id, slug_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(release.id.as_str())
        .bind(release.app.as_str())
        .bind(version_to_db(release.version)?)
        .bind(release.config_id.as_str())
        .bind(release.slug_id.as_str())
        .bind(release.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(release)
    }
}

fn u32_column(row: &PgRow, column: &str) -> ReleaseResult<u32> {
    let raw: i64 = row.get(column);
    u32::try_from(raw)
        .map_err(|_| ReleaseError::Serialisation(format!("{column} out of range: {raw}")))
}

#[async_trait]
impl ReleaseStore for PostgresStore {
    async fn create(&self, release: NewRelease) -> ReleaseResult<Release> {
        let app = release.app.clone();

        // Dropping an uncommitted transaction rolls it back.
        match self.insert_release(release).await {
            Ok(release) => {
                debug!(app = %app, release_id = %release.id, version = %release.version, "release inserted");
                Ok(release)
            }
            Err(e) => {
                warn!(app = %app, lock = %self.sequencer.lock(), error = %e, "release insert rolled back");
                Err(e)
            }
        }
    }

    async fn find_by_app(&self, app: &AppName) -> ReleaseResult<Vec<Release>> {
        let rows = sqlx::query(
            r#"
            SELECT id, app_id, version, config_id, slug_id, created_at
            FROM releases
            WHERE app_id = $1
            ORDER BY version DESC
            "#,
        )
        .bind(app.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_release).collect()
    }

    async fn head(&self, app: &AppName) -> ReleaseResult<Option<Release>> {
        let row = sqlx::query(
            r#"
            SELECT id, app_id, version, config_id, slug_id, created_at
            FROM releases
            WHERE app_id = $1
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(app.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_release).transpose()
    }

    async fn previous(
        &self,
        app: &AppName,
        version: ReleaseVersion,
    ) -> ReleaseResult<Option<Release>> {
        let row = sqlx::query(
            r#"
            SELECT id, app_id, version, config_id, slug_id, created_at
            FROM releases
            WHERE app_id = $1 AND version < $2
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(app.as_str())
        .bind(version_to_db(version)?)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_release).transpose()
    }
}

#[async_trait]
impl ProcessStore for PostgresStore {
    async fn all(&self, release_id: &ReleaseId) -> ReleaseResult<Formation> {
        let rows = sqlx::query(
            r#"
            SELECT process_type, command, quantity, memory_mb, cpu_shares
            FROM processes
            WHERE release_id = $1
            "#,
        )
        .bind(release_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_process).collect()
    }

    async fn create(&self, release_id: &ReleaseId, process: &Process) -> ReleaseResult<Process> {
        sqlx::query(
            r#"
            INSERT INTO processes (
                release_id, process_type, command, quantity, memory_mb, cpu_shares
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(release_id.as_str())
        .bind(process.process_type.as_str())
        .bind(&process.command)
        .bind(i64::from(process.quantity))
        .bind(i64::from(process.constraints.memory_mb))
        .bind(i64::from(process.constraints.cpu_shares))
        .execute(&self.pool)
        .await?;

        Ok(process.clone())
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore")
            .field("lock", &self.sequencer.lock())
            .finish_non_exhaustive()
    }
}
