//! Per-application release version assignment.
//!
//! [`VersionSequencer::next_version`] must run on the same transaction that
//! inserts the new release row. The lock it takes is held until that
//! transaction commits or rolls back, so concurrent creators for the same
//! application queue behind each other while other applications proceed.

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnection;
use sqlx::Row;
use tracing::debug;

use crate::error::{ReleaseError, ReleaseResult};
use crate::types::{AppName, ReleaseVersion};

/// Lock taken while reading the current maximum version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencerLock {
    /// Transaction-scoped advisory lock keyed by application name.
    ///
    /// The lock exists whether or not the application has releases, so two
    /// concurrent first releases are serialised like any others.
    #[default]
    Application,

    /// `SELECT ... FOR UPDATE` on every release row of the application.
    ///
    /// The maximum is read by a second statement once the locks are held. A
    /// statement that waited on a lock keeps its old snapshot, so it cannot
    /// see the version the lock holder committed; the next statement can.
    /// Every creator locks the oldest release, so once one release exists
    /// they all queue on it.
    ///
    /// An application with no releases has no row to lock. Two concurrent
    /// first releases can both compute version 1; the second insert then
    /// fails on the `(app_id, version)` unique constraint and the caller
    /// sees a database error.
    Rows,
}

impl SequencerLock {
    /// Get the lock name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Rows => "rows",
        }
    }

    /// Whether concurrent creators are excluded before the first release exists.
    #[must_use]
    pub const fn covers_first_release(&self) -> bool {
        matches!(self, Self::Application)
    }
}

impl std::fmt::Display for SequencerLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Assigns strictly increasing release versions within a transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionSequencer {
    lock: SequencerLock,
}

impl VersionSequencer {
    /// Create a sequencer using the given lock strategy.
    #[must_use]
    pub const fn new(lock: SequencerLock) -> Self {
        Self { lock }
    }

    /// The configured lock strategy.
    #[must_use]
    pub const fn lock(&self) -> SequencerLock {
        self.lock
    }

    /// Lock the application's version sequence and return the next version.
    ///
    /// `conn` must be inside an open transaction. Errors are returned as-is;
    /// the caller is responsible for rolling back.
    pub async fn next_version(
        &self,
        conn: &mut PgConnection,
        app: &AppName,
    ) -> ReleaseResult<ReleaseVersion> {
        let current = match self.lock {
            SequencerLock::Application => {
                sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                    .bind(app.as_str())
                    .execute(&mut *conn)
                    .await?;

                max_version(conn, app).await?
            }
            SequencerLock::Rows => {
                sqlx::query(
                    r#"
                    SELECT version
                    FROM releases
                    WHERE app_id = $1
                    FOR UPDATE
                    "#,
                )
                .bind(app.as_str())
                .execute(&mut *conn)
                .await?;

                max_version(conn, app).await?
            }
        };

        let next = ReleaseVersion::successor(version_from_db(current)?);
        debug!(app = %app, lock = %self.lock, version = %next, "assigned release version");
        Ok(next)
    }
}

async fn max_version(conn: &mut PgConnection, app: &AppName) -> ReleaseResult<i64> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(MAX(version), 0) AS version
        FROM releases
        WHERE app_id = $1
        "#,
    )
    .bind(app.as_str())
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.get::<i64, _>("version"))
}

/// Convert a stored version, where 0 stands for "no releases".
pub(crate) fn version_from_db(raw: i64) -> ReleaseResult<Option<ReleaseVersion>> {
    let raw = u64::try_from(raw).map_err(|_| {
        ReleaseError::Serialisation(format!("negative release version in database: {raw}"))
    })?;
    Ok(ReleaseVersion::new(raw))
}

/// Convert a version for storage.
pub(crate) fn version_to_db(version: ReleaseVersion) -> ReleaseResult<i64> {
    i64::try_from(version.get()).map_err(|_| {
        ReleaseError::Serialisation(format!("release version out of range: {version}"))
    })
}
