//! Release and process storage backends.
//!
//! This module provides traits and implementations for persisting releases
//! and their formations. The primary implementation uses PostgreSQL, but an
//! in-memory implementation is provided for testing.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;

use crate::error::ReleaseResult;
use crate::formation::{Formation, Process};
use crate::types::{AppName, NewRelease, Release, ReleaseId, ReleaseVersion};

/// Backend for storing release records.
///
/// Releases are immutable: there is no update or delete.
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Assign the next version for the release's application and insert it.
    ///
    /// Version assignment and insert happen in one transaction. On failure
    /// the transaction is rolled back and nothing is written.
    async fn create(&self, release: NewRelease) -> ReleaseResult<Release>;

    /// List all releases of an application, newest first.
    async fn find_by_app(&self, app: &AppName) -> ReleaseResult<Vec<Release>>;

    /// Get the release with the highest version.
    ///
    /// Returns `None` if the application has no releases.
    async fn head(&self, app: &AppName) -> ReleaseResult<Option<Release>>;

    /// Get the release with the highest version below `version`.
    ///
    /// Returns `None` if `version` is the application's first release.
    async fn previous(
        &self,
        app: &AppName,
        version: ReleaseVersion,
    ) -> ReleaseResult<Option<Release>>;
}

/// Backend for storing the processes that make up a release's formation.
#[async_trait]
pub trait ProcessStore: Send + Sync {
    /// Load the formation of a release.
    ///
    /// Returns an empty formation if the release has no processes.
    async fn all(&self, release_id: &ReleaseId) -> ReleaseResult<Formation>;

    /// Persist one process for a release.
    async fn create(&self, release_id: &ReleaseId, process: &Process) -> ReleaseResult<Process>;
}
