//! In-memory release store for testing.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{ReleaseError, ReleaseResult};
use crate::formation::{Formation, Process};
use crate::types::{AppName, NewRelease, Release, ReleaseId, ReleaseVersion};

use super::{ProcessStore, ReleaseStore};

/// Releases of one application, oldest first.
type Ledger = Arc<Mutex<Vec<Release>>>;

/// In-memory release and process store for testing.
///
/// Each application's releases sit behind their own async mutex, which plays
/// the role of the transaction lock: creators for one application are
/// serialised while other applications proceed. The ledger is created under
/// the map's write lock, so first releases are serialised too. Release ids
/// are unique across every application, as with the PostgreSQL primary key.
///
/// This implementation is not suitable for production use as data is lost
/// when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    releases: RwLock<HashMap<AppName, Ledger>>,
    ids: RwLock<HashSet<ReleaseId>>,
    processes: RwLock<HashMap<ReleaseId, Formation>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ledger(&self, app: &AppName) -> ReleaseResult<Option<Ledger>> {
        let releases = self
            .releases
            .read()
            .map_err(|_| ReleaseError::internal("lock poisoned"))?;

        Ok(releases.get(app).cloned())
    }

    fn ledger_or_insert(&self, app: &AppName) -> ReleaseResult<Ledger> {
        let mut releases = self
            .releases
            .write()
            .map_err(|_| ReleaseError::internal("lock poisoned"))?;

        Ok(Arc::clone(releases.entry(app.clone()).or_default()))
    }
}

#[async_trait]
impl ReleaseStore for MemoryStore {
    async fn create(&self, release: NewRelease) -> ReleaseResult<Release> {
        let ledger = self.ledger_or_insert(&release.app)?;
        let mut ledger = ledger.lock().await;

        {
            let mut ids = self
                .ids
                .write()
                .map_err(|_| ReleaseError::internal("lock poisoned"))?;
            if !ids.insert(release.id.clone()) {
                return Err(ReleaseError::internal(format!(
                    "release {} already exists",
                    release.id
                )));
            }
        }

        let version = ReleaseVersion::successor(ledger.last().map(|r| r.version));
        let release = release.into_release(version);
        ledger.push(release.clone());

        Ok(release)
    }

    async fn find_by_app(&self, app: &AppName) -> ReleaseResult<Vec<Release>> {
        let Some(ledger) = self.ledger(app)? else {
            return Ok(Vec::new());
        };

        let ledger = ledger.lock().await;
        Ok(ledger.iter().rev().cloned().collect())
    }

    async fn head(&self, app: &AppName) -> ReleaseResult<Option<Release>> {
        let Some(ledger) = self.ledger(app)? else {
            return Ok(None);
        };

        let ledger = ledger.lock().await;
        Ok(ledger.last().cloned())
    }

    async fn previous(
        &self,
        app: &AppName,
        version: ReleaseVersion,
    ) -> ReleaseResult<Option<Release>> {
        let Some(ledger) = self.ledger(app)? else {
            return Ok(None);
        };

        let ledger = ledger.lock().await;
        Ok(ledger.iter().rev().find(|r| r.version < version).cloned())
    }
}

#[async_trait]
impl ProcessStore for MemoryStore {
    async fn all(&self, release_id: &ReleaseId) -> ReleaseResult<Formation> {
        let processes = self
            .processes
            .read()
            .map_err(|_| ReleaseError::internal("lock poisoned"))?;

        Ok(processes.get(release_id).cloned().unwrap_or_default())
    }

    async fn create(&self, release_id: &ReleaseId, process: &Process) -> ReleaseResult<Process> {
        let mut processes = self
            .processes
            .write()
            .map_err(|_| ReleaseError::internal("lock poisoned"))?;

        let formation = processes.entry(release_id.clone()).or_default();
        if formation.get(&process.process_type).is_some() {
            return Err(ReleaseError::internal(format!(
                "process {} already exists for release {release_id}",
                process.process_type
            )));
        }

        formation.insert(process.clone());
        Ok(process.clone())
    }
}
