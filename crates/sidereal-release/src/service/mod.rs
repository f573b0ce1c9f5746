//! Release creation orchestration.
//!
//! Creating a release is a sequence of independent steps:
//!
//! 1. Insert the release, assigning its version under the sequencer lock
//! 2. Load the formation of the release before it
//! 3. Derive the new formation from that and the slug's process types
//! 4. Persist each process of the new formation
//! 5. Hand the release to the scheduler
//!
//! Only step 1 is transactional. A failure in steps 2-5 leaves the release
//! (and any processes already written) in place and is reported as
//! [`ReleaseError::Incomplete`]. Nothing is retried or cleaned up.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::ReleaseConfig;
use crate::error::{ReleaseError, ReleaseResult};
use crate::formation::{Formation, FormationBuilder};
use crate::scheduler::{HttpScheduler, Scheduler};
use crate::sequencer::VersionSequencer;
use crate::store::{PostgresStore, ProcessStore, ReleaseStore};
use crate::types::{App, Config, NewRelease, Release, Slug};

/// Creates releases and hands them to the scheduler.
pub struct ReleaseService {
    releases: Arc<dyn ReleaseStore>,
    processes: Arc<dyn ProcessStore>,
    scheduler: Arc<dyn Scheduler>,
    formations: FormationBuilder,
}

impl ReleaseService {
    /// Create a new release service.
    pub fn new(
        releases: Arc<dyn ReleaseStore>,
        processes: Arc<dyn ProcessStore>,
        scheduler: Arc<dyn Scheduler>,
        formations: FormationBuilder,
    ) -> Self {
        Self {
            releases,
            processes,
            scheduler,
            formations,
        }
    }

    /// Connect to PostgreSQL and the scheduler API using configuration.
    pub async fn connect(config: &ReleaseConfig) -> ReleaseResult<Self> {
        let sequencer = VersionSequencer::new(config.sequencer.lock);
        let store = Arc::new(PostgresStore::from_config(&config.database, sequencer).await?);
        info!(lock = %config.sequencer.lock, "connected to PostgreSQL");
        if !config.sequencer.lock.covers_first_release() {
            warn!(
                lock = %config.sequencer.lock,
                "concurrent first releases of an application can conflict; \
                 the losing create fails with a database error"
            );
        }

        let scheduler = Arc::new(HttpScheduler::new(&config.scheduler)?);
        info!(url = %config.scheduler.url, "scheduler client configured");

        Ok(Self::new(
            Arc::clone(&store) as Arc<dyn ReleaseStore>,
            store,
            scheduler,
            FormationBuilder::from_config(&config.formation),
        ))
    }

    /// Create a release of `slug` with `config` for `app` and schedule it.
    ///
    /// If the release insert fails, nothing has been written and the store's
    /// error is returned. Any later failure returns
    /// [`ReleaseError::Incomplete`] carrying the committed release.
    pub async fn create(&self, app: &App, config: &Config, slug: &Slug) -> ReleaseResult<Release> {
        let new = NewRelease::new(app.name.clone(), config.id.clone(), slug.id.clone());

        let release = self.releases.create(new).await?;
        info!(
            app = %release.app,
            release_id = %release.id,
            version = %release.version,
            "release created"
        );

        if let Err(e) = self.complete(&release, config, slug).await {
            error!(
                app = %release.app,
                release_id = %release.id,
                version = %release.version,
                error = %e,
                "release persisted but not completed"
            );
            return Err(ReleaseError::incomplete(release, e));
        }

        Ok(release)
    }

    /// List all releases of an application, newest first.
    pub async fn find_by_app(&self, app: &App) -> ReleaseResult<Vec<Release>> {
        self.releases.find_by_app(&app.name).await
    }

    /// Get the current release of an application, if it has any.
    pub async fn head(&self, app: &App) -> ReleaseResult<Option<Release>> {
        self.releases.head(&app.name).await
    }

    /// Load the persisted formation of a release.
    pub async fn formation(&self, release: &Release) -> ReleaseResult<Formation> {
        self.processes.all(&release.id).await
    }

    async fn complete(&self, release: &Release, config: &Config, slug: &Slug) -> ReleaseResult<()> {
        let formation = self.create_formation(release, slug).await?;
        self.scheduler
            .schedule_release(release, config, slug, &formation)
            .await
    }

    async fn create_formation(&self, release: &Release, slug: &Slug) -> ReleaseResult<Formation> {
        let existing = match self.releases.previous(&release.app, release.version).await? {
            Some(previous) => {
                debug!(
                    release_id = %release.id,
                    previous = %previous.id,
                    "deriving formation from previous release"
                );
                self.processes.all(&previous.id).await?
            }
            None => Formation::new(),
        };

        let formation = self.formations.derive(&existing, &slug.process_types);

        for process in formation.iter() {
            self.processes.create(&release.id, process).await?;
        }

        debug!(
            release_id = %release.id,
            processes = formation.len(),
            "formation persisted"
        );
        Ok(formation)
    }
}

impl std::fmt::Debug for ReleaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseService")
            .field("formations", &self.formations)
            .finish_non_exhaustive()
    }
}
