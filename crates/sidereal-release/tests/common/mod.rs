//! Common test utilities for release integration tests.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sidereal_release::{
    Config, Formation, FormationBuilder, MemoryStore, Process, ProcessStore, Release, ReleaseError,
    ReleaseId, ReleaseResult, ReleaseService, ReleaseStore, Scheduler, Slug,
};

/// Scheduler that records every release it is given and can be told to fail.
#[derive(Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<(Release, Formation)>>,
    fail: std::sync::atomic::AtomicBool,
}

impl RecordingScheduler {
    /// Make subsequent calls fail.
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Releases scheduled so far, with the formation each was given.
    pub fn scheduled(&self) -> Vec<(Release, Formation)> {
        self.scheduled.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl Scheduler for RecordingScheduler {
    async fn schedule_release(
        &self,
        release: &Release,
        _config: &Config,
        _slug: &Slug,
        formation: &Formation,
    ) -> ReleaseResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ReleaseError::scheduler("cluster unavailable"));
        }
        self.scheduled
            .lock()
            .expect("lock poisoned")
            .push((release.clone(), formation.clone()));
        Ok(())
    }
}

/// Process store that fails once a given number of processes were written.
pub struct FlakyProcessStore {
    inner: Arc<MemoryStore>,
    fail_after: AtomicUsize,
}

impl FlakyProcessStore {
    /// Allow `writes` more process inserts, then fail every one after.
    pub fn new(inner: Arc<MemoryStore>, writes: usize) -> Self {
        Self {
            inner,
            fail_after: AtomicUsize::new(writes),
        }
    }
}

#[async_trait]
impl ProcessStore for FlakyProcessStore {
    async fn all(&self, release_id: &ReleaseId) -> ReleaseResult<Formation> {
        self.inner.all(release_id).await
    }

    async fn create(&self, release_id: &ReleaseId, process: &Process) -> ReleaseResult<Process> {
        let remaining = self
            .fail_after
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if remaining.is_err() {
            return Err(ReleaseError::internal("process insert failed"));
        }
        ProcessStore::create(self.inner.as_ref(), release_id, process).await
    }
}

/// Release service wired to in-memory collaborators.
pub struct TestReleases {
    pub store: Arc<MemoryStore>,
    pub scheduler: Arc<RecordingScheduler>,
    pub service: Arc<ReleaseService>,
}

impl TestReleases {
    /// Creates a service whose new processes start at zero instances.
    pub fn new() -> Self {
        Self::with_builder(FormationBuilder::new())
    }

    /// Creates a service with a custom formation builder.
    pub fn with_builder(formations: FormationBuilder) -> Self {
        let store = Arc::new(MemoryStore::new());
        let processes: Arc<dyn ProcessStore> = store.clone();
        Self::wire(store, processes, formations)
    }

    /// Creates a service whose process store fails after `writes` inserts.
    pub fn with_flaky_processes(writes: usize) -> Self {
        let store = Arc::new(MemoryStore::new());
        let processes: Arc<dyn ProcessStore> =
            Arc::new(FlakyProcessStore::new(store.clone(), writes));
        Self::wire(store, processes, FormationBuilder::new())
    }

    fn wire(
        store: Arc<MemoryStore>,
        processes: Arc<dyn ProcessStore>,
        formations: FormationBuilder,
    ) -> Self {
        let scheduler = Arc::new(RecordingScheduler::default());
        let releases: Arc<dyn ReleaseStore> = store.clone();
        let service = Arc::new(ReleaseService::new(
            releases,
            processes,
            scheduler.clone(),
            formations,
        ));

        Self {
            store,
            scheduler,
            service,
        }
    }
}
