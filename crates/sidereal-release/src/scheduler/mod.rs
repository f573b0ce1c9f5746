//! Hand-off of new releases to the cluster scheduler.
//!
//! The release subsystem does not place workloads itself. Once a release
//! and its formation are persisted, they are passed to a [`Scheduler`],
//! which is responsible for converging the cluster onto the new formation.

mod client;

pub use client::HttpScheduler;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ReleaseResult;
use crate::formation::Formation;
use crate::types::{Config, Release, Slug};

/// Scheduler that accepts newly created releases.
///
/// Called synchronously once per successful release creation. A failure is
/// returned to the caller as-is; the release stays persisted.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Schedule a release's formation onto the cluster.
    async fn schedule_release(
        &self,
        release: &Release,
        config: &Config,
        slug: &Slug,
        formation: &Formation,
    ) -> ReleaseResult<()>;
}

/// Body of a schedule request sent to the scheduler API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    /// The release being scheduled.
    pub release: Release,
    /// Configuration snapshot the processes run with.
    pub config: Config,
    /// Artifact the processes run from.
    pub slug: Slug,
    /// Desired process topology.
    pub formation: Formation,
}
