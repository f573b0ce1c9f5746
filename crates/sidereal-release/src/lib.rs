//! Sidereal Releases
//!
//! This crate creates immutable releases for Sidereal applications. A
//! release binds a configuration snapshot and a slug (built artifact) to an
//! application under a per-application version number, and carries a
//! formation: the process types to run and how many of each.
//!
//! # Versioning
//!
//! Versions start at 1 and increase by one per release. The version is
//! assigned inside the transaction that inserts the release, while holding a
//! lock scoped to the application (see [`SequencerLock`]), so concurrent
//! creators for the same application are serialised and different
//! applications never wait on each other.
//!
//! # Formations
//!
//! A new release's formation is derived from the release before it:
//!
//! ```text
//! previous formation        slug process types        new formation
//! web    x2  "./web --old"  web    "./web --new"  ──▶ web    x2 "./web --new"
//! worker x1  "./worker"                               clock  x0 "./clock"
//!                           clock  "./clock"
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sidereal_release::{ReleaseConfig, ReleaseService};
//!
//! let service = ReleaseService::connect(&ReleaseConfig::load()?).await?;
//! let release = service.create(&app, &config, &slug).await?;
//! println!("released {} v{}", release.app, release.version);
//! ```

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod formation;
pub mod scheduler;
pub mod sequencer;
pub mod service;
pub mod store;
pub mod types;

// Re-export commonly used types at the crate root
pub use config::ReleaseConfig;
pub use error::{ReleaseError, ReleaseResult};
pub use formation::{Constraints, Formation, FormationBuilder, Process};
pub use scheduler::{HttpScheduler, ScheduleRequest, Scheduler};
pub use sequencer::{SequencerLock, VersionSequencer};
pub use service::ReleaseService;
pub use store::{MemoryStore, PostgresStore, ProcessStore, ReleaseStore};
pub use types::{
    App, AppName, Config, ConfigId, NewRelease, ProcessType, Release, ReleaseId, ReleaseVersion,
    Slug, SlugId,
};
