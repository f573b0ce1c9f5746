//! Core types for sidereal-release.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declares a string-backed identifier newtype.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Create a new `", stringify!($name), "`.")]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the value as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Unique identifier for a release.
    ReleaseId
);

string_id!(
    /// Name of the application that owns a release.
    AppName
);

string_id!(
    /// Identifier of a configuration snapshot.
    ConfigId
);

string_id!(
    /// Identifier of a built artifact (slug).
    SlugId
);

string_id!(
    /// Name of a process type, e.g. `web` or `worker`.
    ProcessType
);

impl ReleaseId {
    /// Generate a new unique release ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }
}

/// Per-application release version.
///
/// Versions start at 1 and increase by one for every release of the same
/// application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseVersion(u64);

impl ReleaseVersion {
    /// Version assigned to an application's first release.
    pub const FIRST: Self = Self(1);

    /// Create a version from a raw number.
    ///
    /// Returns `None` for zero, which is never a valid release version.
    #[must_use]
    pub const fn new(version: u64) -> Option<Self> {
        if version == 0 {
            None
        } else {
            Some(Self(version))
        }
    }

    /// The version that follows the current maximum.
    ///
    /// An application with no releases has an implicit maximum of 0.
    #[must_use]
    pub const fn successor(current_max: Option<Self>) -> Self {
        match current_max {
            Some(Self(v)) => Self(v + 1),
            None => Self::FIRST,
        }
    }

    /// Get the raw version number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An application that owns releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    /// Application name.
    pub name: AppName,
}

impl App {
    /// Create a new application reference.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: AppName::new(name),
        }
    }
}

/// A configuration snapshot for an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Configuration identifier.
    pub id: ConfigId,
    /// Environment variables.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

/// A deployable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slug {
    /// Slug identifier.
    pub id: SlugId,
    /// Image reference the scheduler pulls.
    pub image: String,
    /// Process types declared by the artifact, mapped to their commands.
    #[serde(default)]
    pub process_types: BTreeMap<ProcessType, String>,
}

/// A release that has not yet been assigned a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRelease {
    /// Identifier the release will be stored under.
    pub id: ReleaseId,
    /// Owning application.
    pub app: AppName,
    /// Configuration snapshot.
    pub config_id: ConfigId,
    /// Artifact.
    pub slug_id: SlugId,
}

impl NewRelease {
    /// Create an unversioned release with a freshly generated ID.
    #[must_use]
    pub fn new(app: AppName, config_id: ConfigId, slug_id: SlugId) -> Self {
        Self {
            id: ReleaseId::generate(),
            app,
            config_id,
            slug_id,
        }
    }

    /// Fix the version, producing the immutable release.
    #[must_use]
    pub fn into_release(self, version: ReleaseVersion) -> Release {
        Release {
            id: self.id,
            version,
            app: self.app,
            config_id: self.config_id,
            slug_id: self.slug_id,
            created_at: Utc::now(),
        }
    }
}

/// An immutable release: a configuration and a slug bound to an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Unique release identifier.
    pub id: ReleaseId,
    /// Version, unique within the application.
    pub version: ReleaseVersion,
    /// Owning application.
    pub app: AppName,
    /// Configuration snapshot.
    pub config_id: ConfigId,
    /// Artifact.
    pub slug_id: SlugId,
    /// When the release was created.
    pub created_at: DateTime<Utc>,
}
