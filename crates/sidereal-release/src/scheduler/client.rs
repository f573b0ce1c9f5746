//! HTTP client for the scheduler API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::config::SchedulerConfig;
use crate::error::{ReleaseError, ReleaseResult};
use crate::formation::Formation;
use crate::types::{Config, Release, Slug};

use super::{ScheduleRequest, Scheduler};

/// Scheduler that submits releases over HTTP.
#[derive(Debug, Clone)]
pub struct HttpScheduler {
    client: Client,
    base_url: String,
}

impl HttpScheduler {
    /// Create a new scheduler client from configuration.
    pub fn new(config: &SchedulerConfig) -> ReleaseResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ReleaseError::Http)?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_owned(),
        })
    }

    /// Create a new scheduler client with a custom base URL.
    pub fn with_url(url: impl Into<String>) -> ReleaseResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(ReleaseError::Http)?;

        Ok(Self {
            client,
            base_url: url.into().trim_end_matches('/').to_owned(),
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Scheduler for HttpScheduler {
    async fn schedule_release(
        &self,
        release: &Release,
        config: &Config,
        slug: &Slug,
        formation: &Formation,
    ) -> ReleaseResult<()> {
        let url = format!("{}/releases", self.base_url);
        let body = ScheduleRequest {
            release: release.clone(),
            config: config.clone(),
            slug: slug.clone(),
            formation: formation.clone(),
        };

        debug!(url = %url, release_id = %release.id, "submitting release to scheduler");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ReleaseError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReleaseError::scheduler(format!(
                "failed to schedule release {} v{}: {status}",
                release.id, release.version
            )));
        }

        info!(
            app = %release.app,
            release_id = %release.id,
            version = %release.version,
            "release scheduled"
        );
        Ok(())
    }
}
