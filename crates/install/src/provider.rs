//! External collaborators consumed by install tabs.

use anyhow::Result;
use helmdock_core::{ChartDetails, ChartInstallData, ReleaseUpdateDetails};

/// Chart metadata source (repository index, helm API, ...).
#[async_trait::async_trait]
pub trait ChartDetailsProvider: Send + Sync {
    /// Versions of `repo/name`, newest first. `version` selects which
    /// version's readme is returned when the provider has one.
    async fn get_details(&self, repo: &str, name: &str, version: Option<&str>) -> Result<ChartDetails>;
}

/// Default values source. `Ok(None)` (or an empty string) means the values are
/// not indexed yet; callers retry rather than fail.
#[async_trait::async_trait]
pub trait ChartValuesProvider: Send + Sync {
    async fn get_values(&self, repo: &str, name: &str, version: &str) -> Result<Option<String>>;
}

/// Submits an install for a tab's parameters.
#[async_trait::async_trait]
pub trait ReleaseInstaller: Send + Sync {
    async fn install(&self, data: &ChartInstallData) -> Result<ReleaseUpdateDetails>;
}
