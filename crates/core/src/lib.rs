//! Helmdock core types: tab ids, chart install data and release payloads.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a dock tab. Install data and derived entries are keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    /// Fresh random tab id (uuid v4).
    pub fn new() -> Self { Self(uuid::Uuid::new_v4().to_string()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl Default for TabId {
    fn default() -> Self { Self::new() }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for TabId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

impl From<String> for TabId {
    fn from(s: String) -> Self { Self(s) }
}

/// Chart identity: repository + name + version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChartRef {
    pub repo: String,
    pub name: String,
    pub version: String,
}

impl fmt::Display for ChartRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.repo, self.name, self.version)
    }
}

/// Parameters for installing a chart from one tab.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartInstallData {
    pub name: String,
    pub repo: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_version: Option<bool>,
}

impl ChartInstallData {
    pub fn for_chart(chart: &ChartRef) -> Self {
        Self {
            name: chart.name.clone(),
            repo: chart.repo.clone(),
            version: chart.version.clone(),
            ..Default::default()
        }
    }

    pub fn chart(&self) -> ChartRef {
        ChartRef { repo: self.repo.clone(), name: self.name.clone(), version: self.version.clone() }
    }

    /// True when default values have been resolved (non-empty).
    pub fn has_values(&self) -> bool {
        self.values.as_deref().map(|v| !v.is_empty()).unwrap_or(false)
    }
}

/// One published version of a chart.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartVersion {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

/// Chart detail payload: versions newest-first, optional readme.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChartDetails {
    pub versions: Vec<ChartVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
}

impl ChartDetails {
    /// Version strings in provider order.
    pub fn version_list(&self) -> Vec<String> {
        self.versions.iter().map(|v| v.version.clone()).collect()
    }
}

/// A deployed helm release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmRelease {
    pub name: String,
    pub namespace: String,
    pub chart: String,
    pub revision: u32,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

/// Outcome of an install/upgrade: helm log plus the resulting release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseUpdateDetails {
    pub log: String,
    pub release: HelmRelease,
}

/// Errors surfaced by the install tab subsystem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DockError {
    #[error("provider: {0}")]
    Provider(String),
    #[error("cancelled")]
    Cancelled,
    #[error("missing tab: {0}")]
    MissingTab(TabId),
    #[error("storage: {0}")]
    Storage(String),
}

pub type DockResult<T> = Result<T, DockError>;

pub mod prelude {
    pub use super::{
        ChartDetails, ChartInstallData, ChartRef, ChartVersion, DockError, DockResult, HelmRelease,
        ReleaseUpdateDetails, TabId,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_data_serializes_camel_case_and_skips_absent() {
        let d = ChartInstallData {
            name: "nginx".into(),
            repo: "bitnami".into(),
            version: "1.2.3".into(),
            release_name: Some("web".into()),
            last_version: Some(true),
            ..Default::default()
        };
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["releaseName"], "web");
        assert_eq!(v["lastVersion"], true);
        assert!(v.get("values").is_none());
        assert!(v.get("namespace").is_none());
        let back: ChartInstallData = serde_json::from_value(v).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn has_values_ignores_empty_string() {
        let mut d = ChartInstallData::default();
        assert!(!d.has_values());
        d.values = Some(String::new());
        assert!(!d.has_values());
        d.values = Some("replicaCount: 1\n".into());
        assert!(d.has_values());
    }

    #[test]
    fn version_list_keeps_provider_order() {
        let details = ChartDetails {
            versions: vec![
                ChartVersion { version: "2.0.0".into(), ..Default::default() },
                ChartVersion { version: "1.5.0".into(), ..Default::default() },
                ChartVersion { version: "1.0.0".into(), ..Default::default() },
            ],
            readme: None,
        };
        assert_eq!(details.version_list(), vec!["2.0.0", "1.5.0", "1.0.0"]);
    }

    #[test]
    fn tab_ids_are_unique_and_transparent() {
        let a = TabId::new();
        let b = TabId::new();
        assert_ne!(a, b);
        let json = serde_json::to_string(&TabId::from("tab-1")).unwrap();
        assert_eq!(json, "\"tab-1\"");
    }
}
