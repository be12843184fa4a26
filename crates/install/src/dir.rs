//! Chart provider over a local directory tree:
//! `<root>/<repo>/<name>/<version>/{values.yaml,README.md,Chart.yaml}`.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use helmdock_core::{ChartDetails, ChartVersion};
use serde::Deserialize;
use tracing::debug;

use crate::provider::{ChartDetailsProvider, ChartValuesProvider};

#[derive(Debug, Clone)]
pub struct DirChartProvider {
    root: PathBuf,
}

/// Subset of Chart.yaml we surface.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    app_version: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl DirChartProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    fn chart_dir(&self, repo: &str, name: &str) -> Result<PathBuf> {
        check_segment(repo)?;
        check_segment(name)?;
        Ok(self.root.join(repo).join(name))
    }

    async fn read_meta(dir: &Path) -> ChartMeta {
        match tokio::fs::read_to_string(dir.join("Chart.yaml")).await {
            Ok(text) => serde_yaml::from_str(&text).unwrap_or_default(),
            Err(_) => ChartMeta::default(),
        }
    }
}

#[async_trait::async_trait]
impl ChartDetailsProvider for DirChartProvider {
    async fn get_details(&self, repo: &str, name: &str, version: Option<&str>) -> Result<ChartDetails> {
        let dir = self.chart_dir(repo, name)?;
        let mut rd = tokio::fs::read_dir(&dir).await.with_context(|| format!("reading chart dir {}", dir.display()))?;
        let mut names = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        if names.is_empty() {
            return Err(anyhow!("chart {}/{} has no versions", repo, name));
        }
        names.sort_by(|a, b| compare_versions(b, a));

        let mut versions = Vec::with_capacity(names.len());
        for v in names {
            let meta = Self::read_meta(&dir.join(&v)).await;
            versions.push(ChartVersion { version: v, app_version: meta.app_version, description: meta.description, created: None });
        }
        let readme_version = version.unwrap_or(versions[0].version.as_str());
        let readme = tokio::fs::read_to_string(dir.join(readme_version).join("README.md")).await.ok();
        debug!(repo, name, count = versions.len(), "dir provider: details");
        Ok(ChartDetails { versions, readme })
    }
}

#[async_trait::async_trait]
impl ChartValuesProvider for DirChartProvider {
    async fn get_values(&self, repo: &str, name: &str, version: &str) -> Result<Option<String>> {
        check_segment(version)?;
        let dir = self.chart_dir(repo, name)?.join(version);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(anyhow!("chart {}/{} has no version {}", repo, name, version));
        }
        // values.yaml not written yet reads as "not ready"
        match tokio::fs::read_to_string(dir.join("values.yaml")).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading values for {}/{}@{}", repo, name, version)),
        }
    }
}

fn check_segment(part: &str) -> Result<()> {
    if part.is_empty() || part.contains(['/', '\\']) || part == "." || part == ".." {
        return Err(anyhow!("invalid chart path segment: {:?}", part));
    }
    Ok(())
}

/// Compare dotted versions numerically per segment; non-numeric segments
/// compare as text. "1.10.0" > "1.9.2".
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let trim = |s: &str| s.trim_start_matches('v').to_string();
    let (a, b) = (trim(a), trim(b));
    let mut ia = a.split(['.', '-', '+']);
    let mut ib = b.split(['.', '-', '+']);
    loop {
        match (ia.next(), ib.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}
