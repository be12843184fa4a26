#![forbid(unsafe_code)]

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use helmdock_core::{ChartInstallData, ChartRef, DockError, DockResult, ReleaseUpdateDetails, TabId};
use helmdock_persist::Storage;
use helmdock_store::{wait_until_defined, TabStore};
use metrics::{counter, histogram};
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{LoaderConfig, DETAILS_KEY, INSTALL_CHARTS_KEY, VERSIONS_KEY};
use crate::provider::{ChartDetailsProvider, ChartValuesProvider, ReleaseInstaller};

/// What `load_data` decided to fetch for a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPlan {
    LoadingBoth,
    LoadingVersionsOnly,
    LoadingValuesOnly,
    NothingToLoad,
}

impl LoadPlan {
    fn new(need_values: bool, need_versions: bool) -> Self {
        match (need_values, need_versions) {
            (true, true) => LoadPlan::LoadingBoth,
            (false, true) => LoadPlan::LoadingVersionsOnly,
            (true, false) => LoadPlan::LoadingValuesOnly,
            (false, false) => LoadPlan::NothingToLoad,
        }
    }
}

/// Readiness of a tab as seen by the last `load_data` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabLoadState {
    WaitingForBaseData,
    Loading(LoadPlan),
    Ready,
    Failed(DockError),
}

/// Result of a values load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuesOutcome {
    /// Values merged into the tab's install data.
    Loaded { attempts: u32 },
    /// Provider never produced values; `values` stays unset.
    NotAvailable { attempts: u32 },
    /// The tab switched chart or version while fetching; result dropped.
    Superseded,
}

/// Install-chart tabs: per-tab install parameters plus lazily resolved
/// version lists and default values.
pub struct InstallChartTabStore {
    data: TabStore<ChartInstallData>,
    versions: TabStore<Vec<String>>,
    details: TabStore<ReleaseUpdateDetails>,
    charts: Arc<dyn ChartDetailsProvider>,
    values: Arc<dyn ChartValuesProvider>,
    installer: Option<Arc<dyn ReleaseInstaller>>,
    tokens: Mutex<FxHashMap<TabId, CancellationToken>>,
    states: Mutex<FxHashMap<TabId, TabLoadState>>,
    cfg: LoaderConfig,
}

impl InstallChartTabStore {
    /// Memory-only stores with default timings.
    pub fn new(charts: Arc<dyn ChartDetailsProvider>, values: Arc<dyn ChartValuesProvider>) -> Self {
        Self {
            data: TabStore::new(INSTALL_CHARTS_KEY),
            versions: TabStore::new(VERSIONS_KEY),
            details: TabStore::new(DETAILS_KEY),
            charts,
            values,
            installer: None,
            tokens: Mutex::new(FxHashMap::default()),
            states: Mutex::new(FxHashMap::default()),
            cfg: LoaderConfig::default(),
        }
    }

    /// Back all three stores with `storage`, each under its own key.
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.data = TabStore::with_storage(INSTALL_CHARTS_KEY, Arc::clone(&storage));
        self.versions = TabStore::with_storage(VERSIONS_KEY, Arc::clone(&storage));
        self.details = TabStore::with_storage(DETAILS_KEY, storage);
        self
    }

    pub fn with_installer(mut self, installer: Arc<dyn ReleaseInstaller>) -> Self {
        self.installer = Some(installer);
        self
    }

    pub fn with_config(mut self, cfg: LoaderConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Reload persisted tabs; returns the number of install tabs restored.
    pub fn restore(&self) -> usize {
        let n = self.data.restore();
        self.versions.restore();
        self.details.restore();
        info!(tabs = n, "install: restored persisted tabs");
        n
    }

    pub fn data(&self) -> &TabStore<ChartInstallData> { &self.data }
    pub fn versions(&self) -> &TabStore<Vec<String>> { &self.versions }
    pub fn details(&self) -> &TabStore<ReleaseUpdateDetails> { &self.details }

    pub fn get_data(&self, tab_id: &TabId) -> Option<Arc<ChartInstallData>> { self.data.get_data(tab_id) }

    /// Write install data directly. Reopens a tab id that was closed.
    pub fn set_data(&self, tab_id: &TabId, data: ChartInstallData) {
        {
            let mut tokens = lock(&self.tokens);
            if tokens.get(tab_id).is_some_and(|t| t.is_cancelled()) {
                tokens.remove(tab_id);
            }
        }
        self.data.set_data(tab_id, data);
    }

    /// User edit of a tab's install parameters.
    ///
    /// Moving the tab to another chart or version drops the cached version
    /// list. Values go too unless the edit set them itself.
    pub fn update_data<F>(&self, tab_id: &TabId, f: F) -> DockResult<Arc<ChartInstallData>>
    where
        F: FnOnce(&mut ChartInstallData),
    {
        let mut moved = None;
        let next = self
            .data
            .update(tab_id, |cur| {
                let mut next = cur.clone();
                f(&mut next);
                let (from, to) = (cur.chart(), next.chart());
                if from != to {
                    if next.values == cur.values {
                        next.values = None;
                    }
                    moved = Some((from, to));
                }
                next
            })
            .ok_or_else(|| DockError::MissingTab(tab_id.clone()))?;
        if let Some((from, to)) = moved {
            self.versions.clear_data(tab_id);
            debug!(tab = %tab_id, %from, %to, "install: chart changed; cached versions dropped");
        }
        Ok(next)
    }

    pub fn load_state(&self, tab_id: &TabId) -> Option<TabLoadState> {
        lock(&self.states).get(tab_id).cloned()
    }

    /// Create a tab for `chart`. Namespace defaults to "default".
    pub fn open_tab(&self, chart: &ChartRef, namespace: Option<String>) -> TabId {
        let tab_id = TabId::new();
        let mut data = ChartInstallData::for_chart(chart);
        data.namespace = Some(namespace.unwrap_or_else(|| "default".to_string()));
        self.data.set_data(&tab_id, data);
        self.token(&tab_id);
        info!(tab = %tab_id, chart = %chart, "install: tab opened");
        tab_id
    }

    /// Cancel in-flight loads for the tab and drop all its entries.
    ///
    /// The cancelled token stays behind so later loads on the id return
    /// `Cancelled` instead of waiting for data that will not come; `set_data`
    /// on the id reopens it.
    pub fn close_tab(&self, tab_id: &TabId) {
        lock(&self.tokens).entry(tab_id.clone()).or_default().cancel();
        lock(&self.states).remove(tab_id);
        self.data.clear_data(tab_id);
        self.versions.clear_data(tab_id);
        self.details.clear_data(tab_id);
        info!(tab = %tab_id, "install: tab closed");
    }

    fn token(&self, tab_id: &TabId) -> CancellationToken {
        lock(&self.tokens).entry(tab_id.clone()).or_default().clone()
    }

    /// Record `state` unless the tab was closed.
    fn set_state(&self, tab_id: &TabId, cancel: &CancellationToken, state: TabLoadState) {
        let mut states = lock(&self.states);
        if !cancel.is_cancelled() {
            states.insert(tab_id.clone(), state);
        }
    }

    /// Wait for the tab's install data, then fetch whatever is missing
    /// (values, versions) concurrently. Fails with the first provider error.
    pub async fn load_data(&self, tab_id: &TabId) -> DockResult<()> {
        let cancel = self.token(tab_id);
        if cancel.is_cancelled() {
            return Err(DockError::Cancelled);
        }
        self.set_state(tab_id, &cancel, TabLoadState::WaitingForBaseData);
        let res = self.load_missing(tab_id, &cancel).await;
        let state = match &res {
            Ok(()) => TabLoadState::Ready,
            Err(e) => TabLoadState::Failed(e.clone()),
        };
        self.set_state(tab_id, &cancel, state);
        res
    }

    async fn load_missing(&self, tab_id: &TabId, cancel: &CancellationToken) -> DockResult<()> {
        let data = wait_until_defined(|| self.data.get_data(tab_id), self.cfg.poll_interval, cancel).await?;
        let need_values = !data.has_values();
        let need_versions = !self.versions.has_data(tab_id);
        let plan = LoadPlan::new(need_values, need_versions);
        debug!(tab = %tab_id, ?plan, "install: load plan");
        self.set_state(tab_id, cancel, TabLoadState::Loading(plan));

        let values = async {
            if need_values {
                self.resolve_values(tab_id, cancel).await.map(|_| ())
            } else {
                Ok(())
            }
        };
        let versions = async {
            if need_versions {
                self.fetch_versions(tab_id, &data, cancel).await
            } else {
                Ok(())
            }
        };
        futures::try_join!(values, versions)?;
        Ok(())
    }

    /// Refetch the version list for the tab's current chart.
    pub async fn load_versions(&self, tab_id: &TabId) -> DockResult<()> {
        let data = self.get_data(tab_id).ok_or_else(|| DockError::MissingTab(tab_id.clone()))?;
        let cancel = self.token(tab_id);
        self.fetch_versions(tab_id, &data, &cancel).await
    }

    async fn fetch_versions(&self, tab_id: &TabId, data: &ChartInstallData, cancel: &CancellationToken) -> DockResult<()> {
        let t0 = Instant::now();
        // stale list must not show while the new one is fetched
        self.versions.clear_data(tab_id);
        let details = guarded(cancel, self.charts.get_details(&data.repo, &data.name, Some(&data.version))).await?;
        let versions = details.version_list();
        let count = versions.len();
        let current = || self.data.get_data(tab_id).is_some_and(|d| d.chart() == data.chart());
        if self.versions.set_data_if(tab_id, versions, || !cancel.is_cancelled() && current()).is_none() {
            if cancel.is_cancelled() {
                return Err(DockError::Cancelled);
            }
            debug!(tab = %tab_id, chart = %data.chart(), "install: chart changed during versions load; dropping result");
            return Ok(());
        }
        histogram!("install_versions_load_ms", t0.elapsed().as_secs_f64() * 1000.0);
        info!(tab = %tab_id, chart = %data.chart(), count, took_ms = %t0.elapsed().as_millis(), "install: versions loaded");
        Ok(())
    }

    /// Fetch default values for the tab's chart, retrying while the provider
    /// reports them as not ready. Exhausting the attempts is not an error.
    pub async fn load_values(&self, tab_id: &TabId) -> DockResult<ValuesOutcome> {
        let cancel = self.token(tab_id);
        self.resolve_values(tab_id, &cancel).await
    }

    async fn resolve_values(&self, tab_id: &TabId, cancel: &CancellationToken) -> DockResult<ValuesOutcome> {
        let attempts = self.cfg.values_attempts.max(1);
        for attempt in 0..attempts {
            let data = wait_until_defined(|| self.data.get_data(tab_id), self.cfg.poll_interval, cancel).await?;
            let chart = data.chart();
            counter!("install_values_attempts_total", 1u64);
            let fetched = guarded(cancel, self.values.get_values(&chart.repo, &chart.name, &chart.version)).await?;
            if let Some(values) = fetched.filter(|v| !v.is_empty()) {
                return self.merge_values(tab_id, &chart, values, attempt + 1, cancel);
            }
            debug!(tab = %tab_id, chart = %chart, attempt, "install: values not ready");
            if attempt + 1 < attempts && !self.cfg.values_retry_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(DockError::Cancelled),
                    _ = tokio::time::sleep(self.cfg.values_retry_delay) => {}
                }
            }
        }
        counter!("install_values_exhausted_total", 1u64);
        info!(tab = %tab_id, attempts, "install: values unavailable; leaving unset");
        Ok(ValuesOutcome::NotAvailable { attempts })
    }

    fn merge_values(
        &self,
        tab_id: &TabId,
        chart: &ChartRef,
        values: String,
        attempts: u32,
        cancel: &CancellationToken,
    ) -> DockResult<ValuesOutcome> {
        let merged = self.data.try_update(tab_id, |cur| {
            if cancel.is_cancelled() || cur.chart() != *chart {
                return None;
            }
            Some(ChartInstallData { values: Some(values), ..cur.clone() })
        });
        if merged.is_some() {
            info!(tab = %tab_id, chart = %chart, attempts, "install: values loaded");
            return Ok(ValuesOutcome::Loaded { attempts });
        }
        if cancel.is_cancelled() {
            return Err(DockError::Cancelled);
        }
        warn!(tab = %tab_id, chart = %chart, "install: chart changed during values load; dropping result");
        Ok(ValuesOutcome::Superseded)
    }

    /// Switch the tab to `version`. Values and the version list of the old
    /// selection are dropped, then both are reloaded concurrently.
    pub async fn change_version(&self, tab_id: &TabId, version: &str) -> DockResult<ValuesOutcome> {
        let data = self.update_data(tab_id, |d| {
            d.version = version.to_string();
            d.values = None;
        })?;
        debug!(tab = %tab_id, version, "install: version changed");
        let cancel = self.token(tab_id);
        let (outcome, ()) = futures::try_join!(
            self.resolve_values(tab_id, &cancel),
            self.fetch_versions(tab_id, &data, &cancel),
        )?;
        Ok(outcome)
    }

    /// Submit the tab's install parameters; the result lands in the details store.
    pub async fn install(&self, tab_id: &TabId) -> DockResult<Arc<ReleaseUpdateDetails>> {
        let installer = self
            .installer
            .as_ref()
            .ok_or_else(|| DockError::Provider("no release installer configured".into()))?;
        let data = self.get_data(tab_id).ok_or_else(|| DockError::MissingTab(tab_id.clone()))?;
        let cancel = self.token(tab_id);
        let t0 = Instant::now();
        let result = guarded(&cancel, installer.install(&data)).await?;
        let details = self
            .details
            .set_data_if(tab_id, result, || !cancel.is_cancelled())
            .ok_or(DockError::Cancelled)?;
        info!(
            tab = %tab_id,
            release = %details.release.name,
            ns = %details.release.namespace,
            took_ms = %t0.elapsed().as_millis(),
            "install: release installed"
        );
        Ok(details)
    }
}

/// Run a provider call unless the tab is cancelled first.
async fn guarded<T, F>(cancel: &CancellationToken, fut: F) -> DockResult<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DockError::Cancelled),
        res = fut => res.map_err(|e| DockError::Provider(format!("{:#}", e))),
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_covers_all_combinations() {
        assert_eq!(LoadPlan::new(true, true), LoadPlan::LoadingBoth);
        assert_eq!(LoadPlan::new(false, true), LoadPlan::LoadingVersionsOnly);
        assert_eq!(LoadPlan::new(true, false), LoadPlan::LoadingValuesOnly);
        assert_eq!(LoadPlan::new(false, false), LoadPlan::NothingToLoad);
    }

    #[tokio::test]
    async fn guarded_maps_provider_errors() {
        let cancel = CancellationToken::new();
        let res: DockResult<()> = guarded(&cancel, async { Err::<(), _>(anyhow::anyhow!("boom")) }).await;
        assert_eq!(res, Err(DockError::Provider("boom".into())));
    }

    #[tokio::test]
    async fn guarded_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = guarded(&cancel, async { Ok::<_, anyhow::Error>(1) }).await;
        assert_eq!(res, Err(DockError::Cancelled));
    }
}
