//! Helmdock install-chart tabs.
//!
//! Each dock tab installing a chart carries its own install parameters. The
//! chart's version list and default values are fetched lazily the first time a
//! tab is shown, cached per tab, and refetched only when missing. Frontends call
//! [`InstallChartTabStore::load_data`] and read the stores directly.

#![forbid(unsafe_code)]

mod config;
mod dialog;
mod dir;
mod provider;
mod tabs;

pub use config::{LoaderConfig, DETAILS_KEY, INSTALL_CHARTS_KEY, VERSIONS_KEY};
pub use dialog::ReleaseRollbackDialog;
pub use dir::{compare_versions, DirChartProvider};
pub use provider::{ChartDetailsProvider, ChartValuesProvider, ReleaseInstaller};
pub use tabs::{InstallChartTabStore, LoadPlan, TabLoadState, ValuesOutcome};
