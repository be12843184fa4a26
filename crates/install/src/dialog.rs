use std::sync::Arc;

use helmdock_core::HelmRelease;
use helmdock_store::StateSlot;
use tracing::debug;

/// Release targeted by the rollback dialog. Owned by the dialog's controller;
/// empty while the dialog is closed.
#[derive(Default)]
pub struct ReleaseRollbackDialog {
    release: StateSlot<HelmRelease>,
}

impl ReleaseRollbackDialog {
    pub fn new() -> Self { Self::default() }

    pub fn open(&self, release: HelmRelease) {
        debug!(release = %release.name, ns = %release.namespace, "rollback dialog: open");
        self.release.set(release);
    }

    /// Close the dialog; returns the release it was showing.
    pub fn close(&self) -> Option<Arc<HelmRelease>> {
        self.release.take()
    }

    pub fn current(&self) -> Option<Arc<HelmRelease>> { self.release.get() }

    pub fn is_open(&self) -> bool { self.release.is_set() }
}
