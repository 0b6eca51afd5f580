use std::time::Duration;

use futures_core::future::BoxFuture;

use crate::sdam::TopologyDescription;

/// The longest a [`Topology`] without change notification makes server selection sleep between
/// two snapshots.
const DEFAULT_UPDATE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The view of the deployment maintained by a background monitor.
///
/// Operations only read from it: each attempt at server selection takes a fresh
/// [`TopologyDescription`] snapshot, and a failed attempt may ask the monitor to rescan the
/// deployment sooner than its regular heartbeat.
pub trait Topology: Send + Sync {
    /// Returns the most recent snapshot of the deployment.
    fn description(&self) -> TopologyDescription;

    /// Asks the monitor to check every server as soon as possible. This must not block.
    fn request_update(&self);

    /// Resolves once the snapshot has changed or `timeout` has elapsed, whichever happens first.
    ///
    /// The default implementation just sleeps, which suits monitors that can't notify.
    fn wait_for_update<'a>(&'a self, timeout: Duration) -> BoxFuture<'a, ()> {
        Box::pin(tokio::time::sleep(timeout.min(DEFAULT_UPDATE_POLL_INTERVAL)))
    }
}
