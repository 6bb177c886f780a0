//! Periodic blocklist reload.

use super::blocklist::{BlocklistCache, BlocklistSnapshot};
use crate::metrics::GatewayMetrics;
use relay_kernel::{MetadataSource, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Reloads the [`BlocklistCache`] from a [`MetadataSource`] on a fixed
/// interval.
///
/// A failed cycle is logged and counted; the previous snapshot stays in
/// force and the next attempt happens one interval later.
pub struct BlocklistRefresher {
    source: Arc<dyn MetadataSource>,
    cache: Arc<BlocklistCache>,
    interval: Duration,
    metrics: Option<GatewayMetrics>,
}

impl BlocklistRefresher {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        cache: Arc<BlocklistCache>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            cache,
            interval,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: GatewayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run one reload cycle.
    pub async fn refresh_once(&self) -> StoreResult<Arc<BlocklistSnapshot>> {
        let result = self.source.blocklist_entries().await;
        if let Some(metrics) = &self.metrics {
            metrics.record_blocklist_refresh(result.is_ok());
        }
        match result {
            Ok(entries) => {
                let snapshot = self.cache.replace(&entries);
                info!(
                    ips = snapshot.ip_count(),
                    domains = snapshot.domain_count(),
                    "blocklist refreshed"
                );
                Ok(snapshot)
            }
            Err(e) => {
                error!(error = %e, "blocklist refresh failed; keeping previous snapshot");
                Err(e)
            }
        }
    }

    /// Start the refresh loop. The first cycle runs immediately.
    ///
    /// The loop runs until the returned handle is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        info!(interval = ?self.interval, "starting blocklist refresher");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // Errors are already logged and leave the old snapshot in place.
                let _ = self.refresh_once().await;
            }
        })
    }
}
