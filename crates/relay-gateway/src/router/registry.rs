//! Read-through route registry over a [`MetadataSource`].
//!
//! The compiled [`RouteTable`] is rebuilt when it is older than the
//! configured staleness bound. A failed reload keeps serving the previous
//! table; only a registry that has never loaded surfaces the store error.

use super::table::{RouteMatch, RouteTable};
use parking_lot::RwLock;
use relay_kernel::{MetadataSource, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

struct Snapshot {
    table: Arc<RouteTable>,
    loaded_at: Instant,
}

pub struct RouteRegistry {
    source: Arc<dyn MetadataSource>,
    max_staleness: Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

impl RouteRegistry {
    pub fn new(source: Arc<dyn MetadataSource>, max_staleness: Duration) -> Self {
        Self {
            source,
            max_staleness,
            snapshot: RwLock::new(None),
        }
    }

    /// Resolve `path` against the current snapshot, reloading it first when
    /// stale.
    pub async fn resolve(&self, path: &str) -> StoreResult<Option<RouteMatch>> {
        Ok(self.table().await?.resolve(path))
    }

    /// The current table, reloaded if older than the staleness bound.
    ///
    /// The store is queried without holding the snapshot lock; concurrent
    /// reloads may overlap and the last one to finish wins.
    pub async fn table(&self) -> StoreResult<Arc<RouteTable>> {
        if let Some(table) = self.fresh() {
            return Ok(table);
        }

        match self.source.active_route_templates().await {
            Ok(templates) => {
                let table = Arc::new(RouteTable::build(templates));
                debug!(routes = table.len(), "route table reloaded");
                *self.snapshot.write() = Some(Snapshot {
                    table: Arc::clone(&table),
                    loaded_at: Instant::now(),
                });
                Ok(table)
            }
            Err(e) => match self.snapshot.write().as_mut() {
                Some(snap) => {
                    warn!(error = %e, "route reload failed; serving previous table");
                    // Push the next attempt out by one staleness period.
                    snap.loaded_at = Instant::now();
                    Ok(Arc::clone(&snap.table))
                }
                None => Err(e),
            },
        }
    }

    fn fresh(&self) -> Option<Arc<RouteTable>> {
        self.snapshot
            .read()
            .as_ref()
            .filter(|snap| snap.loaded_at.elapsed() < self.max_staleness)
            .map(|snap| Arc::clone(&snap.table))
    }

    /// Drop the snapshot so the next lookup reloads.
    pub fn invalidate(&self) {
        *self.snapshot.write() = None;
    }
}
