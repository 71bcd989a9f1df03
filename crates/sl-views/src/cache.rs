use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::registry::{list_views, ViewRow};
use sl_db::CHANNEL_VIEW_CHANGES;

/// In-memory registry mirror, refreshed wholesale on every `view_changes`
/// notification. Readers tolerate a brief stale window after a write until
/// the notification is observed.
///
/// Keyed by view name; each entry may hold several tenants' views of the
/// same name (uniqueness is per owner key).
#[derive(Clone, Default)]
pub struct ViewCache {
    inner: Arc<RwLock<HashMap<String, Vec<ViewRow>>>>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load (or reload) every view from the table.
    pub async fn refresh(&self, pool: &PgPool) -> Result<()> {
        let views = list_views(pool, None).await.context("cache refresh failed")?;
        let mut map: HashMap<String, Vec<ViewRow>> = HashMap::new();
        for view in views {
            map.entry(view.name.clone()).or_default().push(view);
        }
        let count: usize = map.values().map(Vec::len).sum();
        *self.inner.write().await = map;
        debug!(views = count, "view cache refreshed");
        Ok(())
    }

    /// Account-scoped lookup. `owner_keys = None` denotes admin/dev mode and
    /// returns the first view with the name.
    pub async fn get(&self, name: &str, owner_keys: Option<&[Uuid]>) -> Option<ViewRow> {
        let map = self.inner.read().await;
        let candidates = map.get(name)?;
        match owner_keys {
            None => candidates.first().cloned(),
            Some(keys) => candidates
                .iter()
                .find(|v| keys.contains(&v.owner_key_id))
                .cloned(),
        }
    }

    pub async fn get_all(&self, owner_keys: Option<&[Uuid]>) -> Vec<ViewRow> {
        let map = self.inner.read().await;
        let mut out: Vec<ViewRow> = map
            .values()
            .flatten()
            .filter(|v| match owner_keys {
                None => true,
                Some(keys) => keys.contains(&v.owner_key_id),
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Subscribe to `view_changes` and refresh on every notification.
    /// Reconnects with a delay on listener errors; the cache serves its last
    /// snapshot meanwhile.
    pub fn spawn_listener(&self, pool: PgPool) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            loop {
                match PgListener::connect_with(&pool).await {
                    Ok(mut listener) => {
                        if let Err(e) = listener.listen(CHANNEL_VIEW_CHANGES).await {
                            warn!(error = %e, "view-change subscribe failed");
                        } else {
                            loop {
                                match listener.recv().await {
                                    Ok(notification) => {
                                        debug!(
                                            view = notification.payload(),
                                            "view change notification"
                                        );
                                        if let Err(e) = cache.refresh(&pool).await {
                                            warn!(error = %e, "view cache refresh failed");
                                        }
                                    }
                                    Err(e) => {
                                        warn!(error = %e, "view-change listener dropped");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "view-change listener connect failed"),
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        })
    }
}
