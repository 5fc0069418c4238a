use futures::StreamExt;
use moka::future::Cache;
use sqlx::MySqlPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::model::location::AuthorizedArea;

/// employee id => assigned areas
#[derive(Clone)]
pub struct AreaCache {
    inner: Cache<u64, Arc<Vec<AuthorizedArea>>>,
}

impl AreaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(100_000) // tune based on head count
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Returns the cached areas or runs `load` once per key, even under concurrent misses.
    pub async fn get_or_load<F>(&self, employee_id: u64, load: F) -> EngineResult<Arc<Vec<AuthorizedArea>>>
    where
        F: std::future::Future<Output = EngineResult<Vec<AuthorizedArea>>>,
    {
        self.inner
            .try_get_with(employee_id, async move { load.await.map(Arc::new) })
            .await
            .map_err(|e: Arc<EngineError>| EngineError::Storage(e.to_string()))
    }

    /// Drop one employee's entry after an assignment change
    pub async fn invalidate(&self, employee_id: u64) {
        self.inner.invalidate(&employee_id).await;
    }

    async fn batch_insert(&self, batch: HashMap<u64, Vec<AuthorizedArea>>) {
        let futures: Vec<_> = batch
            .into_iter()
            .map(|(employee_id, areas)| self.inner.insert(employee_id, Arc::new(areas)))
            .collect();

        // Await all insertions concurrently
        futures::future::join_all(futures).await;
    }
}

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    employee_id: u64,
    id: u64,
    name: String,
    center_lat: f64,
    center_lon: f64,
    radius_meters: f64,
    is_active: bool,
}

/// Preload area assignments in batches so the first check-ins of the day skip the database.
pub async fn warmup_area_cache(pool: &MySqlPool, cache: &AreaCache, batch_size: usize) -> anyhow::Result<()> {
    let mut stream = sqlx::query_as::<_, AssignmentRow>(
        r#"
        SELECT ea.employee_id, a.id, a.name, a.center_lat, a.center_lon, a.radius_meters, a.is_active
        FROM employee_areas ea
        JOIN authorized_areas a ON a.id = ea.area_id
        ORDER BY ea.employee_id, a.id
        "#,
    )
    .fetch(pool);

    let mut batch: HashMap<u64, Vec<AuthorizedArea>> = HashMap::new();
    let mut rows = 0usize;
    let mut current_employee = None;

    while let Some(row) = stream.next().await {
        let row = row?;
        rows += 1;

        // only flush on an employee boundary so no entry is split across batches
        if current_employee != Some(row.employee_id) && batch.len() >= batch_size {
            cache.batch_insert(std::mem::take(&mut batch)).await;
        }
        current_employee = Some(row.employee_id);

        batch.entry(row.employee_id).or_default().push(AuthorizedArea {
            id: row.id,
            name: row.name,
            center_lat: row.center_lat,
            center_lon: row.center_lon,
            radius_meters: row.radius_meters,
            is_active: row.is_active,
        });
    }

    if !batch.is_empty() {
        cache.batch_insert(batch).await;
    }

    tracing::info!(rows, "Area cache warmup complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn hq() -> AuthorizedArea {
        AuthorizedArea {
            id: 1,
            name: "HQ".into(),
            center_lat: 12.9716,
            center_lon: 77.5946,
            radius_meters: 100.0,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_loader_runs_once_per_key() {
        let cache = AreaCache::new(Duration::from_secs(60));
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let areas = cache
                .get_or_load(7, async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![hq()])
                })
                .await
                .unwrap();
            assert_eq!(areas.len(), 1);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        cache.invalidate(7).await;
        cache
            .get_or_load(7, async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(vec![])
            })
            .await
            .unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_loader_errors_are_not_cached() {
        let cache = AreaCache::new(Duration::from_secs(60));
        let err = cache
            .get_or_load(9, async { Err(EngineError::Storage("db down".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Storage(_)));

        let ok = cache.get_or_load(9, async { Ok(vec![hq()]) }).await.unwrap();
        assert_eq!(ok[0].id, 1);
    }
}
