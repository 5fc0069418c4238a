use async_trait::async_trait;
use sqlx::MySqlPool;

use crate::directory::Directory;
use crate::error::EngineResult;
use crate::model::location::AuthorizedArea;
use crate::model::role::Role;
use crate::utils::area_cache::AreaCache;

pub struct MySqlDirectory {
    pool: MySqlPool,
    areas: AreaCache,
}

impl MySqlDirectory {
    pub fn new(pool: MySqlPool, areas: AreaCache) -> Self {
        Self { pool, areas }
    }

    async fn load_areas(pool: &MySqlPool, employee_id: u64) -> EngineResult<Vec<AuthorizedArea>> {
        let areas = sqlx::query_as::<_, AuthorizedArea>(
            r#"
            SELECT a.id, a.name, a.center_lat, a.center_lon, a.radius_meters, a.is_active
            FROM authorized_areas a
            JOIN employee_areas ea ON ea.area_id = a.id
            WHERE ea.employee_id = ?
            ORDER BY a.id
            "#,
        )
        .bind(employee_id)
        .fetch_all(pool)
        .await?;
        Ok(areas)
    }
}

#[async_trait]
impl Directory for MySqlDirectory {
    async fn assigned_areas(&self, employee_id: u64) -> EngineResult<Vec<AuthorizedArea>> {
        let areas = self
            .areas
            .get_or_load(employee_id, Self::load_areas(&self.pool, employee_id))
            .await?;
        Ok(areas.as_ref().clone())
    }

    async fn manager_of(&self, employee_id: u64) -> EngineResult<Option<u64>> {
        let manager = sqlx::query_scalar::<_, Option<u64>>(
            "SELECT manager_id FROM employees WHERE id = ?",
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(manager.flatten())
    }

    async fn contact_channel(&self, employee_id: u64) -> EngineResult<Option<String>> {
        let email = sqlx::query_scalar::<_, Option<String>>(
            "SELECT email FROM employees WHERE id = ? AND status = 'active'",
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(email.flatten().filter(|e| !e.trim().is_empty()))
    }

    async fn approvers(&self) -> EngineResult<Vec<u64>> {
        let ids = sqlx::query_scalar::<_, u64>(
            r#"
            SELECT DISTINCT employee_id
            FROM users
            WHERE role_id IN (?, ?)
            AND employee_id IS NOT NULL
            AND is_active = 1
            ORDER BY employee_id
            "#,
        )
        .bind(Role::Admin as u8)
        .bind(Role::Hr as u8)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
