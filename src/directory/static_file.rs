use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::directory::Directory;
use crate::error::EngineResult;
use crate::model::location::AuthorizedArea;
use crate::model::role::Role;

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryEmployee {
    pub id: u64,
    pub manager_id: Option<u64>,
    pub email: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub area_ids: Vec<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectorySnapshot {
    #[serde(default)]
    pub areas: Vec<AuthorizedArea>,
    #[serde(default)]
    pub employees: Vec<DirectoryEmployee>,
}

/// Directory backed by a JSON snapshot, used with the in-memory storage backend.
pub struct StaticDirectory {
    areas: HashMap<u64, AuthorizedArea>,
    employees: HashMap<u64, DirectoryEmployee>,
}

impl StaticDirectory {
    pub fn new(snapshot: DirectorySnapshot) -> Self {
        Self {
            areas: snapshot.areas.into_iter().map(|a| (a.id, a)).collect(),
            employees: snapshot.employees.into_iter().map(|e| (e.id, e)).collect(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let snapshot: DirectorySnapshot = serde_json::from_str(&raw)?;
        Ok(Self::new(snapshot))
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn assigned_areas(&self, employee_id: u64) -> EngineResult<Vec<AuthorizedArea>> {
        let Some(employee) = self.employees.get(&employee_id) else {
            return Ok(vec![]);
        };
        Ok(employee
            .area_ids
            .iter()
            .filter_map(|id| self.areas.get(id).cloned())
            .collect())
    }

    async fn manager_of(&self, employee_id: u64) -> EngineResult<Option<u64>> {
        Ok(self.employees.get(&employee_id).and_then(|e| e.manager_id))
    }

    async fn contact_channel(&self, employee_id: u64) -> EngineResult<Option<String>> {
        Ok(self.employees.get(&employee_id).and_then(|e| e.email.clone()))
    }

    async fn approvers(&self) -> EngineResult<Vec<u64>> {
        let mut ids: Vec<u64> = self
            .employees
            .values()
            .filter(|e| matches!(e.role, Role::Admin | Role::Hr))
            .map(|e| e.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "areas": [
            {"id": 1, "name": "HQ", "center_lat": 12.9716, "center_lon": 77.5946, "radius_meters": 100.0, "is_active": true}
        ],
        "employees": [
            {"id": 10, "manager_id": 20, "email": "emp@company.com", "role": "Employee", "area_ids": [1, 99]},
            {"id": 20, "email": "mgr@company.com", "role": "Manager"},
            {"id": 31, "role": "Hr"},
            {"id": 30, "email": "admin@company.com", "role": "Admin"}
        ]
    }"#;

    fn directory() -> StaticDirectory {
        StaticDirectory::new(serde_json::from_str(SNAPSHOT).unwrap())
    }

    #[tokio::test]
    async fn test_lookups_from_snapshot() {
        let dir = directory();

        let areas = dir.assigned_areas(10).await.unwrap();
        assert_eq!(areas.len(), 1, "unknown area ids are skipped");
        assert_eq!(dir.manager_of(10).await.unwrap(), Some(20));
        assert_eq!(dir.manager_of(20).await.unwrap(), None);
        assert_eq!(
            dir.contact_channel(20).await.unwrap().as_deref(),
            Some("mgr@company.com")
        );
        assert_eq!(dir.contact_channel(31).await.unwrap(), None);
        assert_eq!(dir.approvers().await.unwrap(), vec![30, 31]);
    }

    #[tokio::test]
    async fn test_unknown_employee_has_no_areas() {
        assert!(directory().assigned_areas(404).await.unwrap().is_empty());
    }
}
