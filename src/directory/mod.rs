//! Read-only organizational lookups owned by the HR core system.

pub mod mysql;
pub mod static_file;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::model::location::AuthorizedArea;

pub use mysql::MySqlDirectory;
pub use static_file::StaticDirectory;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Directory: Send + Sync {
    /// Areas the employee may work from (active or not; the resolver filters).
    async fn assigned_areas(&self, employee_id: u64) -> EngineResult<Vec<AuthorizedArea>>;

    async fn manager_of(&self, employee_id: u64) -> EngineResult<Option<u64>>;

    async fn contact_channel(&self, employee_id: u64) -> EngineResult<Option<String>>;

    /// Employees holding an HR or administrative role, for broadcast fallback
    async fn approvers(&self) -> EngineResult<Vec<u64>>;
}
