//! Collaborator traits the engine consumes.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{CategoryRecord, PackageRecord, ReportRecord, ScenarioRecord};
use crate::StoreError;

/// Lookup-by-id for scenarios and their owning package/category.
#[async_trait]
pub trait ScenarioStore: Send + Sync {
    async fn get_scenario(&self, id: &str) -> Result<ScenarioRecord, StoreError>;
    async fn get_package(&self, id: &str) -> Result<PackageRecord, StoreError>;
    async fn get_category(&self, id: &str) -> Result<CategoryRecord, StoreError>;
}

/// Receives the final report once an execution ends.
#[async_trait]
pub trait ReportWriter: Send + Sync {
    async fn write_report(&self, report: ReportRecord) -> Result<(), StoreError>;
}

/// Receives raw screenshot/video bytes and returns the relative path
/// the artifact was stored under.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn save_screenshot(
        &self,
        execution_id: Uuid,
        device_id: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StoreError>;

    async fn save_video(
        &self,
        execution_id: Uuid,
        device_id: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StoreError>;
}
