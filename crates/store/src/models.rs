//! Record structs exchanged across the store traits.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! The scenario graph itself stays an opaque JSON `definition` here;
//! the engine crate owns the typed graph model and parses it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// scenarios
// ---------------------------------------------------------------------------

/// A stored scenario: display metadata plus the authored graph JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRecord {
    pub id: String,
    pub name: String,
    pub package_id: Option<String>,
    pub category_id: Option<String>,
    /// Full node/edge graph as authored (parsed by the engine).
    pub definition: serde_json::Value,
}

// ---------------------------------------------------------------------------
// packages / categories
// ---------------------------------------------------------------------------

/// The app package a scenario group targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    pub id: String,
    pub name: String,
    /// Platform application id, e.g. `com.example.app`.
    pub app_package: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub id: String,
    pub name: String,
}

// ---------------------------------------------------------------------------
// reports
// ---------------------------------------------------------------------------

/// A finalized execution report as handed to the `ReportWriter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Serialized `ExecutionReport` from the engine.
    pub payload: serde_json::Value,
}
