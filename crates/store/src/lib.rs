//! `store` crate — persistence collaborator interfaces.
//!
//! The engine consumes scenario/package/category lookups, a report
//! writer, and raw media stores through the traits defined here. The
//! shipped implementations are in-memory (tests and the CLI); a real
//! deployment plugs its own backends in. No business logic lives here.

pub mod error;
pub mod memory;
pub mod models;
pub mod traits;

pub use error::StoreError;
pub use memory::{MemoryMediaStore, MemoryReportWriter, MemoryStore};
pub use models::{CategoryRecord, PackageRecord, ReportRecord, ScenarioRecord};
pub use traits::{MediaStore, ReportWriter, ScenarioStore};
