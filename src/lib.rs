// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod clock;
pub mod config;
pub mod content;
pub mod coordinator;
pub mod error;
pub mod extract;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod retry;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::coordinator::{RunCoordinator, SchedulerStatus};
pub use crate::error::TriggerError;
pub use crate::history::RunLog;
