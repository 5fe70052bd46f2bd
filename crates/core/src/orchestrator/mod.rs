//! Update orchestrator for application cache sessions.
//!
//! The orchestrator drives a session through its states:
//! - **Checking**: one conditional manifest fetch per cycle
//! - **Downloading**: concurrent fetches of every pending master entry
//! - **UpdateReady**: everything stored, waiting for a swap

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::UpdateOrchestrator;
pub use types::{CacheEvent, EventCallback, OrchestratorError, OrchestratorStatus, Status};
