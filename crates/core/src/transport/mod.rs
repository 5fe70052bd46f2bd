//! Network access for manifests and resources.
//!
//! This module provides a `Transport` trait so the update orchestrator can be
//! driven by real HTTP or by a scripted mock in tests.

mod http;
mod types;

pub use http::HttpTransport;
pub use types::*;
