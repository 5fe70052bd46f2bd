//! Cache manifest document model.
//!
//! - [`ManifestDocument`]: the validated in-memory manifest
//! - [`codec`]: parsing and canonical serialization of the text format
//! - [`ManifestUri`]: manifest entries, absolute or (without a base) relative

pub mod codec;
mod document;
mod types;
mod uri;

pub use document::{validate_manifest_url, ManifestDocument};
pub use types::*;
pub use uri::ManifestUri;
