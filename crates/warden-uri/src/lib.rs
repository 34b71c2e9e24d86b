//! warden URI
//!
//! URI identity for the request-policy engine.
//!
//! Features:
//! - Request identifiers at configurable granularity (base domain / full host)
//! - Sentinel identifiers for non-hierarchical schemes (data:, about:, ...)
//! - Effective base-domain computation
//! - Fragment stripping and pre-path extraction

pub mod identity;
pub mod parts;

pub use identity::{
    base_domain, identifier, identifier_or_internal, is_uninterceptable, Granularity, Identifier,
};
pub use parts::{base_path, parse, strip_fragment, UriParts};

/// URI error
#[derive(Debug, thiserror::Error)]
pub enum UriError {
    #[error("malformed URI: {0}")]
    Malformed(String),
}
