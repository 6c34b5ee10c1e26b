//! Error types for permission resolution.
//!
//! Denial is never an error: `check` returns `Ok(false)`. Only structural
//! failures (misconfigured delegation, missing entities, backing-store
//! failures) surface here.

use thiserror::Error;

use crate::types::{EntityKind, EntityRef};

/// Error raised by a [`PermissionSource`](crate::source::PermissionSource) backend.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum CheckError {
    /// No delegation strategy registered for this entity kind.
    #[error("no delegation strategy registered for entity type '{0}'")]
    Unregistered(EntityKind),

    /// The delegation table itself is inconsistent.
    #[error("invalid delegation table: {0}")]
    Configuration(String),

    #[error("entity not found: {0}")]
    NotFound(EntityRef),

    #[error("invalid capability: '{0}'")]
    InvalidCapability(String),

    #[error("invalid entity type: '{0}'")]
    InvalidEntityKind(String),

    #[error("invalid principal: '{0}' (expected user:<id> or group:<name>)")]
    InvalidPrincipal(String),

    #[error("permission source error: {0}")]
    Source(#[source] SourceError),
}

impl CheckError {
    /// Whether this is a configuration defect rather than a runtime failure.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Unregistered(_) | Self::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, CheckError>;
