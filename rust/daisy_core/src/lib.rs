//! `daisy_core`: portable permission-resolution engine for DAISY.
//!
//! This crate holds the pure logic: no storage, no I/O. Checks read through
//! the [`PermissionSource`] trait; `daisy_store` provides the durable backend.
//!
//! Modules:
//! - `types`: domain types (EntityKind, Capability, Principal, etc.)
//! - `delegation`: delegation graph and its validation
//! - `check`: recursive permission checker and dispatch
//! - `membership`: canonical custodian capability sets
//! - `groups`: default group capability mapping
//! - `source`: read-side store trait and an in-memory implementation
//! - `config`: entity fixture parsing
//! - `error`: error types

pub mod check;
pub mod config;
pub mod delegation;
pub mod error;
pub mod groups;
pub mod membership;
pub mod source;
pub mod types;

pub use check::{CheckerDispatch, PermissionChecker};
pub use delegation::{DelegationResolver, DelegationRule, DelegationStrategy};
pub use error::{CheckError, SourceError};
pub use groups::{DefaultGroup, GroupDefaultMapping};
pub use source::{MemorySource, PermissionSource};
pub use types::{Capability, CheckRequest, EntityKind, EntityRecord, EntityRef, Principal, Verb};
