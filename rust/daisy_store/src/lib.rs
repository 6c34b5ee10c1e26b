//! `daisy_store`: durable permission store for DAISY.
//!
//! Modules:
//! - `store`: redb tables, snapshots and write transactions
//! - `keys`: composite row key encoding
//! - `audit`: audit trail records
//! - `membership`: custodian membership sync
//! - `seed`: group default seeding
//! - `service`: `PermissionService` facade over all of the above
//! - `error`: error types

pub mod audit;
pub mod error;
pub mod keys;
pub mod membership;
pub mod seed;
pub mod service;
pub mod store;

pub use audit::{AuditAction, AuditRecord};
pub use error::{Result, StoreError};
pub use membership::{CustodianChange, MembershipSyncService, RepairReport};
pub use seed::{seed_group_defaults, SeedReport};
pub use service::PermissionService;
pub use store::{
    GrantFlags, GrantRow, PermissionStore, PrincipalGrants, Provenance, StoreRead, StoreSnapshot,
    StoreTxn,
};
