//! Permission service: the store, the checker and the group table behind one
//! handle.
//!
//! Every check reads from a fresh snapshot; every mutation is one write
//! transaction.

use std::path::Path;

use tracing::info;

use daisy_core::check::CheckerDispatch;
use daisy_core::groups::GroupDefaultMapping;
use daisy_core::types::{Capability, CheckRequest, EntityRecord, EntityRef, Principal};

use crate::audit::AuditRecord;
use crate::error::{Result, StoreError};
use crate::membership::{CustodianChange, MembershipSyncService, RepairReport};
use crate::seed::{self, SeedReport};
use crate::store::{PermissionStore, PrincipalGrants, Provenance, StoreRead};

#[derive(Clone)]
pub struct PermissionService {
    store: PermissionStore,
    dispatch: CheckerDispatch,
    mapping: GroupDefaultMapping,
    membership: MembershipSyncService,
}

impl PermissionService {
    pub fn new(store: PermissionStore, dispatch: CheckerDispatch, mapping: GroupDefaultMapping) -> Self {
        let membership = MembershipSyncService::new(store.clone());
        Self {
            store,
            dispatch,
            mapping,
            membership,
        }
    }

    /// Service over `store` with the standard delegation and group tables.
    pub fn with_defaults(store: PermissionStore) -> Result<Self> {
        Ok(Self::new(
            store,
            CheckerDispatch::standard()?,
            GroupDefaultMapping::standard(),
        ))
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_defaults(PermissionStore::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_defaults(PermissionStore::open_in_memory()?)
    }

    pub fn store(&self) -> &PermissionStore {
        &self.store
    }

    pub fn membership(&self) -> &MembershipSyncService {
        &self.membership
    }

    // ---- checks ----

    pub fn check(
        &self,
        capability: Capability,
        principal: &Principal,
        entity: &EntityRef,
        suppress_delegation: bool,
    ) -> Result<bool> {
        self.check_all(&[capability], principal, entity, suppress_delegation)
    }

    /// True only if every capability passes.
    pub fn check_all(
        &self,
        capabilities: &[Capability],
        principal: &Principal,
        entity: &EntityRef,
        suppress_delegation: bool,
    ) -> Result<bool> {
        let snapshot = self.store.snapshot()?;
        Ok(self
            .dispatch
            .check_all(&snapshot, capabilities, principal, entity, suppress_delegation)?)
    }

    pub fn check_request(&self, request: &CheckRequest) -> Result<bool> {
        let snapshot = self.store.snapshot()?;
        Ok(self.dispatch.check_request(&snapshot, request)?)
    }

    // ---- explicit grants ----

    /// Grant `capability` on `entity`. The entity must exist.
    pub fn grant(&self, principal: &Principal, capability: Capability, entity: &EntityRef) -> Result<bool> {
        self.store.write(|txn| {
            if txn.entity(entity)?.is_none() {
                return Err(StoreError::NotFound(entity.clone()));
            }
            txn.grant(principal, capability, entity, Provenance::Explicit)
        })
    }

    /// Withdraw an explicit grant. Grants implied by custodianship stay.
    pub fn revoke(&self, principal: &Principal, capability: Capability, entity: &EntityRef) -> Result<bool> {
        self.store
            .write(|txn| txn.revoke(principal, capability, entity, Provenance::Explicit))
    }

    pub fn grant_global(&self, principal: &Principal, capability: Capability) -> Result<bool> {
        self.store
            .write(|txn| txn.grant_global(principal, capability, Provenance::Explicit))
    }

    pub fn revoke_global(&self, principal: &Principal, capability: Capability) -> Result<bool> {
        self.store
            .write(|txn| txn.revoke_global(principal, capability, Provenance::Explicit))
    }

    // ---- custodians ----

    pub fn add_custodian(&self, principal: &Principal, entity: &EntityRef) -> Result<bool> {
        self.membership.add_custodian(principal, entity)
    }

    pub fn remove_custodian(&self, principal: &Principal, entity: &EntityRef) -> Result<bool> {
        self.membership.remove_custodian(principal, entity)
    }

    pub fn set_custodians(
        &self,
        entity: &EntityRef,
        principals: impl IntoIterator<Item = Principal>,
    ) -> Result<CustodianChange> {
        self.membership.set_custodians(entity, principals)
    }

    pub fn reconcile_memberships(&self) -> Result<RepairReport> {
        self.membership.reconcile_memberships()
    }

    // ---- groups ----

    pub fn join_group(&self, user_id: &str, group: &str) -> Result<bool> {
        let joined = self.store.write(|txn| txn.add_group_member(user_id, group))?;
        if joined {
            info!(user = user_id, group, "user joined group");
        }
        Ok(joined)
    }

    pub fn leave_group(&self, user_id: &str, group: &str) -> Result<bool> {
        let left = self.store.write(|txn| txn.remove_group_member(user_id, group))?;
        if left {
            info!(user = user_id, group, "user left group");
        }
        Ok(left)
    }

    pub fn seed_group_defaults(&self) -> Result<SeedReport> {
        seed::seed_group_defaults(&self.store, &self.mapping)
    }

    // ---- entities ----

    pub fn put_entity(&self, record: &EntityRecord) -> Result<()> {
        self.store.write(|txn| txn.put_entity(record))
    }

    pub fn delete_entity(&self, entity: &EntityRef) -> Result<bool> {
        self.store.write(|txn| txn.delete_entity(entity))
    }

    /// Upsert a batch of entity records in one transaction.
    pub fn import(&self, records: &[EntityRecord]) -> Result<usize> {
        self.store.write(|txn| {
            for record in records {
                txn.put_entity(record)?;
            }
            Ok(records.len())
        })?;
        info!(count = records.len(), "imported entities");
        Ok(records.len())
    }

    // ---- inspection ----

    pub fn grants_for(&self, principal: &Principal) -> Result<PrincipalGrants> {
        self.store.snapshot()?.grants_for(principal)
    }

    pub fn audit_log(&self) -> Result<Vec<AuditRecord>> {
        self.audit_since(0)
    }

    pub fn audit_since(&self, seq: u64) -> Result<Vec<AuditRecord>> {
        self.store.snapshot()?.audit_since(seq)
    }
}
