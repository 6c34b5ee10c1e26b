//! Custodian membership and the grants it implies.
//!
//! A custodian of a dataset, project, contract or DAC holds that entity
//! type's canonical capability set on the entity. The set is kept in sync
//! inside the same write transaction as the membership row, so the two can
//! never diverge: a failure anywhere rolls back both.

use std::collections::BTreeSet;

use tracing::{info, warn};

use daisy_core::membership::{canonical_capabilities, supports_membership};
use daisy_core::types::{EntityRef, Principal};

use crate::error::{Result, StoreError};
use crate::store::{PermissionStore, Provenance, StoreRead, StoreTxn};

/// Net effect of a custodian set replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustodianChange {
    pub added: Vec<Principal>,
    pub removed: Vec<Principal>,
}

/// Outcome of [`MembershipSyncService::reconcile_memberships`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub memberships: usize,
    /// Canonical grants that were missing and got restored.
    pub granted: usize,
    /// Membership-held grants with no membership behind them.
    pub revoked: usize,
}

#[derive(Clone)]
pub struct MembershipSyncService {
    store: PermissionStore,
}

impl MembershipSyncService {
    pub fn new(store: PermissionStore) -> Self {
        Self { store }
    }

    /// Grant the canonical set for `entity` to `principal`.
    ///
    /// Returns the number of grant rows that appeared.
    pub fn on_add(txn: &mut StoreTxn, principal: &Principal, entity: &EntityRef) -> Result<usize> {
        let mut granted = 0;
        for capability in canonical_capabilities(entity.kind) {
            if txn.grant(principal, capability, entity, Provenance::Membership)? {
                granted += 1;
            }
        }
        Ok(granted)
    }

    /// Withdraw the membership reason from the canonical set. Rows that are
    /// also held explicitly stay in place.
    ///
    /// Returns the number of grant rows that disappeared.
    pub fn on_remove(txn: &mut StoreTxn, principal: &Principal, entity: &EntityRef) -> Result<usize> {
        let mut revoked = 0;
        for capability in canonical_capabilities(entity.kind) {
            if txn.revoke(principal, capability, entity, Provenance::Membership)? {
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    fn require_membership_kind(entity: &EntityRef) -> Result<()> {
        if !supports_membership(entity.kind) {
            return Err(StoreError::MembershipUnsupported(entity.kind));
        }
        Ok(())
    }

    fn require_entity(txn: &StoreTxn, entity: &EntityRef) -> Result<()> {
        Self::require_membership_kind(entity)?;
        if txn.entity(entity)?.is_none() {
            return Err(StoreError::NotFound(entity.clone()));
        }
        Ok(())
    }

    fn add_in(txn: &mut StoreTxn, principal: &Principal, entity: &EntityRef) -> Result<bool> {
        let added = txn.add_membership(entity, principal)?;
        let granted = Self::on_add(txn, principal, entity)?;
        if added {
            info!(principal = %principal, entity = %entity, granted, "custodian added");
        }
        Ok(added)
    }

    fn remove_in(txn: &mut StoreTxn, principal: &Principal, entity: &EntityRef) -> Result<bool> {
        let removed = txn.remove_membership(entity, principal)?;
        let revoked = Self::on_remove(txn, principal, entity)?;
        if removed {
            info!(principal = %principal, entity = %entity, revoked, "custodian removed");
        }
        Ok(removed)
    }

    /// Make `principal` a custodian of `entity`. Returns `false` if it
    /// already was one; the canonical set is re-applied either way.
    pub fn add_custodian(&self, principal: &Principal, entity: &EntityRef) -> Result<bool> {
        self.store.write(|txn| {
            Self::require_entity(txn, entity)?;
            Self::add_in(txn, principal, entity)
        })
    }

    /// Returns `false` if `principal` was not a custodian.
    pub fn remove_custodian(&self, principal: &Principal, entity: &EntityRef) -> Result<bool> {
        Self::require_membership_kind(entity)?;
        self.store.write(|txn| Self::remove_in(txn, principal, entity))
    }

    /// Replace the custodian set of `entity` with `principals`.
    pub fn set_custodians(
        &self,
        entity: &EntityRef,
        principals: impl IntoIterator<Item = Principal>,
    ) -> Result<CustodianChange> {
        let desired: BTreeSet<Principal> = principals.into_iter().collect();
        self.store.write(|txn| {
            Self::require_entity(txn, entity)?;
            let current: BTreeSet<Principal> = txn.custodians(entity)?.into_iter().collect();

            let mut change = CustodianChange::default();
            for principal in current.difference(&desired) {
                if Self::remove_in(txn, principal, entity)? {
                    change.removed.push(principal.clone());
                }
            }
            for principal in &desired {
                if Self::add_in(txn, principal, entity)? {
                    change.added.push(principal.clone());
                }
            }
            Ok(change)
        })
    }

    /// Bring grants back in line with the stored memberships.
    ///
    /// Restores canonical grants missing for a custodian and withdraws the
    /// membership reason from grants whose membership no longer exists.
    pub fn reconcile_memberships(&self) -> Result<RepairReport> {
        let report = self.store.write(|txn| {
            let mut report = RepairReport::default();
            let memberships = txn.memberships()?;
            report.memberships = memberships.len();

            for (entity, principal) in &memberships {
                let granted = Self::on_add(txn, principal, entity)?;
                if granted > 0 {
                    warn!(principal = %principal, entity = %entity, granted, "restored missing custodian grants");
                }
                report.granted += granted;
            }

            let held: BTreeSet<(EntityRef, Principal)> = memberships.into_iter().collect();
            for row in txn.all_grants()? {
                if !row.flags.membership || held.contains(&(row.entity.clone(), row.principal.clone())) {
                    continue;
                }
                warn!(
                    principal = %row.principal,
                    capability = %row.capability,
                    entity = %row.entity,
                    "dropping grant held by a missing membership"
                );
                if txn.revoke(&row.principal, row.capability, &row.entity, Provenance::Membership)? {
                    report.revoked += 1;
                }
            }
            Ok(report)
        })?;
        info!(
            memberships = report.memberships,
            granted = report.granted,
            revoked = report.revoked,
            "membership reconciliation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daisy_core::types::{Capability, EntityKind, EntityRecord, Verb};

    fn setup() -> (PermissionStore, MembershipSyncService) {
        let store = PermissionStore::open_in_memory().unwrap();
        store
            .write(|txn| {
                txn.put_entity(&EntityRecord::new(EntityKind::Dataset, "D1"))?;
                txn.put_entity(&EntityRecord::new(EntityKind::Dac, "DAC1"))?;
                txn.put_entity(&EntityRecord::new(EntityKind::Document, "doc1"))?;
                Ok(())
            })
            .unwrap();
        let sync = MembershipSyncService::new(store.clone());
        (store, sync)
    }

    fn d1() -> EntityRef {
        EntityRef::new(EntityKind::Dataset, "D1")
    }

    #[test]
    fn add_custodian_grants_canonical_set() {
        let (store, sync) = setup();
        let alice = Principal::user("alice");
        assert!(sync.add_custodian(&alice, &d1()).unwrap());
        assert!(!sync.add_custodian(&alice, &d1()).unwrap());

        let snap = store.snapshot().unwrap();
        let mut caps: Vec<String> = snap
            .grants_on(&d1())
            .unwrap()
            .iter()
            .map(|row| row.capability.to_string())
            .collect();
        caps.sort();
        assert_eq!(
            caps,
            ["admin_dataset", "delete_dataset", "edit_dataset", "protected_dataset"]
        );
        assert_eq!(snap.audit_since(0).unwrap().len(), 4);
    }

    #[test]
    fn dac_custodian_only_edits() {
        let (store, sync) = setup();
        let dac = EntityRef::new(EntityKind::Dac, "DAC1");
        sync.add_custodian(&Principal::user("bob"), &dac).unwrap();
        let rows = store.snapshot().unwrap().grants_on(&dac).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].capability, Capability::new(Verb::Edit, EntityKind::Dac));
    }

    #[test]
    fn remove_keeps_explicit_grant() {
        let (store, sync) = setup();
        let alice = Principal::user("alice");
        let edit = Capability::new(Verb::Edit, EntityKind::Dataset);
        store
            .write(|txn| txn.grant(&alice, edit, &d1(), Provenance::Explicit))
            .unwrap();

        sync.add_custodian(&alice, &d1()).unwrap();
        assert!(sync.remove_custodian(&alice, &d1()).unwrap());

        let snap = store.snapshot().unwrap();
        let rows = snap.grants_on(&d1()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].capability, edit);
        assert!(rows[0].flags.explicit && !rows[0].flags.membership);
    }

    #[test]
    fn unsupported_kind_is_rejected() {
        let (_, sync) = setup();
        let doc = EntityRef::new(EntityKind::Document, "doc1");
        let err = sync.add_custodian(&Principal::user("alice"), &doc).unwrap_err();
        assert!(matches!(err, StoreError::MembershipUnsupported(EntityKind::Document)));
    }

    #[test]
    fn missing_entity_is_not_found_and_nothing_is_written() {
        let (store, sync) = setup();
        let ghost = EntityRef::new(EntityKind::Project, "P404");
        let err = sync.add_custodian(&Principal::user("alice"), &ghost).unwrap_err();
        assert!(err.is_not_found());
        let snap = store.snapshot().unwrap();
        assert!(snap.memberships().unwrap().is_empty());
        assert!(snap.all_grants().unwrap().is_empty());
    }

    #[test]
    fn set_custodians_applies_the_diff() {
        let (store, sync) = setup();
        let alice = Principal::user("alice");
        let bob = Principal::user("bob");
        let carol = Principal::user("carol");
        sync.set_custodians(&d1(), [alice.clone(), bob.clone()]).unwrap();

        let change = sync.set_custodians(&d1(), [bob.clone(), carol.clone()]).unwrap();
        assert_eq!(change.added, [carol.clone()]);
        assert_eq!(change.removed, [alice.clone()]);

        let snap = store.snapshot().unwrap();
        let mut custodians = snap.custodians(&d1()).unwrap();
        custodians.sort();
        assert_eq!(custodians, [bob, carol]);
        assert!(snap.grants_for(&alice).unwrap().object.is_empty());
    }

    #[test]
    fn reconcile_repairs_both_directions() {
        let (store, sync) = setup();
        let alice = Principal::user("alice");
        let bob = Principal::user("bob");
        let delete = Capability::new(Verb::Delete, EntityKind::Dataset);
        sync.add_custodian(&alice, &d1()).unwrap();
        store
            .write(|txn| {
                // lose one of alice's grants, and leave bob a stray one
                txn.revoke(&alice, delete, &d1(), Provenance::Membership)?;
                txn.grant(&bob, delete, &d1(), Provenance::Membership)?;
                Ok(())
            })
            .unwrap();

        let report = sync.reconcile_memberships().unwrap();
        assert_eq!(
            report,
            RepairReport {
                memberships: 1,
                granted: 1,
                revoked: 1
            }
        );
        let snap = store.snapshot().unwrap();
        assert!(snap.grant_flags(&alice, delete, &d1()).unwrap().is_some());
        assert!(snap.grant_flags(&bob, delete, &d1()).unwrap().is_none());

        assert_eq!(sync.reconcile_memberships().unwrap().granted, 0);
    }
}
