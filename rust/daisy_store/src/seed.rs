//! Applies [`GroupDefaultMapping`] as global grants.

use std::collections::BTreeSet;

use tracing::{debug, info};

use daisy_core::groups::GroupDefaultMapping;
use daisy_core::types::Capability;

use crate::error::Result;
use crate::store::{PermissionStore, Provenance, StoreRead};

/// Net grant rows added and removed by one seeding run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub granted: usize,
    pub revoked: usize,
}

impl SeedReport {
    pub fn is_noop(&self) -> bool {
        self.granted == 0 && self.revoked == 0
    }
}

/// Make the seeded global grants of every managed group match `mapping`.
///
/// Runs in one transaction and is safe to repeat. Only the seeded reason is
/// touched: a grant an operator gave the group by hand survives, even when
/// it coincides with a row the table drops.
pub fn seed_group_defaults(store: &PermissionStore, mapping: &GroupDefaultMapping) -> Result<SeedReport> {
    let report = store.write(|txn| {
        let mut report = SeedReport::default();
        for group in mapping.managed_groups() {
            let principal = group.principal();
            let desired: BTreeSet<Capability> = mapping.capabilities_of(*group).collect();

            let stale: Vec<Capability> = txn
                .global_grants_of(&principal)?
                .into_iter()
                .filter(|(capability, flags)| flags.seeded && !desired.contains(capability))
                .map(|(capability, _)| capability)
                .collect();
            for capability in stale {
                if txn.revoke_global(&principal, capability, Provenance::Seeded)? {
                    report.revoked += 1;
                }
            }

            for capability in &desired {
                if txn.grant_global(&principal, *capability, Provenance::Seeded)? {
                    report.granted += 1;
                }
            }
            debug!(group = %group, capabilities = desired.len(), "group defaults applied");
        }
        Ok(report)
    })?;
    info!(
        granted = report.granted,
        revoked = report.revoked,
        "seeded group default permissions"
    );
    Ok(report)
}
