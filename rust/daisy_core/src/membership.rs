//! Canonical capability sets implied by custodianship.

use crate::types::{Capability, EntityKind, Verb};

/// Entity types that have custodians.
pub const MEMBERSHIP_KINDS: [EntityKind; 4] = [
    EntityKind::Dataset,
    EntityKind::Project,
    EntityKind::Contract,
    EntityKind::Dac,
];

const FULL: &[Verb] = &[Verb::Edit, Verb::Protected, Verb::Delete, Verb::Admin];
const EDIT_ONLY: &[Verb] = &[Verb::Edit];

/// Verbs a custodian of `kind` holds, or `None` if `kind` has no custodians.
pub fn canonical_verbs(kind: EntityKind) -> Option<&'static [Verb]> {
    match kind {
        EntityKind::Dataset | EntityKind::Project | EntityKind::Contract => Some(FULL),
        EntityKind::Dac => Some(EDIT_ONLY),
        _ => None,
    }
}

/// Fully-qualified canonical set for `kind`; empty if `kind` has no custodians.
pub fn canonical_capabilities(kind: EntityKind) -> Vec<Capability> {
    canonical_verbs(kind)
        .unwrap_or_default()
        .iter()
        .map(|verb| Capability::new(*verb, kind))
        .collect()
}

pub fn supports_membership(kind: EntityKind) -> bool {
    canonical_verbs(kind).is_some()
}
