//! The compile-time delegation table.

use super::DelegationRule;
use crate::types::EntityKind;

const TO_PROJECT: DelegationRule = DelegationRule::Parent {
    parent: EntityKind::Project,
    accessor: "project",
};

const TO_DATASET: DelegationRule = DelegationRule::Parent {
    parent: EntityKind::Dataset,
    accessor: "dataset",
};

const TO_CONTRACT: DelegationRule = DelegationRule::Parent {
    parent: EntityKind::Contract,
    accessor: "contract",
};

/// Documents hang off a project, a dataset or a contract. Any other
/// `content_type` value is treated as a contract attachment.
const DOCUMENT: DelegationRule = DelegationRule::Discriminated {
    discriminator: "content_type",
    accessor: "object_id",
    branches: &[
        ("project", EntityKind::Project),
        ("dataset", EntityKind::Dataset),
    ],
    fallback: EntityKind::Contract,
};

/// Cohort, Contact, Partner and Publication have no rule; checking them
/// fails with `Unregistered`.
pub const STANDARD_RULES: [(EntityKind, DelegationRule); 11] = [
    (EntityKind::Project, DelegationRule::Root),
    (EntityKind::Dataset, TO_PROJECT),
    (EntityKind::Contract, TO_PROJECT),
    (EntityKind::PartnerRole, TO_CONTRACT),
    (EntityKind::Dac, TO_CONTRACT),
    (EntityKind::Access, TO_DATASET),
    (EntityKind::LegalBasis, TO_DATASET),
    (EntityKind::Share, TO_DATASET),
    (EntityKind::DataLocation, TO_DATASET),
    (EntityKind::DataDeclaration, TO_DATASET),
    (EntityKind::Document, DOCUMENT),
];
