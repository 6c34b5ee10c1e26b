//! Tests for the permission checker.

use proptest::prelude::*;

use crate::check::*;
use crate::delegation::{DelegationResolver, DelegationRule};
use crate::source::MemorySource;
use crate::types::{EntityKind, Verb};

// ============================================================================
// Helper builders
// ============================================================================

fn cap(s: &str) -> Capability {
    s.parse().unwrap()
}

fn entity(kind: EntityKind, id: &str) -> EntityRef {
    EntityRef::new(kind, id)
}

fn dispatch() -> CheckerDispatch {
    CheckerDispatch::standard().unwrap()
}

fn alice() -> Principal {
    Principal::user("alice")
}

/// Project P1, dataset D1 in P1, contract C1 in P1, orphan contract C2.
fn fixture() -> MemorySource {
    let mut source = MemorySource::new();
    source
        .insert_entity(EntityRecord::new(EntityKind::Project, "P1"))
        .insert_entity(EntityRecord::new(EntityKind::Dataset, "D1").with_link("project", "P1"))
        .insert_entity(EntityRecord::new(EntityKind::Contract, "C1").with_link("project", "P1"))
        .insert_entity(EntityRecord::new(EntityKind::Contract, "C2"))
        .insert_entity(EntityRecord::new(EntityKind::PartnerRole, "R1").with_link("contract", "C1"))
        .insert_entity(
            EntityRecord::new(EntityKind::Access, "A1").with_link("dataset", "D1"),
        );
    source
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn dataset_inherits_from_project_grant() {
    let mut source = fixture();
    source.grant(alice(), cap("edit_project"), entity(EntityKind::Project, "P1"));

    let allowed = dispatch()
        .check(&source, cap("edit_dataset"), &alice(), &entity(EntityKind::Dataset, "D1"), false)
        .unwrap();
    assert!(allowed);
}

#[test]
fn suppressed_delegation_ignores_project_grant() {
    let mut source = fixture();
    source.grant(alice(), cap("edit_project"), entity(EntityKind::Project, "P1"));

    let allowed = dispatch()
        .check(&source, cap("edit_dataset"), &alice(), &entity(EntityKind::Dataset, "D1"), true)
        .unwrap();
    assert!(!allowed);
}

#[test]
fn contract_without_project_is_a_dead_end() {
    let source = fixture();
    let allowed = dispatch()
        .check(&source, cap("edit_contract"), &alice(), &entity(EntityKind::Contract, "C2"), false)
        .unwrap();
    assert!(!allowed);
}

#[test]
fn document_resolves_through_contract_to_project() {
    let mut source = fixture();
    source
        .insert_entity(
            EntityRecord::new(EntityKind::Document, "doc1")
                .with_link("content_type", "contract")
                .with_link("object_id", "C1"),
        )
        .grant(alice(), cap("protected_project"), entity(EntityKind::Project, "P1"));

    let allowed = dispatch()
        .check(
            &source,
            cap("protected_contract"),
            &alice(),
            &entity(EntityKind::Document, "doc1"),
            false,
        )
        .unwrap();
    assert!(allowed);
}

#[test]
fn document_with_odd_discriminator_goes_to_contract() {
    let mut source = fixture();
    source
        .insert_entity(
            EntityRecord::new(EntityKind::Document, "doc2")
                .with_link("content_type", "legacy-thing")
                .with_link("object_id", "C1"),
        )
        .grant(alice(), cap("view_contract"), entity(EntityKind::Contract, "C1"));

    let allowed = dispatch()
        .check(&source, cap("view_document"), &alice(), &entity(EntityKind::Document, "doc2"), false)
        .unwrap();
    assert!(allowed);
}

#[test]
fn document_on_dataset_walks_two_hops() {
    let mut source = fixture();
    source
        .insert_entity(
            EntityRecord::new(EntityKind::Document, "doc3")
                .with_link("content_type", "dataset")
                .with_link("object_id", "D1"),
        )
        .grant(alice(), cap("protected_project"), entity(EntityKind::Project, "P1"));

    assert!(dispatch()
        .check(
            &source,
            cap("protected_document"),
            &alice(),
            &entity(EntityKind::Document, "doc3"),
            false
        )
        .unwrap());
}

#[test]
fn suppression_only_covers_first_hop() {
    // access -> dataset (direct miss) -> project (hit)
    let mut source = fixture();
    source.grant(alice(), cap("view_project"), entity(EntityKind::Project, "P1"));
    let d = dispatch();
    let access = entity(EntityKind::Access, "A1");

    assert!(d.check(&source, cap("view_access"), &alice(), &access, false).unwrap());
    assert!(!d.check(&source, cap("view_access"), &alice(), &access, true).unwrap());
}

#[test]
fn global_grant_beats_suppression() {
    let mut source = fixture();
    source.grant_global(alice(), cap("delete_dataset"));

    assert!(dispatch()
        .check(&source, cap("delete_dataset"), &alice(), &entity(EntityKind::Dataset, "D1"), true)
        .unwrap());
}

#[test]
fn global_grant_on_parent_type_satisfies_child_by_delegation() {
    let mut source = fixture();
    source
        .grant_global(Principal::group("daisy-legal"), cap("edit_contract"))
        .join_group("alice", "daisy-legal");

    let d = dispatch();
    let role = entity(EntityKind::PartnerRole, "R1");
    assert!(d.check(&source, cap("edit_partner_role"), &alice(), &role, false).unwrap());
    assert!(!d.check(&source, cap("edit_partner_role"), &alice(), &role, true).unwrap());
}

#[test]
fn grant_on_other_verb_does_not_leak() {
    let mut source = fixture();
    source.grant(alice(), cap("view_project"), entity(EntityKind::Project, "P1"));

    assert!(!dispatch()
        .check(&source, cap("edit_dataset"), &alice(), &entity(EntityKind::Dataset, "D1"), false)
        .unwrap());
}

#[test]
fn capability_set_is_conjunctive() {
    let mut source = fixture();
    let d1 = entity(EntityKind::Dataset, "D1");
    source.grant(alice(), cap("view_dataset"), d1.clone());
    let d = dispatch();

    assert!(d
        .check_all(&source, &[cap("view_dataset")], &alice(), &d1, false)
        .unwrap());
    assert!(!d
        .check_all(&source, &[cap("view_dataset"), cap("edit_dataset")], &alice(), &d1, false)
        .unwrap());

    source.grant(alice(), cap("edit_project"), entity(EntityKind::Project, "P1"));
    assert!(d
        .check_all(&source, &[cap("view_dataset"), cap("edit_dataset")], &alice(), &d1, false)
        .unwrap());
}

#[test]
fn empty_capability_set_is_allowed() {
    let source = fixture();
    assert!(dispatch()
        .check_all(&source, &[], &alice(), &entity(EntityKind::Dataset, "D1"), false)
        .unwrap());
}

#[test]
fn check_request_round_trip() {
    let mut source = fixture();
    source.grant(alice(), cap("admin_project"), entity(EntityKind::Project, "P1"));
    let request = CheckRequest::parse("user:alice", "admin_contract", "contract", "C1", false).unwrap();
    assert!(dispatch().check_request(&source, &request).unwrap());
}

// ============================================================================
// Failure modes
// ============================================================================

#[test]
fn unregistered_type_raises_even_with_global_grant() {
    let mut source = fixture();
    source
        .insert_entity(EntityRecord::new(EntityKind::Cohort, "K1"))
        .grant_global(alice(), cap("view_cohort"));

    let err = dispatch()
        .check(&source, cap("view_cohort"), &alice(), &entity(EntityKind::Cohort, "K1"), false)
        .unwrap_err();
    assert!(matches!(err, CheckError::Unregistered(EntityKind::Cohort)));
}

#[test]
fn unregistered_type_raises_for_empty_set() {
    let source = fixture();
    let err = dispatch()
        .check_all(&source, &[], &alice(), &entity(EntityKind::Partner, "X"), false)
        .unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn missing_entity_is_not_found() {
    let source = fixture();
    let err = dispatch()
        .check(&source, cap("edit_dataset"), &alice(), &entity(EntityKind::Dataset, "nope"), false)
        .unwrap_err();
    assert!(matches!(err, CheckError::NotFound(e) if e.id == "nope"));
}

#[test]
fn dangling_parent_reference_denies() {
    let mut source = fixture();
    source.insert_entity(
        EntityRecord::new(EntityKind::Dataset, "D9").with_link("project", "secret-P404"),
    );

    let allowed = dispatch()
        .check(&source, cap("edit_dataset"), &alice(), &entity(EntityKind::Dataset, "D9"), false)
        .unwrap();
    assert!(!allowed);
}

#[test]
fn dangling_parent_does_not_mask_direct_grant() {
    let mut source = fixture();
    source.insert_entity(
        EntityRecord::new(EntityKind::Dataset, "D9").with_link("project", "secret-P404"),
    );
    source.grant(alice(), cap("edit_dataset"), entity(EntityKind::Dataset, "D9"));

    assert!(dispatch()
        .check(&source, cap("edit_dataset"), &alice(), &entity(EntityKind::Dataset, "D9"), false)
        .unwrap());
}

#[test]
fn dangling_parent_is_irrelevant_when_suppressed() {
    let mut source = fixture();
    source.insert_entity(EntityRecord::new(EntityKind::Dataset, "D9").with_link("project", "P404"));

    assert!(!dispatch()
        .check(&source, cap("edit_dataset"), &alice(), &entity(EntityKind::Dataset, "D9"), true)
        .unwrap());
}

#[test]
fn partial_registry_fails_at_the_unregistered_hop() {
    // A table where Share is simply not registered.
    let rules: Vec<(EntityKind, DelegationRule)> = crate::delegation::STANDARD_RULES
        .iter()
        .copied()
        .filter(|(k, _)| *k != EntityKind::Share)
        .collect();
    let d = CheckerDispatch::new(DelegationResolver::from_rules(rules).unwrap());
    let mut source = fixture();
    source.insert_entity(EntityRecord::new(EntityKind::Share, "S1").with_link("dataset", "D1"));

    let err = d
        .check(&source, cap("view_share"), &alice(), &entity(EntityKind::Share, "S1"), false)
        .unwrap_err();
    assert!(matches!(err, CheckError::Unregistered(EntityKind::Share)));
}

#[test]
fn source_errors_propagate() {
    struct Broken;

    impl PermissionSource for Broken {
        fn check_global(&self, _: &Principal, _: Capability) -> std::result::Result<bool, SourceError> {
            Err("disk on fire".into())
        }

        fn check_direct(
            &self,
            _: &Principal,
            _: Capability,
            _: &EntityRef,
        ) -> std::result::Result<bool, SourceError> {
            Ok(true)
        }

        fn load_entity(
            &self,
            entity: &EntityRef,
        ) -> std::result::Result<Option<EntityRecord>, SourceError> {
            Ok(Some(EntityRecord::new(entity.kind, entity.id.clone())))
        }
    }

    let err = dispatch()
        .check(&Broken, cap("view_project"), &alice(), &entity(EntityKind::Project, "P1"), false)
        .unwrap_err();
    assert!(matches!(err, CheckError::Source(_)));
    assert!(err.to_string().contains("disk on fire"));
}

// ============================================================================
// Properties
// ============================================================================

/// Child kinds with a fixed parent type, and that parent's accessor.
const CHILDREN: [(EntityKind, EntityKind, &str); 9] = [
    (EntityKind::Dataset, EntityKind::Project, "project"),
    (EntityKind::Contract, EntityKind::Project, "project"),
    (EntityKind::PartnerRole, EntityKind::Contract, "contract"),
    (EntityKind::Dac, EntityKind::Contract, "contract"),
    (EntityKind::Access, EntityKind::Dataset, "dataset"),
    (EntityKind::LegalBasis, EntityKind::Dataset, "dataset"),
    (EntityKind::Share, EntityKind::Dataset, "dataset"),
    (EntityKind::DataLocation, EntityKind::Dataset, "dataset"),
    (EntityKind::DataDeclaration, EntityKind::Dataset, "dataset"),
];

fn registered_kind() -> impl Strategy<Value = EntityKind> {
    prop::sample::select(
        crate::delegation::STANDARD_RULES
            .iter()
            .map(|(k, _)| *k)
            .collect::<Vec<_>>(),
    )
}

proptest! {
    #[test]
    fn direct_grant_on_parent_reaches_child(
        idx in 0..CHILDREN.len(),
        verb in prop::sample::select(Verb::ALL.to_vec()),
        parent_id in "[a-z0-9]{1,8}",
    ) {
        let (child_kind, parent_kind, accessor) = CHILDREN[idx];
        let mut source = MemorySource::new();
        source
            .insert_entity(EntityRecord::new(parent_kind, parent_id.clone()))
            .insert_entity(EntityRecord::new(child_kind, "child").with_link(accessor, parent_id.clone()))
            .grant(alice(), Capability::new(verb, parent_kind), EntityRef::new(parent_kind, parent_id.clone()));

        let allowed = dispatch().check(
            &source,
            Capability::new(verb, child_kind),
            &alice(),
            &EntityRef::new(child_kind, "child"),
            false,
        ).unwrap();
        prop_assert!(allowed);
    }

    #[test]
    fn global_grant_short_circuits_everything(
        kind in registered_kind(),
        verb in prop::sample::select(Verb::ALL.to_vec()),
        suppress in any::<bool>(),
    ) {
        let mut source = MemorySource::new();
        source
            .insert_entity(EntityRecord::new(kind, "x"))
            .grant_global(alice(), Capability::new(verb, kind));

        let allowed = dispatch().check(
            &source,
            Capability::new(verb, kind),
            &alice(),
            &EntityRef::new(kind, "x"),
            suppress,
        ).unwrap();
        prop_assert!(allowed);
    }

    #[test]
    fn parentless_entities_deny_without_error(
        kind in registered_kind(),
        verb in prop::sample::select(Verb::ALL.to_vec()),
    ) {
        let mut source = MemorySource::new();
        source.insert_entity(EntityRecord::new(kind, "lonely"));

        let result = dispatch().check(
            &source,
            Capability::new(verb, kind),
            &alice(),
            &EntityRef::new(kind, "lonely"),
            false,
        );
        prop_assert!(matches!(result, Ok(false)));
    }
}
