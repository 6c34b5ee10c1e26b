//! Read side of the permission store.
//!
//! The checker only ever reads through [`PermissionSource`]. The durable
//! implementation lives in `daisy_store`; [`MemorySource`] is an indexed
//! in-memory snapshot used for embedding and tests.

use ahash::{AHashMap, AHashSet};

use crate::error::SourceError;
use crate::types::{Capability, EntityRecord, EntityRef, Principal};

/// Pure reads the checker needs from a permission store.
///
/// Implementations fold a user's group memberships into both checks: a
/// grant held by one of the user's groups counts as the user's own.
pub trait PermissionSource {
    /// Un-scoped grant lookup.
    fn check_global(&self, principal: &Principal, capability: Capability)
        -> Result<bool, SourceError>;

    /// Object-scoped grant lookup. Never follows delegation.
    fn check_direct(
        &self,
        principal: &Principal,
        capability: Capability,
        entity: &EntityRef,
    ) -> Result<bool, SourceError>;

    /// Load an entity instance, `None` if it does not exist.
    fn load_entity(&self, entity: &EntityRef) -> Result<Option<EntityRecord>, SourceError>;
}

impl<S: PermissionSource + ?Sized> PermissionSource for &S {
    fn check_global(
        &self,
        principal: &Principal,
        capability: Capability,
    ) -> Result<bool, SourceError> {
        (**self).check_global(principal, capability)
    }

    fn check_direct(
        &self,
        principal: &Principal,
        capability: Capability,
        entity: &EntityRef,
    ) -> Result<bool, SourceError> {
        (**self).check_direct(principal, capability, entity)
    }

    fn load_entity(&self, entity: &EntityRef) -> Result<Option<EntityRecord>, SourceError> {
        (**self).load_entity(entity)
    }
}

/// Key for the object-grant index: (principal, capability, entity).
type GrantKey = (Principal, Capability, EntityRef);

/// In-memory permission snapshot with O(1) lookups.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    grants: AHashSet<GrantKey>,
    global_grants: AHashSet<(Principal, Capability)>,
    entities: AHashMap<EntityRef, EntityRecord>,
    /// user id -> group principals
    user_groups: AHashMap<String, Vec<Principal>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_entity(&mut self, record: EntityRecord) -> &mut Self {
        self.entities.insert(record.entity.clone(), record);
        self
    }

    pub fn grant(
        &mut self,
        principal: Principal,
        capability: Capability,
        entity: EntityRef,
    ) -> &mut Self {
        self.grants.insert((principal, capability, entity));
        self
    }

    pub fn grant_global(&mut self, principal: Principal, capability: Capability) -> &mut Self {
        self.global_grants.insert((principal, capability));
        self
    }

    /// Make `user_id` a member of the group `group`.
    pub fn join_group(&mut self, user_id: impl Into<String>, group: impl Into<String>) -> &mut Self {
        let group = Principal::Group(group.into());
        let groups = self.user_groups.entry(user_id.into()).or_default();
        if !groups.contains(&group) {
            groups.push(group);
        }
        self
    }

    /// The principal itself followed by every group it inherits from.
    fn effective_principals<'a>(&'a self, principal: &'a Principal) -> Vec<&'a Principal> {
        let mut effective = vec![principal];
        if let Principal::User(id) = principal {
            if let Some(groups) = self.user_groups.get(id) {
                effective.extend(groups.iter());
            }
        }
        effective
    }
}

impl PermissionSource for MemorySource {
    fn check_global(
        &self,
        principal: &Principal,
        capability: Capability,
    ) -> Result<bool, SourceError> {
        Ok(self
            .effective_principals(principal)
            .into_iter()
            .any(|p| self.global_grants.contains(&(p.clone(), capability))))
    }

    fn check_direct(
        &self,
        principal: &Principal,
        capability: Capability,
        entity: &EntityRef,
    ) -> Result<bool, SourceError> {
        Ok(self
            .effective_principals(principal)
            .into_iter()
            .any(|p| {
                self.grants
                    .contains(&(p.clone(), capability, entity.clone()))
            }))
    }

    fn load_entity(&self, entity: &EntityRef) -> Result<Option<EntityRecord>, SourceError> {
        Ok(self.entities.get(entity).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityKind, Verb};

    #[test]
    fn group_grants_apply_to_members() {
        let mut source = MemorySource::new();
        let cap = Capability::new(Verb::Protected, EntityKind::Project);
        let project = EntityRef::new(EntityKind::Project, "P1");
        source
            .grant_global(Principal::group("daisy-auditors"), cap)
            .grant(
                Principal::group("daisy-legal"),
                Capability::new(Verb::Edit, EntityKind::Project),
                project.clone(),
            )
            .join_group("alice", "daisy-auditors")
            .join_group("alice", "daisy-legal");

        let alice = Principal::user("alice");
        assert!(source.check_global(&alice, cap).unwrap());
        assert!(source
            .check_direct(
                &alice,
                Capability::new(Verb::Edit, EntityKind::Project),
                &project
            )
            .unwrap());
        assert!(!source
            .check_global(&Principal::user("bob"), cap)
            .unwrap());
    }

    #[test]
    fn groups_do_not_inherit_from_groups() {
        let mut source = MemorySource::new();
        let cap = Capability::new(Verb::View, EntityKind::Dataset);
        source
            .grant_global(Principal::group("outer"), cap)
            .join_group("inner", "outer");
        // group:inner is not user:inner
        assert!(!source
            .check_global(&Principal::group("inner"), cap)
            .unwrap());
    }
}
