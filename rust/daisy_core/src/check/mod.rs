//! Permission checks with delegation to parent entities.
//!
//! A check succeeds on the first of:
//! 1. a global grant of the capability (always consulted, even when
//!    delegation is suppressed),
//! 2. a direct grant on the entity itself,
//! 3. unless suppressed, the same check re-qualified for the entity's parent.
//!
//! Suppression only covers the first hop. A capability set succeeds when
//! every member does.

use std::sync::Arc;

use tracing::debug;

use crate::delegation::DelegationResolver;
use crate::error::{CheckError, Result, SourceError};
use crate::source::PermissionSource;
use crate::types::{Capability, CheckRequest, EntityRecord, EntityRef, Principal};

fn source<T>(result: std::result::Result<T, SourceError>) -> Result<T> {
    result.map_err(CheckError::Source)
}

/// Recursive checker over one source snapshot.
pub struct PermissionChecker<'a, S: PermissionSource + ?Sized> {
    source: &'a S,
    resolver: &'a DelegationResolver,
}

impl<'a, S: PermissionSource + ?Sized> PermissionChecker<'a, S> {
    pub fn new(source: &'a S, resolver: &'a DelegationResolver) -> Self {
        Self { source, resolver }
    }

    /// Check one capability on `entity`.
    pub fn check(
        &self,
        capability: Capability,
        principal: &Principal,
        entity: &EntityRef,
        suppress_delegation: bool,
    ) -> Result<bool> {
        // Unregistered kinds fail before any store read.
        self.resolver.strategy_for(entity.kind)?;
        let record = self.load(entity)?;
        self.check_record(capability, principal, &record, suppress_delegation, 0)
    }

    fn check_record(
        &self,
        capability: Capability,
        principal: &Principal,
        record: &EntityRecord,
        suppress_delegation: bool,
        depth: usize,
    ) -> Result<bool> {
        let entity = &record.entity;
        if depth > self.resolver.max_depth() {
            return Err(CheckError::Configuration(format!(
                "delegation from '{}' exceeds {} hops",
                entity.kind,
                self.resolver.max_depth()
            )));
        }

        if source(self.source.check_global(principal, capability))? {
            return Ok(true);
        }
        if source(self.source.check_direct(principal, capability, entity))? {
            return Ok(true);
        }
        if suppress_delegation {
            return Ok(false);
        }

        let Some(parent) = self.resolver.parent_of(record)? else {
            debug!(entity = %entity, capability = %capability, "delegation chain ends");
            return Ok(false);
        };
        self.resolver.strategy_for(parent.kind)?;
        let rewritten = self.resolver.rewrite(capability, entity.kind, parent.kind)?;
        debug!(
            from = %entity,
            to = %parent,
            capability = %rewritten,
            "delegating check to parent"
        );

        // A dangling link is a dead end; the missing hop is only traced.
        let Some(parent_record) = source(self.source.load_entity(&parent))? else {
            debug!(from = %entity, to = %parent, "parent record missing");
            return Ok(false);
        };
        self.check_record(rewritten, principal, &parent_record, false, depth + 1)
    }

    fn load(&self, entity: &EntityRef) -> Result<EntityRecord> {
        source(self.source.load_entity(entity))?
            .ok_or_else(|| CheckError::NotFound(entity.clone()))
    }
}

/// Entry point for permission checks.
///
/// Holds the validated delegation table and hands each request to a
/// [`PermissionChecker`] bound to the caller's source snapshot.
#[derive(Debug, Clone)]
pub struct CheckerDispatch {
    resolver: Arc<DelegationResolver>,
}

impl CheckerDispatch {
    pub fn new(resolver: DelegationResolver) -> Self {
        Self {
            resolver: Arc::new(resolver),
        }
    }

    /// Dispatch over the standard delegation table.
    pub fn standard() -> Result<Self> {
        Ok(Self::new(DelegationResolver::standard()?))
    }

    pub fn check<S: PermissionSource + ?Sized>(
        &self,
        source: &S,
        capability: Capability,
        principal: &Principal,
        entity: &EntityRef,
        suppress_delegation: bool,
    ) -> Result<bool> {
        self.check_all(
            source,
            std::slice::from_ref(&capability),
            principal,
            entity,
            suppress_delegation,
        )
    }

    /// Logical AND over `capabilities`. An empty set is vacuously allowed.
    pub fn check_all<S: PermissionSource + ?Sized>(
        &self,
        source: &S,
        capabilities: &[Capability],
        principal: &Principal,
        entity: &EntityRef,
        suppress_delegation: bool,
    ) -> Result<bool> {
        // Unregistered kinds must raise even for an empty set.
        self.resolver.strategy_for(entity.kind)?;
        let checker = PermissionChecker::new(source, &self.resolver);
        for capability in capabilities {
            let allowed = checker.check(*capability, principal, entity, suppress_delegation)?;
            debug!(
                principal = %principal,
                capability = %capability,
                entity = %entity,
                allowed,
                "permission check"
            );
            if !allowed {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn check_request<S: PermissionSource + ?Sized>(
        &self,
        source: &S,
        request: &CheckRequest,
    ) -> Result<bool> {
        self.check_all(
            source,
            &request.capabilities,
            &request.principal,
            &request.entity,
            request.suppress_delegation,
        )
    }
}

#[cfg(test)]
mod tests;
