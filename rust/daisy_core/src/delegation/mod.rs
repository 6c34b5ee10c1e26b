//! Delegation graph: which entity an object-scoped check falls back to.
//!
//! Most entity types hold no permissions of their own. A failed check on a
//! dataset is retried on its project, a partner role on its contract, and so
//! on up to the root. The graph is fixed at compile time ([`STANDARD_RULES`])
//! and validated once when the [`DelegationResolver`] is built.

pub mod table;

use ahash::AHashMap;

use crate::error::{CheckError, Result};
use crate::membership;
use crate::types::{Capability, EntityKind, EntityRecord, EntityRef};

pub use table::STANDARD_RULES;

/// Per-type resolution behavior: where to go next and how to re-qualify the
/// capability on the way.
pub trait DelegationStrategy {
    /// Parent of `record`, or `None` at a root or a null parent reference.
    fn parent(&self, record: &EntityRecord) -> Option<EntityRef>;

    /// Capability to test on a parent of type `parent_kind`.
    fn rewrite(&self, capability: Capability, parent_kind: EntityKind) -> Capability {
        capability.for_kind(parent_kind)
    }
}

/// One row of the delegation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationRule {
    /// No parent; checks end here.
    Root,
    /// Fixed parent type, id read from the `accessor` link.
    Parent {
        parent: EntityKind,
        accessor: &'static str,
    },
    /// Parent type chosen at runtime from the `discriminator` link, id read
    /// from the `accessor` link. Unmatched discriminators use `fallback`.
    Discriminated {
        discriminator: &'static str,
        accessor: &'static str,
        branches: &'static [(&'static str, EntityKind)],
        fallback: EntityKind,
    },
}

impl DelegationRule {
    /// Every entity kind this rule can resolve to.
    pub fn parent_kinds(&self) -> Vec<EntityKind> {
        match self {
            Self::Root => Vec::new(),
            Self::Parent { parent, .. } => vec![*parent],
            Self::Discriminated {
                branches, fallback, ..
            } => {
                let mut kinds: Vec<EntityKind> = branches.iter().map(|(_, k)| *k).collect();
                if !kinds.contains(fallback) {
                    kinds.push(*fallback);
                }
                kinds
            }
        }
    }
}

impl DelegationStrategy for DelegationRule {
    fn parent(&self, record: &EntityRecord) -> Option<EntityRef> {
        match self {
            Self::Root => None,
            Self::Parent { parent, accessor } => record
                .link(accessor)
                .map(|id| EntityRef::new(*parent, id)),
            Self::Discriminated {
                discriminator,
                accessor,
                branches,
                fallback,
            } => {
                let id = record.link(accessor)?;
                let tag = record.link(discriminator).unwrap_or_default();
                let kind = branches
                    .iter()
                    .find(|(value, _)| *value == tag)
                    .map(|(_, kind)| *kind)
                    .unwrap_or(*fallback);
                Some(EntityRef::new(kind, id))
            }
        }
    }
}

/// Validated, immutable delegation table.
///
/// Construction guarantees: every parent kind a rule can reach is itself
/// registered, every membership-capable kind is registered, and following
/// parents from any kind terminates at a root.
#[derive(Debug, Clone)]
pub struct DelegationResolver {
    rules: AHashMap<EntityKind, DelegationRule>,
    max_depth: usize,
}

impl DelegationResolver {
    /// The production table.
    pub fn standard() -> Result<Self> {
        Self::from_rules(STANDARD_RULES.iter().copied())
    }

    /// Build and validate a table from explicit rules.
    pub fn from_rules(rules: impl IntoIterator<Item = (EntityKind, DelegationRule)>) -> Result<Self> {
        let mut table = AHashMap::new();
        for (kind, rule) in rules {
            if table.insert(kind, rule).is_some() {
                return Err(CheckError::Configuration(format!(
                    "duplicate rule for entity type '{}'",
                    kind
                )));
            }
        }

        for (kind, rule) in &table {
            for parent in rule.parent_kinds() {
                if !table.contains_key(&parent) {
                    return Err(CheckError::Configuration(format!(
                        "'{}' delegates to unregistered type '{}'",
                        kind, parent
                    )));
                }
            }
        }

        for kind in membership::MEMBERSHIP_KINDS {
            if !table.contains_key(&kind) {
                return Err(CheckError::Configuration(format!(
                    "membership type '{}' has no delegation rule",
                    kind
                )));
            }
        }

        let max_depth = longest_chain(&table)?;
        Ok(Self {
            rules: table,
            max_depth,
        })
    }

    /// Strategy for `kind`, or [`CheckError::Unregistered`].
    pub fn strategy_for(&self, kind: EntityKind) -> Result<&DelegationRule> {
        self.rules.get(&kind).ok_or(CheckError::Unregistered(kind))
    }

    /// Parent of `record`, dispatching on its kind.
    pub fn parent_of(&self, record: &EntityRecord) -> Result<Option<EntityRef>> {
        Ok(self.strategy_for(record.entity.kind)?.parent(record))
    }

    /// Capability to test on `parent_kind` when delegating from `capability`.
    pub fn rewrite(
        &self,
        capability: Capability,
        from: EntityKind,
        parent_kind: EntityKind,
    ) -> Result<Capability> {
        Ok(self
            .strategy_for(from)?
            .rewrite(capability, parent_kind))
    }

    /// Longest parent chain in the table, in hops.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Depth-first walk over every kind; errors on a cycle.
fn longest_chain(table: &AHashMap<EntityKind, DelegationRule>) -> Result<usize> {
    fn depth(
        kind: EntityKind,
        table: &AHashMap<EntityKind, DelegationRule>,
        path: &mut Vec<EntityKind>,
        memo: &mut AHashMap<EntityKind, usize>,
    ) -> Result<usize> {
        if let Some(&d) = memo.get(&kind) {
            return Ok(d);
        }
        if path.contains(&kind) {
            let cycle: Vec<&str> = path.iter().map(EntityKind::as_str).collect();
            return Err(CheckError::Configuration(format!(
                "delegation cycle through '{}' ({})",
                kind,
                cycle.join(" -> ")
            )));
        }
        path.push(kind);
        let mut longest = 0;
        if let Some(rule) = table.get(&kind) {
            for parent in rule.parent_kinds() {
                longest = longest.max(depth(parent, table, path, memo)? + 1);
            }
        }
        path.pop();
        memo.insert(kind, longest);
        Ok(longest)
    }

    let mut memo = AHashMap::new();
    let mut longest = 0;
    for kind in table.keys() {
        longest = longest.max(depth(*kind, table, &mut Vec::new(), &mut memo)?);
    }
    Ok(longest)
}
