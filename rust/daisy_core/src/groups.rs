//! Default capabilities of the built-in groups.
//!
//! These are class-level permissions: a member of a group listed here holds
//! the capability on every instance of the entity type, without any
//! object-level grant. They are applied as global grants by the seeder and
//! never consulted at check time.

use std::fmt;
use std::str::FromStr;

use crate::error::CheckError;
use crate::types::{Capability, EntityKind, Principal, Verb};

/// Groups whose global grants are managed by the seeder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefaultGroup {
    DataSteward,
    Vip,
    Auditor,
    Legal,
}

impl DefaultGroup {
    pub const ALL: [DefaultGroup; 4] = [
        DefaultGroup::DataSteward,
        DefaultGroup::Vip,
        DefaultGroup::Auditor,
        DefaultGroup::Legal,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::DataSteward => "daisy-data-steward",
            Self::Vip => "daisy-vip",
            Self::Auditor => "daisy-auditors",
            Self::Legal => "daisy-legal",
        }
    }

    pub fn principal(&self) -> Principal {
        Principal::group(self.name())
    }
}

impl fmt::Display for DefaultGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DefaultGroup {
    type Err = CheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|g| g.name() == s)
            .ok_or_else(|| CheckError::InvalidPrincipal(format!("group:{}", s)))
    }
}

/// Entity types the data stewards administer.
const STEWARD_KINDS: [EntityKind; 13] = [
    EntityKind::Access,
    EntityKind::Cohort,
    EntityKind::Contact,
    EntityKind::Contract,
    EntityKind::DataDeclaration,
    EntityKind::Dataset,
    EntityKind::Document,
    EntityKind::LegalBasis,
    EntityKind::Partner,
    EntityKind::Project,
    EntityKind::Publication,
    EntityKind::Share,
    EntityKind::DataLocation,
];

/// Only these types carry the `admin` and `protected` verbs.
const PRIVILEGED_KINDS: [EntityKind; 3] =
    [EntityKind::Contract, EntityKind::Dataset, EntityKind::Project];

const LEGAL_VERBS: [Verb; 3] = [Verb::Edit, Verb::Protected, Verb::Delete];

/// Immutable group → capability table, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDefaultMapping {
    entries: Vec<(DefaultGroup, Capability)>,
}

impl GroupDefaultMapping {
    pub fn standard() -> Self {
        let mut entries = Vec::new();

        for kind in STEWARD_KINDS {
            for verb in Verb::ALL {
                let privileged = matches!(verb, Verb::Admin | Verb::Protected);
                if !privileged || PRIVILEGED_KINDS.contains(&kind) {
                    entries.push((DefaultGroup::DataSteward, Capability::new(verb, kind)));
                }
            }
        }

        for kind in PRIVILEGED_KINDS {
            entries.push((DefaultGroup::Auditor, Capability::new(Verb::Protected, kind)));
        }

        for verb in LEGAL_VERBS {
            entries.push((DefaultGroup::Legal, Capability::new(verb, EntityKind::Contract)));
        }

        Self::from_entries(entries)
    }

    /// Build a mapping from explicit rows; duplicates are dropped.
    pub fn from_entries(entries: impl IntoIterator<Item = (DefaultGroup, Capability)>) -> Self {
        let mut entries: Vec<_> = entries.into_iter().collect();
        entries.sort();
        entries.dedup();
        Self { entries }
    }

    pub fn capabilities_of(&self, group: DefaultGroup) -> impl Iterator<Item = Capability> + '_ {
        self.entries
            .iter()
            .filter(move |(g, _)| *g == group)
            .map(|(_, cap)| *cap)
    }

    /// Groups the seeder owns. Every default group is managed, including
    /// those with an empty row set, so stale seeded grants get cleared.
    pub fn managed_groups(&self) -> &'static [DefaultGroup] {
        &DefaultGroup::ALL
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for GroupDefaultMapping {
    fn default() -> Self {
        Self::standard()
    }
}
