//! Domain types shared across daisy_core modules.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CheckError;

/// Every entity type known to the permission engine.
///
/// The set is sealed: adding a kind means adding its delegation rule too,
/// otherwise resolver construction fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EntityKind {
    Project = 0,
    Dataset = 1,
    Contract = 2,
    PartnerRole = 3,
    Access = 4,
    LegalBasis = 5,
    Share = 6,
    DataLocation = 7,
    DataDeclaration = 8,
    Document = 9,
    Dac = 10,
    Cohort = 11,
    Contact = 12,
    Partner = 13,
    Publication = 14,
}

impl EntityKind {
    pub const ALL: [EntityKind; 15] = [
        EntityKind::Project,
        EntityKind::Dataset,
        EntityKind::Contract,
        EntityKind::PartnerRole,
        EntityKind::Access,
        EntityKind::LegalBasis,
        EntityKind::Share,
        EntityKind::DataLocation,
        EntityKind::DataDeclaration,
        EntityKind::Document,
        EntityKind::Dac,
        EntityKind::Cohort,
        EntityKind::Contact,
        EntityKind::Partner,
        EntityKind::Publication,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Dataset => "dataset",
            Self::Contract => "contract",
            Self::PartnerRole => "partner_role",
            Self::Access => "access",
            Self::LegalBasis => "legal_basis",
            Self::Share => "share",
            Self::DataLocation => "data_location",
            Self::DataDeclaration => "data_declaration",
            Self::Document => "document",
            Self::Dac => "dac",
            Self::Cohort => "cohort",
            Self::Contact => "contact",
            Self::Partner => "partner",
            Self::Publication => "publication",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CheckError::InvalidEntityKind(s.to_string()))
    }
}

/// Permission verb, the unqualified half of a [`Capability`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Verb {
    Admin = 0,
    Create = 1,
    Edit = 2,
    Delete = 3,
    View = 4,
    Protected = 5,
}

impl Verb {
    pub const ALL: [Verb; 6] = [
        Verb::Admin,
        Verb::Create,
        Verb::Edit,
        Verb::Delete,
        Verb::View,
        Verb::Protected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::View => "view",
            Self::Protected => "protected",
        }
    }

    /// Parse a verb, accepting the legacy `add`/`change` codenames.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "create" | "add" => Some(Self::Create),
            "edit" | "change" => Some(Self::Edit),
            "delete" => Some(Self::Delete),
            "view" => Some(Self::View),
            "protected" => Some(Self::Protected),
            _ => None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity-type-qualified permission, e.g. `edit_dataset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Capability {
    pub verb: Verb,
    pub kind: EntityKind,
}

impl Capability {
    pub const fn new(verb: Verb, kind: EntityKind) -> Self {
        Self { verb, kind }
    }

    /// Same verb, re-qualified for another entity type.
    pub const fn for_kind(self, kind: EntityKind) -> Self {
        Self {
            verb: self.verb,
            kind,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.verb, self.kind)
    }
}

impl FromStr for Capability {
    type Err = CheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CheckError::InvalidCapability(s.to_string());
        let (verb, kind) = s.split_once('_').ok_or_else(invalid)?;
        let verb = Verb::parse(verb).ok_or_else(invalid)?;
        let kind = kind.parse::<EntityKind>().map_err(|_| invalid())?;
        Ok(Capability { verb, kind })
    }
}

/// A user or a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Principal {
    User(String),
    Group(String),
}

impl Principal {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::Group(name.into())
    }

    pub fn id(&self) -> &str {
        match self {
            Self::User(id) | Self::Group(id) => id,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{}", id),
            Self::Group(name) => write!(f, "group:{}", name),
        }
    }
}

impl FromStr for Principal {
    type Err = CheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("user", id)) if !id.is_empty() => Ok(Self::User(id.to_string())),
            Some(("group", name)) if !name.is_empty() => Ok(Self::Group(name.to_string())),
            _ => Err(CheckError::InvalidPrincipal(s.to_string())),
        }
    }
}

/// Reference to one entity instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for EntityRef {
    type Err = CheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .filter(|(_, id)| !id.is_empty())
            .ok_or_else(|| CheckError::InvalidEntityKind(s.to_string()))?;
        Ok(EntityRef::new(kind.parse()?, id))
    }
}

/// A stored entity instance with its named links to related entities.
///
/// Links are the accessors delegation rules read: `project`, `dataset`,
/// `contract`, and for documents `content_type` + `object_id`. An absent
/// link is a null reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity: EntityRef,
    #[serde(default)]
    pub links: BTreeMap<String, String>,
}

impl EntityRecord {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            entity: EntityRef::new(kind, id),
            links: BTreeMap::new(),
        }
    }

    pub fn with_link(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.links.insert(name.into(), value.into());
        self
    }

    pub fn link(&self, name: &str) -> Option<&str> {
        self.links
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Permission check request in its wire-friendly string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub principal: Principal,
    pub capabilities: Vec<Capability>,
    pub entity: EntityRef,
    #[serde(default)]
    pub suppress_delegation: bool,
}

impl CheckRequest {
    /// Build from `CheckPermission(principal_id, capability, entity_type, entity_id, suppress)`.
    pub fn parse(
        principal: &str,
        capability: &str,
        entity_type: &str,
        entity_id: &str,
        suppress_delegation: bool,
    ) -> Result<Self, CheckError> {
        let capabilities = capability
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Capability>, _>>()?;
        if capabilities.is_empty() {
            return Err(CheckError::InvalidCapability(capability.to_string()));
        }
        Ok(Self {
            principal: principal.parse()?,
            capabilities,
            entity: EntityRef::new(entity_type.parse()?, entity_id),
            suppress_delegation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_display_and_parse() {
        let cap: Capability = "edit_dataset".parse().unwrap();
        assert_eq!(cap, Capability::new(Verb::Edit, EntityKind::Dataset));
        assert_eq!(cap.to_string(), "edit_dataset");

        let multi: Capability = "protected_partner_role".parse().unwrap();
        assert_eq!(multi.kind, EntityKind::PartnerRole);
        assert_eq!(multi.to_string(), "protected_partner_role");
    }

    #[test]
    fn capability_accepts_legacy_verbs() {
        let change: Capability = "change_contract".parse().unwrap();
        assert_eq!(change, Capability::new(Verb::Edit, EntityKind::Contract));
        let add: Capability = "add_dataset".parse().unwrap();
        assert_eq!(add.verb, Verb::Create);
    }

    #[test]
    fn capability_rejects_garbage() {
        assert!("edit".parse::<Capability>().is_err());
        assert!("fly_dataset".parse::<Capability>().is_err());
        assert!("edit_spaceship".parse::<Capability>().is_err());
    }

    #[test]
    fn for_kind_swaps_suffix_only() {
        let cap = Capability::new(Verb::Protected, EntityKind::Contract);
        assert_eq!(
            cap.for_kind(EntityKind::Project).to_string(),
            "protected_project"
        );
    }

    #[test]
    fn principal_roundtrip_through_display() {
        let p: Principal = "group:daisy-auditors".parse().unwrap();
        assert_eq!(p, Principal::group("daisy-auditors"));
        assert_eq!(p.to_string(), "group:daisy-auditors");
        assert!("alice".parse::<Principal>().is_err());
        assert!("user:".parse::<Principal>().is_err());
    }

    #[test]
    fn entity_record_treats_empty_link_as_null() {
        let record = EntityRecord::new(EntityKind::Contract, "C1").with_link("project", "");
        assert_eq!(record.link("project"), None);
    }

    #[test]
    fn check_request_parses_capability_sets() {
        let req =
            CheckRequest::parse("user:alice", "edit_dataset, view_dataset", "dataset", "D1", true)
                .unwrap();
        assert_eq!(req.capabilities.len(), 2);
        assert_eq!(req.entity, EntityRef::new(EntityKind::Dataset, "D1"));
        assert!(req.suppress_delegation);

        assert!(CheckRequest::parse("user:alice", " , ", "dataset", "D1", false).is_err());
    }
}
