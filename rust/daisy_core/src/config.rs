//! Entity fixture deserialization helpers.
//!
//! Provisioning feeds entity instances to the store as JSON, one object per
//! entity: `{"type": "dataset", "id": "D1", "project": "P1"}`. Every key other
//! than `type` and `id` becomes a link.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::{EntityKind, EntityRecord, EntityRef};

#[derive(Debug, Deserialize)]
struct EntityFixture {
    #[serde(rename = "type")]
    kind: EntityKind,
    id: String,
    #[serde(flatten)]
    links: BTreeMap<String, serde_json::Value>,
}

impl From<EntityFixture> for EntityRecord {
    fn from(fixture: EntityFixture) -> Self {
        let links = fixture
            .links
            .into_iter()
            .filter_map(|(name, value)| match value {
                serde_json::Value::String(s) => Some((name, s)),
                serde_json::Value::Number(n) => Some((name, n.to_string())),
                _ => None,
            })
            .collect();
        EntityRecord {
            entity: EntityRef::new(fixture.kind, fixture.id),
            links,
        }
    }
}

/// Parse a JSON array of entity fixtures.
pub fn parse_entity_records(json: &str) -> Result<Vec<EntityRecord>, serde_json::Error> {
    let fixtures: Vec<EntityFixture> = serde_json::from_str(json)?;
    Ok(fixtures.into_iter().map(EntityRecord::from).collect())
}
