//! Append-only audit trail of grant state changes.
//!
//! One record per net transition: a grant row appearing or disappearing.
//! Flag-only changes on an existing row (e.g. a membership grant gaining an
//! explicit reason) are not audited.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use daisy_core::types::{Capability, EntityRef, Principal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Grant,
    Revoke,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grant => f.write_str("grant"),
            Self::Revoke => f.write_str("revoke"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub seq: u64,
    /// Unix epoch milliseconds.
    pub timestamp_ms: u64,
    pub action: AuditAction,
    pub principal: Principal,
    pub capability: Capability,
    /// `None` for global grants.
    pub entity: Option<EntityRef>,
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} {} {}",
            self.seq, self.timestamp_ms, self.action, self.principal, self.capability
        )?;
        match &self.entity {
            Some(entity) => write!(f, " on {}", entity),
            None => f.write_str(" (global)"),
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
