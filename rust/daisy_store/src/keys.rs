//! Composite row keys.
//!
//! Every key is a NUL-separated sequence of text segments, so byte order
//! groups rows by their leading segments and prefix scans select exactly one
//! group. NUL and empty segments are rejected on the way in.
//!
//! | table           | key                                      |
//! |-----------------|------------------------------------------|
//! | `entities`      | kind \0 id                               |
//! | `grants`        | kind \0 id \0 principal \0 capability    |
//! | `global_grants` | principal \0 capability                  |
//! | `memberships`   | kind \0 id \0 principal                  |
//! | `group_members` | user \0 group                            |
//! | `audit`         | seq (u64 BE)                             |

use daisy_core::types::{Capability, EntityKind, EntityRef, Principal};

use crate::error::{Result, StoreError};

const SEP: u8 = 0;

fn check_segment(segment: &str) -> Result<()> {
    if segment.is_empty() || segment.as_bytes().contains(&SEP) {
        return Err(StoreError::InvalidKey(segment.to_string()));
    }
    Ok(())
}

fn join(segments: &[&str]) -> Result<Vec<u8>> {
    let mut key = Vec::with_capacity(segments.iter().map(|s| s.len() + 1).sum());
    for (i, segment) in segments.iter().enumerate() {
        check_segment(segment)?;
        if i > 0 {
            key.push(SEP);
        }
        key.extend_from_slice(segment.as_bytes());
    }
    Ok(key)
}

fn split(key: &[u8]) -> Option<Vec<&str>> {
    key.split(|b| *b == SEP)
        .map(|s| std::str::from_utf8(s).ok())
        .collect()
}

/// `key` followed by the separator, for scanning every row under it.
pub fn prefix_of(mut key: Vec<u8>) -> Vec<u8> {
    key.push(SEP);
    key
}

/// Compute the successor of a byte prefix for range scans.
///
/// Returns `None` if the prefix is all 0xFF bytes (no upper bound exists).
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.last_mut() {
        if *last == 0xFF {
            upper.pop();
        } else {
            *last += 1;
            return Some(upper);
        }
    }
    None
}

fn principal_segment(principal: &Principal) -> Result<String> {
    check_segment(principal.id())?;
    Ok(principal.to_string())
}

pub fn entity_key(entity: &EntityRef) -> Result<Vec<u8>> {
    join(&[entity.kind.as_str(), &entity.id])
}

pub fn grant_key(entity: &EntityRef, principal: &Principal, capability: Capability) -> Result<Vec<u8>> {
    let principal = principal_segment(principal)?;
    join(&[
        entity.kind.as_str(),
        &entity.id,
        &principal,
        &capability.to_string(),
    ])
}

pub fn decode_grant_key(key: &[u8]) -> Option<(EntityRef, Principal, Capability)> {
    match split(key)?.as_slice() {
        [kind, id, principal, capability] => Some((
            EntityRef::new(kind.parse::<EntityKind>().ok()?, *id),
            principal.parse().ok()?,
            capability.parse().ok()?,
        )),
        _ => None,
    }
}

pub fn global_key(principal: &Principal, capability: Capability) -> Result<Vec<u8>> {
    let principal = principal_segment(principal)?;
    join(&[&principal, &capability.to_string()])
}

pub fn decode_global_key(key: &[u8]) -> Option<(Principal, Capability)> {
    match split(key)?.as_slice() {
        [principal, capability] => Some((principal.parse().ok()?, capability.parse().ok()?)),
        _ => None,
    }
}

/// Prefix of every global grant held by `principal`.
pub fn global_prefix(principal: &Principal) -> Result<Vec<u8>> {
    let principal = principal_segment(principal)?;
    Ok(prefix_of(join(&[&principal])?))
}

pub fn membership_key(entity: &EntityRef, principal: &Principal) -> Result<Vec<u8>> {
    let principal = principal_segment(principal)?;
    join(&[entity.kind.as_str(), &entity.id, &principal])
}

pub fn decode_membership_key(key: &[u8]) -> Option<(EntityRef, Principal)> {
    match split(key)?.as_slice() {
        [kind, id, principal] => Some((
            EntityRef::new(kind.parse::<EntityKind>().ok()?, *id),
            principal.parse().ok()?,
        )),
        _ => None,
    }
}

pub fn group_member_key(user_id: &str, group: &str) -> Result<Vec<u8>> {
    join(&[user_id, group])
}

pub fn decode_group_member_key(key: &[u8]) -> Option<(String, String)> {
    match split(key)?.as_slice() {
        [user, group] => Some((user.to_string(), group.to_string())),
        _ => None,
    }
}

pub fn user_groups_prefix(user_id: &str) -> Result<Vec<u8>> {
    Ok(prefix_of(join(&[user_id])?))
}

pub fn audit_key(seq: u64) -> [u8; 8] {
    seq.to_be_bytes()
}

pub fn decode_audit_key(key: &[u8]) -> Option<u64> {
    Some(u64::from_be_bytes(key.try_into().ok()?))
}
