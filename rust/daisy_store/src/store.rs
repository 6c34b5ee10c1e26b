//! redb-backed permission store.
//!
//! Reads go through a [`StoreSnapshot`] (one read transaction), writes
//! through a [`StoreTxn`] handed out by [`PermissionStore::write`]. redb
//! admits one writer at a time, so concurrent mutations serialize.
//!
//! Every grant row carries [`GrantFlags`]: the reasons it exists. A row is
//! present while at least one reason is set, and an audit record is written
//! only when a row appears or disappears.

use std::path::Path;
use std::sync::Arc;

use redb::backends::InMemoryBackend;
use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use daisy_core::error::SourceError;
use daisy_core::source::PermissionSource;
use daisy_core::types::{Capability, EntityRecord, EntityRef, Principal};

use crate::audit::{self, AuditAction, AuditRecord};
use crate::error::{Result, StoreError};
use crate::keys;

type Bytes = &'static [u8];
type RawTable = TableDefinition<'static, Bytes, Bytes>;

const ENTITIES: RawTable = TableDefinition::new("entities");
const GRANTS: RawTable = TableDefinition::new("grants");
const GLOBAL_GRANTS: RawTable = TableDefinition::new("global_grants");
const MEMBERSHIPS: RawTable = TableDefinition::new("memberships");
const GROUP_MEMBERS: RawTable = TableDefinition::new("group_members");
const AUDIT: RawTable = TableDefinition::new("audit");

const ALL_TABLES: [RawTable; 6] = [
    ENTITIES,
    GRANTS,
    GLOBAL_GRANTS,
    MEMBERSHIPS,
    GROUP_MEMBERS,
    AUDIT,
];

/// Why a grant row exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Granted directly by an operator or API call.
    Explicit,
    /// Implied by a custodian membership.
    Membership,
    /// Applied by the group default seeder.
    Seeded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantFlags {
    pub explicit: bool,
    pub membership: bool,
    pub seeded: bool,
}

impl GrantFlags {
    pub fn has(&self, provenance: Provenance) -> bool {
        match provenance {
            Provenance::Explicit => self.explicit,
            Provenance::Membership => self.membership,
            Provenance::Seeded => self.seeded,
        }
    }

    fn with(mut self, provenance: Provenance, on: bool) -> Self {
        match provenance {
            Provenance::Explicit => self.explicit = on,
            Provenance::Membership => self.membership = on,
            Provenance::Seeded => self.seeded = on,
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        !(self.explicit || self.membership || self.seeded)
    }
}

/// One object-scoped grant row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRow {
    pub principal: Principal,
    pub capability: Capability,
    pub entity: EntityRef,
    pub flags: GrantFlags,
}

/// Everything a principal holds, excluding what it inherits from groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrincipalGrants {
    pub object: Vec<GrantRow>,
    pub global: Vec<(Capability, GrantFlags)>,
}

fn corrupt(table: &'static str, key: &[u8]) -> StoreError {
    StoreError::Corrupt {
        table,
        detail: format!("undecodable key {:?}", key),
    }
}

fn get_value<T, R>(table: &T, key: &[u8]) -> Result<Option<R>>
where
    T: ReadableTable<Bytes, Bytes>,
    R: DeserializeOwned,
{
    match table.get(key)? {
        Some(guard) => Ok(Some(bincode::deserialize(guard.value())?)),
        None => Ok(None),
    }
}

/// Collect every row under `prefix`; an empty prefix scans the whole table.
fn scan_prefix<T>(table: &T, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>
where
    T: ReadableTable<Bytes, Bytes>,
{
    let iter = if let Some(upper) = keys::prefix_upper_bound(prefix) {
        table.range::<&[u8]>(prefix..upper.as_slice())?
    } else {
        table.range::<&[u8]>(prefix..)?
    };
    let mut rows = Vec::new();
    for entry in iter {
        let (k, v) = entry?;
        rows.push((k.value().to_vec(), v.value().to_vec()));
    }
    Ok(rows)
}

/// Reads shared by snapshots and write transactions.
///
/// Lookups are exact: group memberships are only folded in by the
/// [`PermissionSource`] impl on [`StoreSnapshot`].
pub trait StoreRead {
    #[doc(hidden)]
    fn table(&self, def: RawTable) -> Result<impl ReadableTable<Bytes, Bytes> + '_>;

    fn entity(&self, entity: &EntityRef) -> Result<Option<EntityRecord>> {
        let key = keys::entity_key(entity)?;
        get_value(&self.table(ENTITIES)?, &key)
    }

    fn grant_flags(
        &self,
        principal: &Principal,
        capability: Capability,
        entity: &EntityRef,
    ) -> Result<Option<GrantFlags>> {
        let key = keys::grant_key(entity, principal, capability)?;
        get_value(&self.table(GRANTS)?, &key)
    }

    fn global_flags(&self, principal: &Principal, capability: Capability) -> Result<Option<GrantFlags>> {
        let key = keys::global_key(principal, capability)?;
        get_value(&self.table(GLOBAL_GRANTS)?, &key)
    }

    /// Grant rows on one entity.
    fn grants_on(&self, entity: &EntityRef) -> Result<Vec<GrantRow>> {
        let prefix = keys::prefix_of(keys::entity_key(entity)?);
        decode_grants(scan_prefix(&self.table(GRANTS)?, &prefix)?)
    }

    fn all_grants(&self) -> Result<Vec<GrantRow>> {
        decode_grants(scan_prefix(&self.table(GRANTS)?, &[])?)
    }

    /// Global grants held directly by `principal`.
    fn global_grants_of(&self, principal: &Principal) -> Result<Vec<(Capability, GrantFlags)>> {
        let prefix = keys::global_prefix(principal)?;
        let mut grants = Vec::new();
        for (key, value) in scan_prefix(&self.table(GLOBAL_GRANTS)?, &prefix)? {
            let (_, capability) =
                keys::decode_global_key(&key).ok_or_else(|| corrupt("global_grants", &key))?;
            grants.push((capability, bincode::deserialize(&value)?));
        }
        Ok(grants)
    }

    fn grants_for(&self, principal: &Principal) -> Result<PrincipalGrants> {
        let object = self
            .all_grants()?
            .into_iter()
            .filter(|row| &row.principal == principal)
            .collect();
        Ok(PrincipalGrants {
            object,
            global: self.global_grants_of(principal)?,
        })
    }

    fn is_custodian(&self, entity: &EntityRef, principal: &Principal) -> Result<bool> {
        let key = keys::membership_key(entity, principal)?;
        let found = self.table(MEMBERSHIPS)?.get(key.as_slice())?.is_some();
        Ok(found)
    }

    fn custodians(&self, entity: &EntityRef) -> Result<Vec<Principal>> {
        let prefix = keys::prefix_of(keys::entity_key(entity)?);
        scan_prefix(&self.table(MEMBERSHIPS)?, &prefix)?
            .into_iter()
            .map(|(key, _)| {
                keys::decode_membership_key(&key)
                    .map(|(_, principal)| principal)
                    .ok_or_else(|| corrupt("memberships", &key))
            })
            .collect()
    }

    fn memberships(&self) -> Result<Vec<(EntityRef, Principal)>> {
        scan_prefix(&self.table(MEMBERSHIPS)?, &[])?
            .into_iter()
            .map(|(key, _)| {
                keys::decode_membership_key(&key).ok_or_else(|| corrupt("memberships", &key))
            })
            .collect()
    }

    /// Names of the groups `user_id` belongs to.
    fn groups_of(&self, user_id: &str) -> Result<Vec<String>> {
        let prefix = keys::user_groups_prefix(user_id)?;
        scan_prefix(&self.table(GROUP_MEMBERS)?, &prefix)?
            .into_iter()
            .map(|(key, _)| {
                keys::decode_group_member_key(&key)
                    .map(|(_, group)| group)
                    .ok_or_else(|| corrupt("group_members", &key))
            })
            .collect()
    }

    /// The principal itself followed by every group it inherits from.
    fn effective_principals(&self, principal: &Principal) -> Result<Vec<Principal>> {
        let mut effective = vec![principal.clone()];
        if let Principal::User(id) = principal {
            effective.extend(self.groups_of(id)?.into_iter().map(Principal::Group));
        }
        Ok(effective)
    }

    /// Audit records with a sequence number greater than `after`.
    fn audit_since(&self, after: u64) -> Result<Vec<AuditRecord>> {
        if after == u64::MAX {
            return Ok(Vec::new());
        }
        let start = keys::audit_key(after + 1);
        let table = self.table(AUDIT)?;
        let mut records = Vec::new();
        for entry in table.range::<&[u8]>(start.as_slice()..)? {
            let (_, v) = entry?;
            records.push(bincode::deserialize(v.value())?);
        }
        Ok(records)
    }

    fn last_audit_seq(&self) -> Result<u64> {
        let table = self.table(AUDIT)?;
        let last = match table.iter()?.next_back() {
            Some(entry) => {
                let (k, _) = entry?;
                let seq = keys::decode_audit_key(k.value());
                seq.ok_or_else(|| corrupt("audit", k.value()))?
            }
            None => 0,
        };
        Ok(last)
    }
}

fn decode_grants(rows: Vec<(Vec<u8>, Vec<u8>)>) -> Result<Vec<GrantRow>> {
    let mut grants = Vec::with_capacity(rows.len());
    for (key, value) in rows {
        let (entity, principal, capability) =
            keys::decode_grant_key(&key).ok_or_else(|| corrupt("grants", &key))?;
        grants.push(GrantRow {
            principal,
            capability,
            entity,
            flags: bincode::deserialize(&value)?,
        });
    }
    Ok(grants)
}

/// Handle to the permission database.
///
/// Cheap to clone; every clone shares the same database.
#[derive(Clone)]
pub struct PermissionStore {
    db: Arc<Database>,
}

impl PermissionStore {
    /// Open or create a store at `path`, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path)?;
        info!(path = %path.display(), "opened permission store");
        Self::init(db)
    }

    /// Open a store that lives only in memory.
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        let txn = db.begin_write()?;
        for def in ALL_TABLES {
            txn.open_table(def)?;
        }
        txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Consistent read view of the current state.
    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        Ok(StoreSnapshot {
            txn: self.db.begin_read()?,
        })
    }

    /// Run `f` in one write transaction: committed if it returns `Ok`,
    /// rolled back otherwise.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut StoreTxn) -> Result<T>,
    {
        let mut txn = StoreTxn {
            txn: self.db.begin_write()?,
            next_seq: None,
        };
        match f(&mut txn) {
            Ok(value) => {
                txn.txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "rolling back write transaction");
                if let Err(abort) = txn.txn.abort() {
                    warn!(error = %abort, "failed to abort write transaction");
                }
                Err(err)
            }
        }
    }
}

/// Read transaction over the store.
pub struct StoreSnapshot {
    txn: ReadTransaction,
}

impl StoreRead for StoreSnapshot {
    fn table(&self, def: RawTable) -> Result<impl ReadableTable<Bytes, Bytes> + '_> {
        Ok(self.txn.open_table(def)?)
    }
}

impl PermissionSource for StoreSnapshot {
    fn check_global(
        &self,
        principal: &Principal,
        capability: Capability,
    ) -> std::result::Result<bool, SourceError> {
        for p in self.effective_principals(principal)? {
            if self.global_flags(&p, capability)?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn check_direct(
        &self,
        principal: &Principal,
        capability: Capability,
        entity: &EntityRef,
    ) -> std::result::Result<bool, SourceError> {
        for p in self.effective_principals(principal)? {
            if self.grant_flags(&p, capability, entity)?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn load_entity(&self, entity: &EntityRef) -> std::result::Result<Option<EntityRecord>, SourceError> {
        Ok(self.entity(entity)?)
    }
}

/// Write transaction over the store.
///
/// Mutations are idempotent. Methods that change grants return whether the
/// row itself appeared or disappeared.
pub struct StoreTxn {
    txn: WriteTransaction,
    next_seq: Option<u64>,
}

impl StoreRead for StoreTxn {
    fn table(&self, def: RawTable) -> Result<impl ReadableTable<Bytes, Bytes> + '_> {
        Ok(self.txn.open_table(def)?)
    }
}

impl StoreTxn {
    fn insert_raw(&self, def: RawTable, key: &[u8], value: &[u8]) -> Result<bool> {
        let mut table = self.txn.open_table(def)?;
        let existed = table.insert(key, value)?.is_some();
        Ok(existed)
    }

    fn remove_raw(&self, def: RawTable, key: &[u8]) -> Result<bool> {
        let mut table = self.txn.open_table(def)?;
        let existed = table.remove(key)?.is_some();
        Ok(existed)
    }

    fn append_audit(
        &mut self,
        action: AuditAction,
        principal: &Principal,
        capability: Capability,
        entity: Option<&EntityRef>,
    ) -> Result<()> {
        let seq = match self.next_seq {
            Some(seq) => seq,
            None => self.last_audit_seq()? + 1,
        };
        let record = AuditRecord {
            seq,
            timestamp_ms: audit::now_millis(),
            action,
            principal: principal.clone(),
            capability,
            entity: entity.cloned(),
        };
        let bytes = bincode::serialize(&record)?;
        self.insert_raw(AUDIT, &keys::audit_key(seq), &bytes)?;
        self.next_seq = Some(seq + 1);
        Ok(())
    }

    /// Set or clear one reason on a grant row, in `GRANTS` when `entity` is
    /// given and in `GLOBAL_GRANTS` otherwise.
    fn set_reason(
        &mut self,
        principal: &Principal,
        capability: Capability,
        entity: Option<&EntityRef>,
        provenance: Provenance,
        on: bool,
    ) -> Result<bool> {
        let (def, key) = match entity {
            Some(entity) => (GRANTS, keys::grant_key(entity, principal, capability)?),
            None => (GLOBAL_GRANTS, keys::global_key(principal, capability)?),
        };
        let current: Option<GrantFlags> = get_value(&self.table(def)?, &key)?;
        let before = current.unwrap_or_default();
        if before.has(provenance) == on {
            return Ok(false);
        }
        let after = before.with(provenance, on);

        if after.is_empty() {
            self.remove_raw(def, &key)?;
        } else {
            self.insert_raw(def, &key, &bincode::serialize(&after)?)?;
        }

        let action = match (current.is_some(), after.is_empty()) {
            (false, false) => AuditAction::Grant,
            (true, true) => AuditAction::Revoke,
            _ => {
                debug!(
                    principal = %principal,
                    capability = %capability,
                    ?provenance,
                    on,
                    "grant reason updated"
                );
                return Ok(false);
            }
        };
        self.append_audit(action, principal, capability, entity)?;
        match entity {
            Some(entity) => info!(%action, principal = %principal, capability = %capability, entity = %entity, "grant changed"),
            None => info!(%action, principal = %principal, capability = %capability, "global grant changed"),
        }
        Ok(true)
    }

    pub fn grant(
        &mut self,
        principal: &Principal,
        capability: Capability,
        entity: &EntityRef,
        provenance: Provenance,
    ) -> Result<bool> {
        self.set_reason(principal, capability, Some(entity), provenance, true)
    }

    /// Withdraw one reason; the row survives while another reason holds it.
    pub fn revoke(
        &mut self,
        principal: &Principal,
        capability: Capability,
        entity: &EntityRef,
        provenance: Provenance,
    ) -> Result<bool> {
        self.set_reason(principal, capability, Some(entity), provenance, false)
    }

    pub fn grant_global(
        &mut self,
        principal: &Principal,
        capability: Capability,
        provenance: Provenance,
    ) -> Result<bool> {
        self.set_reason(principal, capability, None, provenance, true)
    }

    pub fn revoke_global(
        &mut self,
        principal: &Principal,
        capability: Capability,
        provenance: Provenance,
    ) -> Result<bool> {
        self.set_reason(principal, capability, None, provenance, false)
    }

    /// Insert or replace an entity record.
    pub fn put_entity(&mut self, record: &EntityRecord) -> Result<()> {
        let key = keys::entity_key(&record.entity)?;
        self.insert_raw(ENTITIES, &key, &bincode::serialize(record)?)?;
        Ok(())
    }

    /// Remove an entity together with its grants and custodians.
    ///
    /// Returns whether the entity record existed. Records that name the
    /// entity as their parent are left alone; delegation through them is
    /// denied until they are re-parented.
    pub fn delete_entity(&mut self, entity: &EntityRef) -> Result<bool> {
        for row in self.grants_on(entity)? {
            let key = keys::grant_key(&row.entity, &row.principal, row.capability)?;
            self.remove_raw(GRANTS, &key)?;
            self.append_audit(AuditAction::Revoke, &row.principal, row.capability, Some(entity))?;
        }
        for principal in self.custodians(entity)? {
            self.remove_raw(MEMBERSHIPS, &keys::membership_key(entity, &principal)?)?;
        }
        let existed = self.remove_raw(ENTITIES, &keys::entity_key(entity)?)?;
        if existed {
            info!(entity = %entity, "entity deleted");
        }
        Ok(existed)
    }

    /// Record a custodian. Returns `false` if already recorded.
    pub fn add_membership(&mut self, entity: &EntityRef, principal: &Principal) -> Result<bool> {
        let key = keys::membership_key(entity, principal)?;
        Ok(!self.insert_raw(MEMBERSHIPS, &key, &[])?)
    }

    /// Drop a custodian. Returns `false` if it was not recorded.
    pub fn remove_membership(&mut self, entity: &EntityRef, principal: &Principal) -> Result<bool> {
        let key = keys::membership_key(entity, principal)?;
        self.remove_raw(MEMBERSHIPS, &key)
    }

    pub fn add_group_member(&mut self, user_id: &str, group: &str) -> Result<bool> {
        let key = keys::group_member_key(user_id, group)?;
        Ok(!self.insert_raw(GROUP_MEMBERS, &key, &[])?)
    }

    pub fn remove_group_member(&mut self, user_id: &str, group: &str) -> Result<bool> {
        let key = keys::group_member_key(user_id, group)?;
        self.remove_raw(GROUP_MEMBERS, &key)
    }
}
