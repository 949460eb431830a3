//! Effective access resolution.
//!
//! Read-only and fail-closed throughout: a missing user, object, field or
//! permission row contributes nothing, and no query here ever reports
//! "not found". Callers making security decisions must not be able to tell
//! absent data from an explicit deny.

use std::collections::HashSet;

use heed::RoTxn;
use tracing::trace;

use crate::catalog::resolve_field;
use crate::constants::{
    FIELD_EDIT, FIELD_READ, MAX_ROLE_DEPTH, MODIFY_ALL, READ, UPDATE, VIEW_ALL,
};
use crate::db::{Dbs, Store};
use crate::error::{err, Result};
use crate::model::{
    AccessLevel, Criterion, FieldAccess, ObjectAccess, Principal, Record, RecordAccess,
    RuleKind, ShareTarget, User,
};
use crate::sharing::criterion_matches;

/// Flattened permission set ids for a user: direct assignments first, then
/// group members, deduplicated in first-seen order.
fn effective_sets(d: &Dbs, tx: &RoTxn, user: &User) -> Result<Vec<u64>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for &s in &user.permission_set_ids {
        if seen.insert(s) {
            out.push(s);
        }
    }
    for &g in &user.permission_set_group_ids {
        if let Some(group) = d.perm_set_groups.get(tx, &g).map_err(err)? {
            for &s in &group.permission_set_ids {
                if seen.insert(s) {
                    out.push(s);
                }
            }
        }
    }
    Ok(out)
}

/// Principal codes contributing to a user's effective permissions
fn source_codes(d: &Dbs, tx: &RoTxn, user: &User) -> Result<Vec<u64>> {
    let mut codes = Vec::new();
    if let Some(p) = user.profile_id {
        codes.push(Principal::Profile(p).encode());
    }
    for s in effective_sets(d, tx, user)? {
        codes.push(Principal::PermissionSet(s).encode());
    }
    Ok(codes)
}

/// OR of the object permission masks across all of a user's sources
fn object_mask(d: &Dbs, tx: &RoTxn, user: &User, object_id: u64) -> Result<u64> {
    let mut mask = 0;
    for code in source_codes(d, tx, user)? {
        mask |= d.object_perms.get(tx, code, object_id)?;
    }
    Ok(mask)
}

/// True when the chain from `start` up through parents contains `target`
fn role_chain_contains(d: &Dbs, tx: &RoTxn, start: Option<u64>, target: u64) -> Result<bool> {
    let Some(mut cur) = start else {
        return Ok(false);
    };
    let mut seen = HashSet::new();
    for _ in 0..MAX_ROLE_DEPTH {
        if cur == target {
            return Ok(true);
        }
        if !seen.insert(cur) {
            break; // corrupted hierarchy; stop rather than spin
        }
        match d.roles.get(tx, &cur).map_err(err)?.and_then(|r| r.parent_id) {
            Some(p) => cur = p,
            None => break,
        }
    }
    Ok(false)
}

/// True when the user's role sits strictly above the owner's role
fn manages_owner(d: &Dbs, tx: &RoTxn, user: &User, owner: &User) -> Result<bool> {
    let (Some(ur), Some(or)) = (user.role_id, owner.role_id) else {
        return Ok(false);
    };
    if ur == or {
        return Ok(false);
    }
    let parent = d.roles.get(tx, &or).map_err(err)?.and_then(|r| r.parent_id);
    role_chain_contains(d, tx, parent, ur)
}

/// Does this sharing target cover the user?
fn target_matches(
    d: &Dbs,
    tx: &RoTxn,
    user: &User,
    sets: &[u64],
    target: ShareTarget,
) -> Result<bool> {
    match target {
        ShareTarget::User(id) => Ok(id == user.id),
        // Role targets cover the role and every role below it
        ShareTarget::Role(id) => role_chain_contains(d, tx, user.role_id, id),
        ShareTarget::Group(id) => {
            Ok(sets.contains(&id) || user.permission_set_group_ids.contains(&id))
        }
    }
}

/// Whether every criterion of a rule holds for the record
fn criteria_match(
    d: &Dbs,
    tx: &RoTxn,
    object_id: u64,
    criteria: &[Criterion],
    record: &Record,
) -> Result<bool> {
    for c in criteria {
        let mut actual = record.values.get(&c.field);
        if actual.is_none() {
            // The criterion may use the label while the record is keyed by
            // column name, or the reverse.
            if let Some(f) = resolve_field(d, tx, object_id, &c.field)? {
                actual = record
                    .values
                    .get(&f.column_name)
                    .or_else(|| record.values.get(&f.label));
            }
        }
        if !criterion_matches(c.op, &c.value, actual) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Highest access level any applicable sharing rule grants this user on the
/// record
fn sharing_level(
    d: &Dbs,
    tx: &RoTxn,
    user: &User,
    sets: &[u64],
    object_id: u64,
    record: &Record,
) -> Result<AccessLevel> {
    let mut level = AccessLevel::Private;
    for item in d.sharing.prefix_iter(tx, &object_id.to_be_bytes()).map_err(err)? {
        let (_, rule) = item.map_err(err)?;
        if rule.access <= level {
            continue;
        }
        let applies = match &rule.kind {
            RuleKind::Owner => true,
            RuleKind::Criteria(criteria) => criteria_match(d, tx, object_id, criteria, record)?,
        };
        if applies && target_matches(d, tx, user, sets, rule.share_with)? {
            level = rule.access;
        }
    }
    Ok(level)
}

impl Store {
    /// Flattened permission set ids a user carries, directly or through
    /// groups.
    pub fn effective_permission_sets(&self, user_id: u64) -> Result<Vec<u64>> {
        self.read(|d, tx| {
            let Some(user) = d.users.get(tx, &user_id).map_err(err)? else {
                return Ok(Vec::new());
            };
            effective_sets(d, tx, &user)
        })
    }

    /// Effective object-level access: the OR across the user's profile and
    /// every effective permission set. Unknown users resolve to no access.
    pub fn object_access(&self, user_id: u64, object_id: u64) -> Result<ObjectAccess> {
        self.read(|d, tx| {
            let Some(user) = d.users.get(tx, &user_id).map_err(err)? else {
                return Ok(ObjectAccess::default());
            };
            let mask = object_mask(d, tx, &user, object_id)?;
            trace!(user_id, object_id, mask, "object access");
            Ok(ObjectAccess::from_mask(mask))
        })
    }

    /// Effective field-level access, gated by object access: a field is
    /// readable only on a readable object and editable only on an updatable
    /// one. `field` may be the label or the column name.
    pub fn field_access(&self, user_id: u64, object_id: u64, field: &str) -> Result<FieldAccess> {
        self.read(|d, tx| {
            let Some(user) = d.users.get(tx, &user_id).map_err(err)? else {
                return Ok(FieldAccess::default());
            };
            let omask = object_mask(d, tx, &user, object_id)?;
            if omask & READ == 0 {
                return Ok(FieldAccess::default());
            }
            let Some(fdef) = resolve_field(d, tx, object_id, field)? else {
                return Ok(FieldAccess::default());
            };
            let mut fmask = 0;
            for code in source_codes(d, tx, &user)? {
                fmask |= d.field_perms.get(tx, code, object_id, fdef.id)?;
            }
            Ok(FieldAccess {
                read: fmask & FIELD_READ != 0,
                edit: omask & UPDATE != 0 && fmask & FIELD_EDIT != 0,
            })
        })
    }

    /// Record-level access for a concrete record: the base object mask gates
    /// everything, then visibility widens through ownership, the org-wide
    /// default, the role hierarchy and sharing rules, in that order.
    pub fn record_access(
        &self,
        user_id: u64,
        object_id: u64,
        record: &Record,
    ) -> Result<RecordAccess> {
        self.read(|d, tx| {
            let Some(user) = d.users.get(tx, &user_id).map_err(err)? else {
                return Ok(RecordAccess::default());
            };
            let mask = object_mask(d, tx, &user, object_id)?;
            let base_read = mask & READ != 0;
            let base_update = mask & UPDATE != 0;
            if !base_read && !base_update {
                return Ok(RecordAccess::default());
            }

            let mut level = AccessLevel::Private;
            if record.owner_id == user.id {
                level = AccessLevel::ReadWrite;
            }
            if level < AccessLevel::ReadWrite {
                level = level.max(
                    d.owd
                        .get(tx, &object_id)
                        .map_err(err)?
                        .map(AccessLevel::from_code)
                        .unwrap_or(AccessLevel::Private),
                );
            }
            if level < AccessLevel::ReadWrite {
                if let Some(owner) = d.users.get(tx, &record.owner_id).map_err(err)? {
                    if manages_owner(d, tx, &user, &owner)? {
                        level = AccessLevel::ReadWrite;
                    }
                }
            }
            if level < AccessLevel::ReadWrite {
                let sets = effective_sets(d, tx, &user)?;
                level = level.max(sharing_level(d, tx, &user, &sets, object_id, record)?);
            }

            let access = RecordAccess {
                read: base_read && (mask & (VIEW_ALL | MODIFY_ALL) != 0 || level >= AccessLevel::Read),
                update: base_update
                    && (mask & MODIFY_ALL != 0 || level >= AccessLevel::ReadWrite),
            };
            trace!(user_id, object_id, owner = record.owner_id, ?access, "record access");
            Ok(access)
        })
    }
}
