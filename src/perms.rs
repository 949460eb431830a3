//! Permission assignment store.
//!
//! Rows are bitmasks keyed by `(principal, object[, field])`; absence means
//! no permission, not inherit. `set_*` is the primitive full-row upsert; the
//! `toggle_*` operations are the checkbox-style convenience built on top and
//! never fail once the endpoints exist.

use crate::constants::{FIELD_EDIT, FIELD_READ};
use crate::catalog::resolve_field;
use crate::db::{key, part, Store};
use crate::error::{err, invalid, missing, OrgPermError, Result};
use crate::model::{
    FieldAccess, FieldPermKey, ObjectAccess, ObjectPermKey, Principal,
};
use crate::tx::Tx;

fn check_object(tx: &Tx, id: u64) -> Result<()> {
    tx.dbs
        .objects
        .get(&tx.txn, &id)
        .map_err(err)?
        .map(|_| ())
        .ok_or_else(|| missing("object", id))
}

fn check_principal(tx: &Tx, principal: Principal) -> Result<()> {
    match principal {
        Principal::Profile(id) => tx
            .dbs
            .profiles
            .get(&tx.txn, &id)
            .map_err(err)?
            .map(|_| ())
            .ok_or_else(|| missing("profile", id)),
        Principal::PermissionSet(id) => tx
            .dbs
            .perm_sets
            .get(&tx.txn, &id)
            .map_err(err)?
            .map(|_| ())
            .ok_or_else(|| missing("permission set", id)),
    }
}

fn field_id_in_tx(tx: &Tx, object_id: u64, field: &str) -> Result<u64> {
    resolve_field(tx.dbs, &tx.txn, object_id, field)?
        .map(|f| f.id)
        .ok_or_else(|| {
            OrgPermError::NotFound(format!("field '{}' on object {}", field, object_id))
        })
}

/// Drop all permission rows and layout assignments scoped to a principal.
/// Used by the profile / permission-set delete cascades.
pub(crate) fn purge_principal_state(tx: &mut Tx, principal: Principal) -> Result<()> {
    let code = principal.encode();
    tx.dbs.object_perms.purge_fwd(&mut tx.txn, code)?;
    tx.dbs.field_perms.purge_principal(&mut tx.txn, code)?;
    let mut stale = Vec::new();
    for item in tx.dbs.layout_assign.iter(&tx.txn).map_err(err)? {
        let (k, _) = item.map_err(err)?;
        if k.len() == 16 && part(k, 1) == code {
            stale.push(part(k, 0));
        }
    }
    for object in &stale {
        tx.dbs
            .layout_assign
            .delete(&mut tx.txn, &key(*object, code))
            .map_err(err)?;
    }
    Ok(())
}

impl Store {
    // ------------------------------------------------------------------
    // Object permissions
    // ------------------------------------------------------------------

    /// Upsert the full object permission row for a principal.
    pub fn set_object_permission(
        &self,
        object_id: u64,
        principal: Principal,
        access: ObjectAccess,
    ) -> Result<ObjectAccess> {
        self.transact(|tx| {
            check_object(tx, object_id)?;
            check_principal(tx, principal)?;
            tx.dbs
                .object_perms
                .put(&mut tx.txn, principal.encode(), object_id, access.mask())?;
            Ok(access)
        })
    }

    /// Flip one permission, creating the row on first touch.
    pub fn toggle_object_permission(
        &self,
        object_id: u64,
        principal: Principal,
        perm: ObjectPermKey,
    ) -> Result<ObjectAccess> {
        self.transact(|tx| {
            check_object(tx, object_id)?;
            check_principal(tx, principal)?;
            let code = principal.encode();
            let mask = tx.dbs.object_perms.get(&tx.txn, code, object_id)? ^ perm.bit();
            tx.dbs.object_perms.put(&mut tx.txn, code, object_id, mask)?;
            Ok(ObjectAccess::from_mask(mask))
        })
    }

    /// The stored row, if one exists. Absence is "no permission".
    pub fn get_object_permission(
        &self,
        object_id: u64,
        principal: Principal,
    ) -> Result<Option<ObjectAccess>> {
        self.read(|d, tx| {
            Ok(d.object_perms
                .try_get(tx, principal.encode(), object_id)?
                .map(ObjectAccess::from_mask))
        })
    }

    /// Remove a principal's row for an object. Returns whether one existed.
    pub fn clear_object_permission(&self, object_id: u64, principal: Principal) -> Result<bool> {
        self.transact(|tx| tx.dbs.object_perms.del(&mut tx.txn, principal.encode(), object_id))
    }

    /// Every principal with a row on this object (admin matrix view).
    pub fn list_object_permissions(
        &self,
        object_id: u64,
    ) -> Result<Vec<(Principal, ObjectAccess)>> {
        self.read(|d, tx| {
            Ok(d.object_perms
                .list_rev(tx, object_id)?
                .into_iter()
                .map(|(code, mask)| (Principal::decode(code), ObjectAccess::from_mask(mask)))
                .collect())
        })
    }

    // ------------------------------------------------------------------
    // Field permissions
    // ------------------------------------------------------------------

    /// Upsert the full field permission row. `field` may be the label or the
    /// column name. Rejects `edit` without `read`.
    pub fn set_field_permission(
        &self,
        object_id: u64,
        field: &str,
        principal: Principal,
        access: FieldAccess,
    ) -> Result<FieldAccess> {
        if access.edit && !access.read {
            return Err(invalid("an editable field must also be readable"));
        }
        self.transact(|tx| {
            check_object(tx, object_id)?;
            check_principal(tx, principal)?;
            let field_id = field_id_in_tx(tx, object_id, field)?;
            tx.dbs.field_perms.put(
                &mut tx.txn,
                principal.encode(),
                object_id,
                field_id,
                access.mask(),
            )?;
            Ok(access)
        })
    }

    /// Flip one field permission, keeping edit-implies-read true: turning
    /// edit on raises read, turning read off drops edit.
    pub fn toggle_field_permission(
        &self,
        object_id: u64,
        field: &str,
        principal: Principal,
        perm: FieldPermKey,
    ) -> Result<FieldAccess> {
        self.transact(|tx| {
            check_object(tx, object_id)?;
            check_principal(tx, principal)?;
            let field_id = field_id_in_tx(tx, object_id, field)?;
            let code = principal.encode();
            let cur = tx.dbs.field_perms.get(&tx.txn, code, object_id, field_id)?;
            let next = match perm {
                FieldPermKey::Edit => {
                    if cur & FIELD_EDIT != 0 {
                        cur & !FIELD_EDIT
                    } else {
                        cur | FIELD_EDIT | FIELD_READ
                    }
                }
                FieldPermKey::Read => {
                    if cur & FIELD_READ != 0 {
                        cur & !(FIELD_READ | FIELD_EDIT)
                    } else {
                        cur | FIELD_READ
                    }
                }
            };
            tx.dbs
                .field_perms
                .put(&mut tx.txn, code, object_id, field_id, next)?;
            Ok(FieldAccess::from_mask(next))
        })
    }

    pub fn get_field_permission(
        &self,
        object_id: u64,
        field: &str,
        principal: Principal,
    ) -> Result<Option<FieldAccess>> {
        self.read(|d, tx| {
            let Some(f) = resolve_field(d, tx, object_id, field)? else {
                return Ok(None);
            };
            Ok(d.field_perms
                .try_get(tx, principal.encode(), object_id, f.id)?
                .map(FieldAccess::from_mask))
        })
    }

    pub fn clear_field_permission(
        &self,
        object_id: u64,
        field: &str,
        principal: Principal,
    ) -> Result<bool> {
        self.transact(|tx| {
            let field_id = field_id_in_tx(tx, object_id, field)?;
            tx.dbs
                .field_perms
                .del(&mut tx.txn, principal.encode(), object_id, field_id)
        })
    }

    /// Every principal with a row on this field (admin matrix view).
    pub fn list_field_permissions(
        &self,
        object_id: u64,
        field: &str,
    ) -> Result<Vec<(Principal, FieldAccess)>> {
        self.read(|d, tx| {
            let Some(f) = resolve_field(d, tx, object_id, field)? else {
                return Ok(Vec::new());
            };
            Ok(d.field_perms
                .list_field(tx, object_id, f.id)?
                .into_iter()
                .map(|(code, mask)| (Principal::decode(code), FieldAccess::from_mask(mask)))
                .collect())
        })
    }
}
