//! Page layouts and their assignment to principals.
//!
//! Layouts are opaque to the engine beyond the object they belong to; the
//! assignment table records which layout a profile or permission set sees
//! for an object (at most one each).

use crate::db::{key, Store};
use crate::error::{err, invalid, missing, Result};
use crate::model::{Layout, Principal};

impl Store {
    pub fn create_layout(&self, object_id: u64, name: &str) -> Result<Layout> {
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid("layout name is required"));
        }
        self.transact(|tx| {
            if tx.dbs.objects.get(&tx.txn, &object_id).map_err(err)?.is_none() {
                return Err(missing("object", object_id));
            }
            let id = tx.alloc_id()?;
            let layout = Layout {
                id,
                name: name.to_string(),
                object_id,
            };
            tx.dbs.layouts.put(&mut tx.txn, &id, &layout).map_err(err)?;
            Ok(layout)
        })
    }

    /// Delete a layout and every assignment pointing at it.
    pub fn delete_layout(&self, id: u64) -> Result<()> {
        self.transact(|tx| {
            if tx.dbs.layouts.get(&tx.txn, &id).map_err(err)?.is_none() {
                return Err(missing("layout", id));
            }
            let mut stale = Vec::new();
            for item in tx.dbs.layout_assign.iter(&tx.txn).map_err(err)? {
                let (k, v) = item.map_err(err)?;
                if v == id && k.len() == 16 {
                    stale.push(<[u8; 16]>::try_from(k).unwrap());
                }
            }
            for k in &stale {
                tx.dbs.layout_assign.delete(&mut tx.txn, k).map_err(err)?;
            }
            tx.dbs.layouts.delete(&mut tx.txn, &id).map_err(err)?;
            Ok(())
        })
    }

    pub fn get_layout(&self, id: u64) -> Result<Layout> {
        self.read(|d, tx| {
            d.layouts
                .get(tx, &id)
                .map_err(err)?
                .ok_or_else(|| missing("layout", id))
        })
    }

    pub fn list_layouts(&self, object_id: u64) -> Result<Vec<Layout>> {
        self.read(|d, tx| {
            let mut out = Vec::new();
            for item in d.layouts.iter(tx).map_err(err)? {
                let (_, l) = item.map_err(err)?;
                if l.object_id == object_id {
                    out.push(l);
                }
            }
            Ok(out)
        })
    }

    /// Assign a layout to a principal for the layout's object, replacing any
    /// previous assignment for that pair.
    pub fn assign_layout(&self, principal: Principal, layout_id: u64) -> Result<()> {
        self.transact(|tx| {
            let Some(layout) = tx.dbs.layouts.get(&tx.txn, &layout_id).map_err(err)? else {
                return Err(missing("layout", layout_id));
            };
            match principal {
                Principal::Profile(id) => {
                    if tx.dbs.profiles.get(&tx.txn, &id).map_err(err)?.is_none() {
                        return Err(missing("profile", id));
                    }
                }
                Principal::PermissionSet(id) => {
                    if tx.dbs.perm_sets.get(&tx.txn, &id).map_err(err)?.is_none() {
                        return Err(missing("permission set", id));
                    }
                }
            }
            tx.dbs
                .layout_assign
                .put(
                    &mut tx.txn,
                    &key(layout.object_id, principal.encode()),
                    &layout_id,
                )
                .map_err(err)
        })
    }

    pub fn unassign_layout(&self, principal: Principal, object_id: u64) -> Result<bool> {
        self.transact(|tx| {
            tx.dbs
                .layout_assign
                .delete(&mut tx.txn, &key(object_id, principal.encode()))
                .map_err(err)
        })
    }

    /// The layout assigned to a principal for an object, if any.
    pub fn layout_for(&self, principal: Principal, object_id: u64) -> Result<Option<Layout>> {
        self.read(|d, tx| {
            let Some(id) = d
                .layout_assign
                .get(tx, &key(object_id, principal.encode()))
                .map_err(err)?
            else {
                return Ok(None);
            };
            d.layouts.get(tx, &id).map_err(err)
        })
    }
}
