//! Object and field metadata catalog.
//!
//! Physical names are derived, never supplied: `table_name` from the object
//! name (with a `custom_` prefix), `column_name` from the field label. Field
//! options are validated against the static per-type schema in `fieldmeta`.

use heed::RoTxn;
use serde_json::{Map, Value};
use tracing::debug;

use crate::db::{current_epoch, key, new_uuid, part, Dbs, Store};
use crate::error::{err, invalid, missing, OrgPermError, Result};
use crate::fieldmeta::{object_refs, validate_options};
use crate::model::{DataType, FieldDef, ObjectDef};
use crate::tx::Tx;

/// Lowercase and join whitespace-separated words with underscores
fn derive_ident(s: &str) -> String {
    let lower = s.trim().to_lowercase();
    lower.split_whitespace().collect::<Vec<_>>().join("_")
}

/// The physical table name derived from an object name
pub fn table_name_for(name: &str) -> String {
    format!("custom_{}", derive_ident(name))
}

/// The physical column name derived from a field label
pub fn column_name_for(label: &str) -> String {
    derive_ident(label)
}

/// Find a field on an object by label or column name
pub(crate) fn resolve_field(
    d: &Dbs,
    tx: &RoTxn,
    object_id: u64,
    name: &str,
) -> Result<Option<FieldDef>> {
    for item in d.fields.prefix_iter(tx, &object_id.to_be_bytes()).map_err(err)? {
        let (_, f) = item.map_err(err)?;
        if f.label == name || f.column_name == name {
            return Ok(Some(f));
        }
    }
    Ok(None)
}

fn object_in_tx(tx: &Tx, id: u64) -> Result<ObjectDef> {
    tx.dbs
        .objects
        .get(&tx.txn, &id)
        .map_err(err)?
        .ok_or_else(|| missing("object", id))
}

fn validate_field(
    tx: &Tx,
    object_id: u64,
    label: &str,
    data_type: DataType,
    options: &Map<String, Value>,
    exclude_field: Option<u64>,
) -> Result<String> {
    let label = label.trim();
    if label.is_empty() {
        return Err(invalid("field label is required"));
    }
    validate_options(data_type, options)?;
    for rid in object_refs(data_type, options) {
        if tx.dbs.objects.get(&tx.txn, &rid).map_err(err)?.is_none() {
            return Err(missing("related object", rid));
        }
    }
    let column_name = column_name_for(label);
    for item in tx
        .dbs
        .fields
        .prefix_iter(&tx.txn, &object_id.to_be_bytes())
        .map_err(err)?
    {
        let (_, f) = item.map_err(err)?;
        if f.column_name == column_name && Some(f.id) != exclude_field {
            return Err(invalid(format!(
                "field '{}' already exists on object {}",
                column_name, object_id
            )));
        }
    }
    Ok(column_name)
}

impl Store {
    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    pub fn create_object(&self, name: &str) -> Result<ObjectDef> {
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid("object name is required"));
        }
        let table_name = table_name_for(name);
        self.transact(|tx| {
            if tx
                .dbs
                .object_names
                .get(&tx.txn, &table_name)
                .map_err(err)?
                .is_some()
            {
                return Err(invalid(format!("object '{}' already exists", table_name)));
            }
            let id = tx.alloc_id()?;
            let object = ObjectDef {
                id,
                uuid: new_uuid(),
                name: name.to_string(),
                table_name: table_name.clone(),
                created_at: current_epoch(),
            };
            tx.dbs.objects.put(&mut tx.txn, &id, &object).map_err(err)?;
            tx.dbs
                .object_names
                .put(&mut tx.txn, &table_name, &id)
                .map_err(err)?;
            Ok(object)
        })
    }

    /// Rename an object. The table name is re-derived and must stay unique.
    pub fn rename_object(&self, id: u64, name: &str) -> Result<ObjectDef> {
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid("object name is required"));
        }
        let table_name = table_name_for(name);
        self.transact(|tx| {
            let mut object = object_in_tx(tx, id)?;
            if let Some(holder) = tx
                .dbs
                .object_names
                .get(&tx.txn, &table_name)
                .map_err(err)?
            {
                if holder != id {
                    return Err(invalid(format!("object '{}' already exists", table_name)));
                }
            }
            tx.dbs
                .object_names
                .delete(&mut tx.txn, &object.table_name)
                .map_err(err)?;
            object.name = name.to_string();
            object.table_name = table_name.clone();
            tx.dbs.objects.put(&mut tx.txn, &id, &object).map_err(err)?;
            tx.dbs
                .object_names
                .put(&mut tx.txn, &table_name, &id)
                .map_err(err)?;
            Ok(object)
        })
    }

    /// Delete an object and everything hanging off it: fields, permission
    /// rows, the org-wide default, sharing rules, layouts and assignments.
    pub fn delete_object(&self, id: u64) -> Result<()> {
        self.transact(|tx| {
            let object = object_in_tx(tx, id)?;

            let mut field_ids = Vec::new();
            for item in tx
                .dbs
                .fields
                .prefix_iter(&tx.txn, &id.to_be_bytes())
                .map_err(err)?
            {
                let (k, _) = item.map_err(err)?;
                field_ids.push(part(k, 1));
            }
            for fid in &field_ids {
                tx.dbs.fields.delete(&mut tx.txn, &key(id, *fid)).map_err(err)?;
                tx.dbs.field_objects.delete(&mut tx.txn, fid).map_err(err)?;
            }

            let obj_rows = tx.dbs.object_perms.purge_rev(&mut tx.txn, id)?;
            let field_rows = tx.dbs.field_perms.purge_object(&mut tx.txn, id)?;
            tx.dbs.owd.delete(&mut tx.txn, &id).map_err(err)?;

            let mut rule_ids = Vec::new();
            for item in tx
                .dbs
                .sharing
                .prefix_iter(&tx.txn, &id.to_be_bytes())
                .map_err(err)?
            {
                let (k, _) = item.map_err(err)?;
                rule_ids.push(part(k, 1));
            }
            for rid in &rule_ids {
                tx.dbs.sharing.delete(&mut tx.txn, &key(id, *rid)).map_err(err)?;
                tx.dbs.sharing_objects.delete(&mut tx.txn, rid).map_err(err)?;
            }

            let mut layout_ids = Vec::new();
            for item in tx.dbs.layouts.iter(&tx.txn).map_err(err)? {
                let (_, l) = item.map_err(err)?;
                if l.object_id == id {
                    layout_ids.push(l.id);
                }
            }
            for lid in &layout_ids {
                tx.dbs.layouts.delete(&mut tx.txn, lid).map_err(err)?;
            }
            let mut assign_keys = Vec::new();
            for item in tx
                .dbs
                .layout_assign
                .prefix_iter(&tx.txn, &id.to_be_bytes())
                .map_err(err)?
            {
                let (k, _) = item.map_err(err)?;
                if k.len() == 16 {
                    assign_keys.push(part(k, 1));
                }
            }
            for p in &assign_keys {
                tx.dbs
                    .layout_assign
                    .delete(&mut tx.txn, &key(id, *p))
                    .map_err(err)?;
            }

            tx.dbs
                .object_names
                .delete(&mut tx.txn, &object.table_name)
                .map_err(err)?;
            tx.dbs.objects.delete(&mut tx.txn, &id).map_err(err)?;
            debug!(
                object = id,
                fields = field_ids.len(),
                object_perm_rows = obj_rows,
                field_perm_rows = field_rows,
                rules = rule_ids.len(),
                "object deleted"
            );
            Ok(())
        })
    }

    pub fn get_object(&self, id: u64) -> Result<ObjectDef> {
        self.read(|d, tx| {
            d.objects
                .get(tx, &id)
                .map_err(err)?
                .ok_or_else(|| missing("object", id))
        })
    }

    pub fn get_object_by_table_name(&self, table_name: &str) -> Result<ObjectDef> {
        self.read(|d, tx| {
            let id = d
                .object_names
                .get(tx, table_name)
                .map_err(err)?
                .ok_or_else(|| OrgPermError::NotFound(format!("object '{}'", table_name)))?;
            d.objects
                .get(tx, &id)
                .map_err(err)?
                .ok_or_else(|| missing("object", id))
        })
    }

    pub fn list_objects(&self) -> Result<Vec<ObjectDef>> {
        self.read(|d, tx| {
            let mut out = Vec::new();
            for item in d.objects.iter(tx).map_err(err)? {
                out.push(item.map_err(err)?.1);
            }
            Ok(out)
        })
    }

    // ------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------

    pub fn create_field(
        &self,
        object_id: u64,
        label: &str,
        data_type: DataType,
        is_required: bool,
        options: Map<String, Value>,
    ) -> Result<FieldDef> {
        self.transact(|tx| {
            object_in_tx(tx, object_id)?;
            let column_name = validate_field(tx, object_id, label, data_type, &options, None)?;
            let id = tx.alloc_id()?;
            let field = FieldDef {
                id,
                object_id,
                label: label.trim().to_string(),
                column_name,
                data_type,
                is_required,
                options,
            };
            tx.dbs
                .fields
                .put(&mut tx.txn, &key(object_id, id), &field)
                .map_err(err)?;
            tx.dbs
                .field_objects
                .put(&mut tx.txn, &id, &object_id)
                .map_err(err)?;
            Ok(field)
        })
    }

    /// Replace a field definition. The owning object never changes; the
    /// column name is re-derived from the new label.
    pub fn update_field(
        &self,
        field_id: u64,
        label: &str,
        data_type: DataType,
        is_required: bool,
        options: Map<String, Value>,
    ) -> Result<FieldDef> {
        self.transact(|tx| {
            let Some(object_id) = tx.dbs.field_objects.get(&tx.txn, &field_id).map_err(err)?
            else {
                return Err(missing("field", field_id));
            };
            let column_name =
                validate_field(tx, object_id, label, data_type, &options, Some(field_id))?;
            let field = FieldDef {
                id: field_id,
                object_id,
                label: label.trim().to_string(),
                column_name,
                data_type,
                is_required,
                options,
            };
            tx.dbs
                .fields
                .put(&mut tx.txn, &key(object_id, field_id), &field)
                .map_err(err)?;
            Ok(field)
        })
    }

    /// Delete a field and its permission rows.
    pub fn delete_field(&self, field_id: u64) -> Result<()> {
        self.transact(|tx| {
            let Some(object_id) = tx.dbs.field_objects.get(&tx.txn, &field_id).map_err(err)?
            else {
                return Err(missing("field", field_id));
            };
            tx.dbs.field_perms.purge_field(&mut tx.txn, object_id, field_id)?;
            tx.dbs
                .fields
                .delete(&mut tx.txn, &key(object_id, field_id))
                .map_err(err)?;
            tx.dbs.field_objects.delete(&mut tx.txn, &field_id).map_err(err)?;
            Ok(())
        })
    }

    pub fn get_field(&self, field_id: u64) -> Result<FieldDef> {
        self.read(|d, tx| {
            let object_id = d
                .field_objects
                .get(tx, &field_id)
                .map_err(err)?
                .ok_or_else(|| missing("field", field_id))?;
            d.fields
                .get(tx, &key(object_id, field_id))
                .map_err(err)?
                .ok_or_else(|| missing("field", field_id))
        })
    }

    pub fn list_fields(&self, object_id: u64) -> Result<Vec<FieldDef>> {
        self.read(|d, tx| {
            let mut out = Vec::new();
            for item in d.fields.prefix_iter(tx, &object_id.to_be_bytes()).map_err(err)? {
                out.push(item.map_err(err)?.1);
            }
            Ok(out)
        })
    }
}
