//! Sharing rules: CRUD plus criterion evaluation.
//!
//! Rules only widen access. Owner rules apply to every record of their
//! object; criteria rules apply when all predicates match the record's
//! field values. Missing values never match (fail-closed).

use std::cmp::Ordering;

use serde_json::Value;

use crate::db::{key, Store};
use crate::error::{err, invalid, missing, OrgPermError, Result};
use crate::model::{AccessLevel, CompareOp, RuleKind, ShareTarget, SharingRule};
use crate::tx::Tx;

fn validate_rule(
    tx: &Tx,
    object_id: u64,
    access: AccessLevel,
    kind: &RuleKind,
    share_with: ShareTarget,
) -> Result<()> {
    if tx.dbs.objects.get(&tx.txn, &object_id).map_err(err)?.is_none() {
        return Err(missing("object", object_id));
    }
    if access == AccessLevel::Private {
        return Err(invalid("sharing rules only widen; access must be Read or ReadWrite"));
    }
    if let RuleKind::Criteria(criteria) = kind {
        if criteria.is_empty() {
            return Err(invalid("criteria sharing rule requires at least one criterion"));
        }
        for c in criteria {
            if crate::catalog::resolve_field(tx.dbs, &tx.txn, object_id, &c.field)?.is_none() {
                return Err(OrgPermError::NotFound(format!(
                    "field '{}' on object {}",
                    c.field, object_id
                )));
            }
        }
    }
    match share_with {
        ShareTarget::Role(id) => {
            if tx.dbs.roles.get(&tx.txn, &id).map_err(err)?.is_none() {
                return Err(missing("role", id));
            }
        }
        ShareTarget::User(id) => {
            if tx.dbs.users.get(&tx.txn, &id).map_err(err)?.is_none() {
                return Err(missing("user", id));
            }
        }
        ShareTarget::Group(id) => {
            let is_set = tx.dbs.perm_sets.get(&tx.txn, &id).map_err(err)?.is_some();
            let is_group = tx
                .dbs
                .perm_set_groups
                .get(&tx.txn, &id)
                .map_err(err)?
                .is_some();
            if !is_set && !is_group {
                return Err(missing("permission set or group", id));
            }
        }
    }
    Ok(())
}

/// Remove every rule whose target matches; returns how many went.
/// Called from the entity delete cascades.
pub(crate) fn drop_rules_targeting(tx: &mut Tx, target: ShareTarget) -> Result<usize> {
    let mut doomed = Vec::new();
    for item in tx.dbs.sharing.iter(&tx.txn).map_err(err)? {
        let (_, rule) = item.map_err(err)?;
        if rule.share_with == target {
            doomed.push((rule.object_id, rule.id));
        }
    }
    for (object_id, rule_id) in &doomed {
        tx.dbs
            .sharing
            .delete(&mut tx.txn, &key(*object_id, *rule_id))
            .map_err(err)?;
        tx.dbs.sharing_objects.delete(&mut tx.txn, rule_id).map_err(err)?;
    }
    Ok(doomed.len())
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return Some(x.cmp(y));
    }
    None
}

/// Evaluate one predicate against an optional record value
pub(crate) fn criterion_matches(op: CompareOp, expected: &Value, actual: Option<&Value>) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match op {
        CompareOp::Eq => values_equal(actual, expected),
        CompareOp::Ne => !values_equal(actual, expected),
        CompareOp::Gt => compare(actual, expected) == Some(Ordering::Greater),
        CompareOp::Lt => compare(actual, expected) == Some(Ordering::Less),
        CompareOp::Contains => match actual {
            Value::String(s) => expected.as_str().map(|n| s.contains(n)).unwrap_or(false),
            Value::Array(items) => items.iter().any(|v| values_equal(v, expected)),
            _ => false,
        },
    }
}

impl Store {
    pub fn create_sharing_rule(
        &self,
        object_id: u64,
        access: AccessLevel,
        kind: RuleKind,
        share_with: ShareTarget,
    ) -> Result<SharingRule> {
        self.transact(|tx| {
            validate_rule(tx, object_id, access, &kind, share_with)?;
            let id = tx.alloc_id()?;
            let rule = SharingRule {
                id,
                object_id,
                access,
                kind: kind.clone(),
                share_with,
            };
            tx.dbs
                .sharing
                .put(&mut tx.txn, &key(object_id, id), &rule)
                .map_err(err)?;
            tx.dbs
                .sharing_objects
                .put(&mut tx.txn, &id, &object_id)
                .map_err(err)?;
            Ok(rule)
        })
    }

    /// Replace a rule. The owning object never changes.
    pub fn update_sharing_rule(
        &self,
        id: u64,
        access: AccessLevel,
        kind: RuleKind,
        share_with: ShareTarget,
    ) -> Result<SharingRule> {
        self.transact(|tx| {
            let Some(object_id) = tx.dbs.sharing_objects.get(&tx.txn, &id).map_err(err)? else {
                return Err(missing("sharing rule", id));
            };
            validate_rule(tx, object_id, access, &kind, share_with)?;
            let rule = SharingRule {
                id,
                object_id,
                access,
                kind: kind.clone(),
                share_with,
            };
            tx.dbs
                .sharing
                .put(&mut tx.txn, &key(object_id, id), &rule)
                .map_err(err)?;
            Ok(rule)
        })
    }

    pub fn delete_sharing_rule(&self, id: u64) -> Result<()> {
        self.transact(|tx| {
            let Some(object_id) = tx.dbs.sharing_objects.get(&tx.txn, &id).map_err(err)? else {
                return Err(missing("sharing rule", id));
            };
            tx.dbs
                .sharing
                .delete(&mut tx.txn, &key(object_id, id))
                .map_err(err)?;
            tx.dbs.sharing_objects.delete(&mut tx.txn, &id).map_err(err)?;
            Ok(())
        })
    }

    pub fn get_sharing_rule(&self, id: u64) -> Result<SharingRule> {
        self.read(|d, tx| {
            let object_id = d
                .sharing_objects
                .get(tx, &id)
                .map_err(err)?
                .ok_or_else(|| missing("sharing rule", id))?;
            d.sharing
                .get(tx, &key(object_id, id))
                .map_err(err)?
                .ok_or_else(|| missing("sharing rule", id))
        })
    }

    pub fn list_sharing_rules(&self, object_id: u64) -> Result<Vec<SharingRule>> {
        self.read(|d, tx| {
            let mut out = Vec::new();
            for item in d.sharing.prefix_iter(tx, &object_id.to_be_bytes()).map_err(err)? {
                out.push(item.map_err(err)?.1);
            }
            Ok(out)
        })
    }
}
