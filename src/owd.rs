//! Org-wide defaults: baseline record visibility per object.

use crate::db::Store;
use crate::error::{err, missing, Result};
use crate::model::AccessLevel;

impl Store {
    /// Set the org-wide default for an object, overwriting any previous level.
    pub fn set_owd(&self, object_id: u64, level: AccessLevel) -> Result<()> {
        self.transact(|tx| {
            if tx.dbs.objects.get(&tx.txn, &object_id).map_err(err)?.is_none() {
                return Err(missing("object", object_id));
            }
            tx.dbs
                .owd
                .put(&mut tx.txn, &object_id, &level.code())
                .map_err(err)
        })
    }

    /// The org-wide default for an object; `Private` when unset.
    pub fn get_owd(&self, object_id: u64) -> Result<AccessLevel> {
        self.read(|d, tx| {
            Ok(d.owd
                .get(tx, &object_id)
                .map_err(err)?
                .map(AccessLevel::from_code)
                .unwrap_or(AccessLevel::Private))
        })
    }

    pub fn list_owd(&self) -> Result<Vec<(u64, AccessLevel)>> {
        self.read(|d, tx| {
            let mut out = Vec::new();
            for item in d.owd.iter(tx).map_err(err)? {
                let (id, code) = item.map_err(err)?;
                out.push((id, AccessLevel::from_code(code)));
            }
            Ok(out)
        })
    }
}
