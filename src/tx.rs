//! Write-transaction wrapper.
//!
//! Every mutation runs inside one `Tx`; the transaction commits only after
//! the whole operation validated and applied, so rejected mutations leave
//! the store untouched.

use std::collections::HashSet;

use heed::RwTxn;

use crate::constants::MAX_ROLE_DEPTH;
use crate::db::{Dbs, Store};
use crate::error::{err, invalid, Result};

/// A single write transaction over the store
pub(crate) struct Tx<'a> {
    pub txn: RwTxn<'a>,
    pub dbs: &'a Dbs,
}

impl Store {
    /// Run multiple operations in a single transaction
    #[inline]
    pub(crate) fn transact<T, F: FnOnce(&mut Tx) -> Result<T>>(&self, f: F) -> Result<T> {
        let mut tx = Tx {
            txn: self.env.write_txn().map_err(err)?,
            dbs: &self.dbs,
        };
        let r = f(&mut tx)?;
        tx.txn.commit().map_err(err)?;
        Ok(r)
    }
}

impl Tx<'_> {
    /// Allocate a fresh entity id. Ids are monotonic per store and never
    /// reused.
    pub fn alloc_id(&mut self) -> Result<u64> {
        let id = self
            .dbs
            .meta
            .get(&self.txn, "next_id")
            .map_err(err)?
            .and_then(|s| s.parse().ok())
            .unwrap_or(1u64);
        self.dbs
            .meta
            .put(&mut self.txn, "next_id", &(id + 1).to_string())
            .map_err(err)?;
        Ok(id)
    }

    /// Reject a parent assignment that would make the role hierarchy loop
    /// back to `role_id`.
    pub fn check_role_cycle(&self, role_id: u64, new_parent: Option<u64>) -> Result<()> {
        let Some(parent) = new_parent else {
            return Ok(());
        };
        if parent == role_id {
            return Err(invalid("role cannot be its own parent"));
        }
        let mut seen = HashSet::new();
        let mut cur = parent;
        for _ in 0..MAX_ROLE_DEPTH {
            if cur == role_id {
                return Err(invalid("role hierarchy cycle"));
            }
            if !seen.insert(cur) {
                break;
            }
            match self
                .dbs
                .roles
                .get(&self.txn, &cur)
                .map_err(err)?
                .and_then(|r| r.parent_id)
            {
                Some(p) => cur = p,
                None => break,
            }
        }
        Ok(())
    }
}
