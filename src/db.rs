//! Store handle: LMDB environment, named databases, key encoding.
//!
//! One `Store` per tenant. LMDB gives the concurrency discipline the engine
//! needs for free: a single writer at a time, snapshot-isolated readers, and
//! committed-or-nothing transactions, so the resolver can never observe a
//! half-written permission row.

use std::path::Path;

use byteorder::BigEndian;
use heed::types::{Bytes, SerdeJson, Str, U64};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use tracing::debug;

use crate::error::{err, Result};
use crate::model::{
    FieldDef, Layout, ObjectDef, PermissionSet, PermissionSetGroup, Profile, Role, SharingRule,
    User,
};

// Database type aliases
pub(crate) type MaskDb = Database<Bytes, U64<BigEndian>>;
pub(crate) type IdDb = Database<U64<BigEndian>, U64<BigEndian>>;
pub(crate) type RowDb<T> = Database<U64<BigEndian>, SerdeJson<T>>;

/// Create a 16-byte key from two u64 values
#[inline]
pub(crate) fn key(a: u64, b: u64) -> [u8; 16] {
    let a = a.to_be_bytes();
    let b = b.to_be_bytes();
    [a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7],
     b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]
}

/// Create a 24-byte key from three u64 values
#[inline]
pub(crate) fn key3(a: u64, b: u64, c: u64) -> [u8; 24] {
    let mut k = [0u8; 24];
    k[..8].copy_from_slice(&a.to_be_bytes());
    k[8..16].copy_from_slice(&b.to_be_bytes());
    k[16..].copy_from_slice(&c.to_be_bytes());
    k
}

#[inline]
pub(crate) fn part(k: &[u8], n: usize) -> u64 {
    u64::from_be_bytes(k[n * 8..(n + 1) * 8].try_into().unwrap())
}

/// Bidirectional mask index: fwd[a,b] and rev[b,a] stay in sync
pub(crate) struct BiPair {
    pub fwd: MaskDb,
    pub rev: MaskDb,
}

impl BiPair {
    #[inline]
    pub fn get(&self, tx: &RoTxn, a: u64, b: u64) -> Result<u64> {
        Ok(self.fwd.get(tx, &key(a, b)).map_err(err)?.unwrap_or(0))
    }

    #[inline]
    pub fn try_get(&self, tx: &RoTxn, a: u64, b: u64) -> Result<Option<u64>> {
        self.fwd.get(tx, &key(a, b)).map_err(err)
    }

    #[inline]
    pub fn put(&self, tx: &mut RwTxn, a: u64, b: u64, v: u64) -> Result<()> {
        self.fwd.put(tx, &key(a, b), &v).map_err(err)?;
        self.rev.put(tx, &key(b, a), &v).map_err(err)
    }

    #[inline]
    pub fn del(&self, tx: &mut RwTxn, a: u64, b: u64) -> Result<bool> {
        let r = self.fwd.delete(tx, &key(a, b)).map_err(err)?;
        self.rev.delete(tx, &key(b, a)).map_err(err)?;
        Ok(r)
    }

    /// List (a, mask) pairs for a fixed b
    pub fn list_rev(&self, tx: &RoTxn, b: u64) -> Result<Vec<(u64, u64)>> {
        let mut r = Vec::new();
        for item in self.rev.prefix_iter(tx, &b.to_be_bytes()).map_err(err)? {
            let (k, v) = item.map_err(err)?;
            if k.len() == 16 {
                r.push((part(k, 1), v));
            }
        }
        Ok(r)
    }

    /// Drop every pair with the given a (both directions)
    pub fn purge_fwd(&self, tx: &mut RwTxn, a: u64) -> Result<usize> {
        let mut pairs = Vec::new();
        for item in self.fwd.prefix_iter(tx, &a.to_be_bytes()).map_err(err)? {
            let (k, _) = item.map_err(err)?;
            if k.len() == 16 {
                pairs.push(part(k, 1));
            }
        }
        for b in &pairs {
            self.del(tx, a, *b)?;
        }
        Ok(pairs.len())
    }

    /// Drop every pair with the given b (both directions)
    pub fn purge_rev(&self, tx: &mut RwTxn, b: u64) -> Result<usize> {
        let mut pairs = Vec::new();
        for item in self.rev.prefix_iter(tx, &b.to_be_bytes()).map_err(err)? {
            let (k, _) = item.map_err(err)?;
            if k.len() == 16 {
                pairs.push(part(k, 1));
            }
        }
        for a in &pairs {
            self.del(tx, *a, b)?;
        }
        Ok(pairs.len())
    }
}

/// Three-part mask index: fwd[(p,o,f)] mirrored as rev[(o,f,p)].
/// Prefix scans cover the cascades: by principal (fwd), by object or
/// (object, field) (rev).
pub(crate) struct TriPair {
    pub fwd: MaskDb,
    pub rev: MaskDb,
}

impl TriPair {
    #[inline]
    pub fn try_get(&self, tx: &RoTxn, p: u64, o: u64, f: u64) -> Result<Option<u64>> {
        self.fwd.get(tx, &key3(p, o, f)).map_err(err)
    }

    #[inline]
    pub fn get(&self, tx: &RoTxn, p: u64, o: u64, f: u64) -> Result<u64> {
        Ok(self.try_get(tx, p, o, f)?.unwrap_or(0))
    }

    #[inline]
    pub fn put(&self, tx: &mut RwTxn, p: u64, o: u64, f: u64, v: u64) -> Result<()> {
        self.fwd.put(tx, &key3(p, o, f), &v).map_err(err)?;
        self.rev.put(tx, &key3(o, f, p), &v).map_err(err)
    }

    #[inline]
    pub fn del(&self, tx: &mut RwTxn, p: u64, o: u64, f: u64) -> Result<bool> {
        let r = self.fwd.delete(tx, &key3(p, o, f)).map_err(err)?;
        self.rev.delete(tx, &key3(o, f, p)).map_err(err)?;
        Ok(r)
    }

    /// List (principal, mask) pairs for one (object, field)
    pub fn list_field(&self, tx: &RoTxn, o: u64, f: u64) -> Result<Vec<(u64, u64)>> {
        let mut r = Vec::new();
        for item in self.rev.prefix_iter(tx, &key(o, f)).map_err(err)? {
            let (k, v) = item.map_err(err)?;
            if k.len() == 24 {
                r.push((part(k, 2), v));
            }
        }
        Ok(r)
    }

    /// Drop every row for a principal
    pub fn purge_principal(&self, tx: &mut RwTxn, p: u64) -> Result<usize> {
        let mut triples = Vec::new();
        for item in self.fwd.prefix_iter(tx, &p.to_be_bytes()).map_err(err)? {
            let (k, _) = item.map_err(err)?;
            if k.len() == 24 {
                triples.push((part(k, 1), part(k, 2)));
            }
        }
        for (o, f) in &triples {
            self.del(tx, p, *o, *f)?;
        }
        Ok(triples.len())
    }

    /// Drop every row for an object (all fields, all principals)
    pub fn purge_object(&self, tx: &mut RwTxn, o: u64) -> Result<usize> {
        let mut triples = Vec::new();
        for item in self.rev.prefix_iter(tx, &o.to_be_bytes()).map_err(err)? {
            let (k, _) = item.map_err(err)?;
            if k.len() == 24 {
                triples.push((part(k, 1), part(k, 2)));
            }
        }
        for (f, p) in &triples {
            self.del(tx, *p, o, *f)?;
        }
        Ok(triples.len())
    }

    /// Drop every row for one (object, field)
    pub fn purge_field(&self, tx: &mut RwTxn, o: u64, f: u64) -> Result<usize> {
        let mut principals = Vec::new();
        for item in self.rev.prefix_iter(tx, &key(o, f)).map_err(err)? {
            let (k, _) = item.map_err(err)?;
            if k.len() == 24 {
                principals.push(part(k, 2));
            }
        }
        for p in &principals {
            self.del(tx, *p, o, f)?;
        }
        Ok(principals.len())
    }
}

/// All database handles
pub(crate) struct Dbs {
    pub roles: RowDb<Role>,
    pub users: RowDb<User>,
    pub profiles: RowDb<Profile>,
    pub perm_sets: RowDb<PermissionSet>,
    pub perm_set_groups: RowDb<PermissionSetGroup>,
    pub objects: RowDb<ObjectDef>,
    /// table_name -> object id (uniqueness index)
    pub object_names: Database<Str, U64<BigEndian>>,
    /// key(object, field) -> row; prefix scan lists an object's fields
    pub fields: Database<Bytes, SerdeJson<FieldDef>>,
    /// field id -> owning object id
    pub field_objects: IdDb,
    /// key(principal, object) -> object permission mask
    pub object_perms: BiPair,
    /// key(principal, object, field) -> field permission mask
    pub field_perms: TriPair,
    /// object id -> org-wide default level code
    pub owd: IdDb,
    /// key(object, rule) -> row; prefix scan lists an object's rules
    pub sharing: Database<Bytes, SerdeJson<SharingRule>>,
    /// rule id -> owning object id
    pub sharing_objects: IdDb,
    pub layouts: RowDb<Layout>,
    /// key(object, principal) -> layout id
    pub layout_assign: MaskDb,
    pub meta: Database<Str, Str>,
}

/// Per-tenant store handle. Cheap to share by reference; reads may run
/// concurrently with one writer.
pub struct Store {
    pub(crate) env: Env,
    pub(crate) dbs: Dbs,
}

impl Store {
    /// Open (or create) the store at the given directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Store> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(err)?;
        // SAFETY: LMDB requires no other processes access this path concurrently during open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(1 << 30)
                .max_dbs(24)
                .open(path)
                .map_err(err)?
        };
        let mut tx = env.write_txn().map_err(err)?;
        let dbs = Dbs {
            roles: env.create_database(&mut tx, Some("roles")).map_err(err)?,
            users: env.create_database(&mut tx, Some("users")).map_err(err)?,
            profiles: env.create_database(&mut tx, Some("profiles")).map_err(err)?,
            perm_sets: env.create_database(&mut tx, Some("perm_sets")).map_err(err)?,
            perm_set_groups: env
                .create_database(&mut tx, Some("perm_set_groups"))
                .map_err(err)?,
            objects: env.create_database(&mut tx, Some("objects")).map_err(err)?,
            object_names: env
                .create_database(&mut tx, Some("object_names"))
                .map_err(err)?,
            fields: env.create_database(&mut tx, Some("fields")).map_err(err)?,
            field_objects: env
                .create_database(&mut tx, Some("field_objects"))
                .map_err(err)?,
            object_perms: BiPair {
                fwd: env.create_database(&mut tx, Some("obj_perms")).map_err(err)?,
                rev: env
                    .create_database(&mut tx, Some("obj_perms_rev"))
                    .map_err(err)?,
            },
            field_perms: TriPair {
                fwd: env
                    .create_database(&mut tx, Some("field_perms"))
                    .map_err(err)?,
                rev: env
                    .create_database(&mut tx, Some("field_perms_rev"))
                    .map_err(err)?,
            },
            owd: env.create_database(&mut tx, Some("owd")).map_err(err)?,
            sharing: env.create_database(&mut tx, Some("sharing")).map_err(err)?,
            sharing_objects: env
                .create_database(&mut tx, Some("sharing_objects"))
                .map_err(err)?,
            layouts: env.create_database(&mut tx, Some("layouts")).map_err(err)?,
            layout_assign: env
                .create_database(&mut tx, Some("layout_assign"))
                .map_err(err)?,
            meta: env.create_database(&mut tx, Some("meta")).map_err(err)?,
        };
        tx.commit().map_err(err)?;
        debug!(path = %path.display(), "store opened");
        Ok(Store { env, dbs })
    }

    /// Execute a read-only operation against a snapshot
    #[inline]
    pub(crate) fn read<T, F: FnOnce(&Dbs, &RoTxn) -> Result<T>>(&self, f: F) -> Result<T> {
        f(&self.dbs, &self.env.read_txn().map_err(err)?)
    }

    /// Clear every table (for testing)
    pub fn clear_all(&self) -> Result<()> {
        self.transact(|tx| {
            let d = tx.dbs;
            d.roles.clear(&mut tx.txn).map_err(err)?;
            d.users.clear(&mut tx.txn).map_err(err)?;
            d.profiles.clear(&mut tx.txn).map_err(err)?;
            d.perm_sets.clear(&mut tx.txn).map_err(err)?;
            d.perm_set_groups.clear(&mut tx.txn).map_err(err)?;
            d.objects.clear(&mut tx.txn).map_err(err)?;
            d.object_names.clear(&mut tx.txn).map_err(err)?;
            d.fields.clear(&mut tx.txn).map_err(err)?;
            d.field_objects.clear(&mut tx.txn).map_err(err)?;
            d.object_perms.fwd.clear(&mut tx.txn).map_err(err)?;
            d.object_perms.rev.clear(&mut tx.txn).map_err(err)?;
            d.field_perms.fwd.clear(&mut tx.txn).map_err(err)?;
            d.field_perms.rev.clear(&mut tx.txn).map_err(err)?;
            d.owd.clear(&mut tx.txn).map_err(err)?;
            d.sharing.clear(&mut tx.txn).map_err(err)?;
            d.sharing_objects.clear(&mut tx.txn).map_err(err)?;
            d.layouts.clear(&mut tx.txn).map_err(err)?;
            d.layout_assign.clear(&mut tx.txn).map_err(err)?;
            d.meta.clear(&mut tx.txn).map_err(err)
        })
    }
}

/// Milliseconds since the epoch
pub(crate) fn current_epoch() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Generate a random v4-style uuid for new objects
pub(crate) fn new_uuid() -> String {
    let mut bytes = [0u8; 16];
    getrandom::getrandom(&mut bytes).expect("Failed to generate random bytes");
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..]
    )
}
