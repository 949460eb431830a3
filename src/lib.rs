//! Orgperm - org security model engine.
//!
//! The authoritative model of who can do what on a Salesforce-style
//! platform: custom objects and fields, profiles, permission sets and
//! permission set groups, a role hierarchy, org-wide defaults and sharing
//! rules, composed into one effective decision per (user, object[, field]
//! [, record]) query.
//!
//! Everything lives in one LMDB-backed [`Store`] per tenant. Mutations run
//! in single committed transactions and validate before writing; resolution
//! queries read a snapshot and fail closed, so missing data is
//! indistinguishable from an explicit deny.
//!
//! ```no_run
//! use orgperm::{ObjectAccess, Principal, Store};
//!
//! # fn main() -> orgperm::Result<()> {
//! let store = Store::open("/tmp/acme")?;
//! let project = store.create_object("Project")?;
//! let sales = store.create_profile("Sales", "")?;
//! let user = store.create_user("Ada", "ada@acme.example", None, Some(sales.id))?;
//! store.set_object_permission(
//!     project.id,
//!     Principal::Profile(sales.id),
//!     ObjectAccess { read: true, ..Default::default() },
//! )?;
//! assert!(store.object_access(user.id, project.id)?.read);
//! # Ok(())
//! # }
//! ```

mod catalog;
mod constants;
mod db;
mod error;
mod fieldmeta;
mod identity;
mod layout;
mod model;
mod owd;
mod perms;
mod resolve;
mod sharing;
mod tx;

pub use catalog::{column_name_for, table_name_for};
pub use constants::{
    field_perm_names, object_perm_mask, object_perm_names, CREATE, DELETE, FIELD_EDIT,
    FIELD_READ, MAX_ROLE_DEPTH, MODIFY_ALL, READ, UPDATE, VIEW_ALL,
};
pub use db::Store;
pub use error::{OrgPermError, Result};
pub use fieldmeta::{options_for, OptionKind, OptionSpec};
pub use model::{
    AccessLevel, CompareOp, Criterion, DataType, FieldAccess, FieldDef, FieldPermKey, Layout,
    ObjectAccess, ObjectDef, ObjectPermKey, PermissionSet, PermissionSetGroup, Principal,
    Profile, Record, RecordAccess, Role, RuleKind, ShareTarget, SharingRule, User,
};
