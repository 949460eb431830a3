//! Permission bit constants and mask helpers

// Object permission bits
pub const CREATE: u64 = 1;
pub const READ: u64 = 1 << 1;
pub const UPDATE: u64 = 1 << 2;
pub const DELETE: u64 = 1 << 3;
// Record-wide grants live in the high bits, away from the CRUD range
pub const VIEW_ALL: u64 = 1 << 62;
pub const MODIFY_ALL: u64 = 1 << 63;

// Field permission bits
pub const FIELD_READ: u64 = 1;
pub const FIELD_EDIT: u64 = 1 << 1;

// Principal codes carry the permission-set tag in the top bit
pub(crate) const PSET_TAG: u64 = 1 << 63;

// Maximum role-hierarchy depth honored by traversals (guards corrupted data)
pub const MAX_ROLE_DEPTH: usize = 64;

// Object permission name mappings
const OBJECT_PERMS: &[(&str, u64)] = &[
    ("create", CREATE),
    ("read", READ),
    ("update", UPDATE),
    ("delete", DELETE),
    ("view_all", VIEW_ALL),
    ("modify_all", MODIFY_ALL),
];

const FIELD_PERMS: &[(&str, u64)] = &[("read", FIELD_READ), ("edit", FIELD_EDIT)];

/// Convert an object permission mask to a list of permission names
pub fn object_perm_names(mask: u64) -> Vec<&'static str> {
    OBJECT_PERMS
        .iter()
        .filter(|(_, b)| mask & b == *b)
        .map(|(n, _)| *n)
        .collect()
}

/// Convert a list of object permission names to a mask
pub fn object_perm_mask(names: &[&str]) -> u64 {
    names
        .iter()
        .filter_map(|n| OBJECT_PERMS.iter().find(|(k, _)| k == n).map(|(_, v)| v))
        .fold(0, |a, b| a | b)
}

/// Convert a field permission mask to a list of permission names
pub fn field_perm_names(mask: u64) -> Vec<&'static str> {
    FIELD_PERMS
        .iter()
        .filter(|(_, b)| mask & b == *b)
        .map(|(n, _)| *n)
        .collect()
}
