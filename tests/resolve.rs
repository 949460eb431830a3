//! Resolver tests: OR-composition across permission sources, fail-closed
//! defaults, and object gating of field access.

use orgperm::{
    DataType, FieldAccess, FieldPermKey, ObjectAccess, OrgPermError, Principal, Store,
};
use serde_json::{Map, Value};
use tempfile::TempDir;

fn store() -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    (dir, store)
}

fn text_field(s: &Store, object: u64, label: &str) {
    let mut opts = Map::new();
    opts.insert("length".to_string(), Value::from(80));
    s.create_field(object, label, DataType::Text, false, opts).unwrap();
}

#[test]
fn test_profile_baseline_then_additive_set() {
    let (_dir, s) = store();

    let a = s.create_role("A", None).unwrap();
    let b = s.create_role("B", Some(a.id)).unwrap();
    let project = s.create_object("Project").unwrap();
    let sales = s.create_profile("Sales", "").unwrap();
    s.set_object_permission(
        project.id,
        Principal::Profile(sales.id),
        ObjectAccess { read: true, ..Default::default() },
    )
    .unwrap();
    let u = s
        .create_user("U", "u@x.example", Some(b.id), Some(sales.id))
        .unwrap();

    let access = s.object_access(u.id, project.id).unwrap();
    assert_eq!(
        access,
        ObjectAccess { read: true, ..Default::default() }
    );

    // An additive permission set widens without touching the baseline
    let editor = s.create_permission_set("Editor", "").unwrap();
    s.set_object_permission(
        project.id,
        Principal::PermissionSet(editor.id),
        ObjectAccess { update: true, ..Default::default() },
    )
    .unwrap();
    s.assign_permission_set(u.id, editor.id).unwrap();

    let access = s.object_access(u.id, project.id).unwrap();
    assert!(access.read && access.update);
    assert!(!access.create && !access.delete);
}

#[test]
fn test_fail_closed_defaults() {
    let (_dir, s) = store();
    let project = s.create_object("Project").unwrap();

    // Unknown user: no error, no access
    assert_eq!(s.object_access(999, project.id).unwrap(), ObjectAccess::default());

    // Known user with no sources at all
    let u = s.create_user("U", "u@x.example", None, None).unwrap();
    assert_eq!(s.object_access(u.id, project.id).unwrap(), ObjectAccess::default());

    // Unknown object: no error either
    assert_eq!(s.object_access(u.id, 999).unwrap(), ObjectAccess::default());
    assert_eq!(
        s.field_access(u.id, project.id, "nope").unwrap(),
        FieldAccess::default()
    );
}

#[test]
fn test_sets_only_ever_widen() {
    let (_dir, s) = store();
    let project = s.create_object("Project").unwrap();
    let sales = s.create_profile("Sales", "").unwrap();
    s.set_object_permission(
        project.id,
        Principal::Profile(sales.id),
        ObjectAccess { create: true, read: true, ..Default::default() },
    )
    .unwrap();
    let u = s.create_user("U", "u@x.example", None, Some(sales.id)).unwrap();
    let before = s.object_access(u.id, project.id).unwrap();

    // A set granting nothing on this object changes nothing
    let empty = s.create_permission_set("Empty", "").unwrap();
    s.assign_permission_set(u.id, empty.id).unwrap();
    assert_eq!(s.object_access(u.id, project.id).unwrap(), before);

    // A set granting delete adds exactly that
    let remover = s.create_permission_set("Remover", "").unwrap();
    s.set_object_permission(
        project.id,
        Principal::PermissionSet(remover.id),
        ObjectAccess { delete: true, ..Default::default() },
    )
    .unwrap();
    s.assign_permission_set(u.id, remover.id).unwrap();
    let after = s.object_access(u.id, project.id).unwrap();
    assert!(after.create && after.read && after.delete);
    assert!(!before.delete);
}

#[test]
fn test_group_assignment_expands_to_members() {
    let (_dir, s) = store();
    let project = s.create_object("Project").unwrap();
    let set = s.create_permission_set("Editor", "").unwrap();
    s.set_object_permission(
        project.id,
        Principal::PermissionSet(set.id),
        ObjectAccess { read: true, update: true, ..Default::default() },
    )
    .unwrap();
    let group = s.create_permission_set_group("Bundle", "", &[set.id]).unwrap();
    let u = s.create_user("U", "u@x.example", None, None).unwrap();
    s.assign_permission_set_group(u.id, group.id).unwrap();

    let access = s.object_access(u.id, project.id).unwrap();
    assert!(access.read && access.update);

    assert_eq!(s.effective_permission_sets(u.id).unwrap(), vec![set.id]);
}

#[test]
fn test_effective_sets_dedup_direct_and_grouped() {
    let (_dir, s) = store();
    let set = s.create_permission_set("Editor", "").unwrap();
    let group = s.create_permission_set_group("Bundle", "", &[set.id]).unwrap();
    let u = s.create_user("U", "u@x.example", None, None).unwrap();
    s.assign_permission_set(u.id, set.id).unwrap();
    s.assign_permission_set_group(u.id, group.id).unwrap();

    assert_eq!(s.effective_permission_sets(u.id).unwrap(), vec![set.id]);
}

#[test]
fn test_field_access_gated_by_object() {
    let (_dir, s) = store();
    let project = s.create_object("Project").unwrap();
    text_field(&s, project.id, "Status");
    let sales = s.create_profile("Sales", "").unwrap();
    let u = s.create_user("U", "u@x.example", None, Some(sales.id)).unwrap();
    let p = Principal::Profile(sales.id);

    s.set_field_permission(project.id, "status", p, FieldAccess { read: true, edit: true })
        .unwrap();

    // No object read yet: the field stays invisible
    assert_eq!(
        s.field_access(u.id, project.id, "status").unwrap(),
        FieldAccess::default()
    );

    // Object read without update: readable, not editable
    s.set_object_permission(project.id, p, ObjectAccess { read: true, ..Default::default() })
        .unwrap();
    assert_eq!(
        s.field_access(u.id, project.id, "status").unwrap(),
        FieldAccess { read: true, edit: false }
    );

    // Object update unlocks the edit grant
    s.set_object_permission(
        project.id,
        p,
        ObjectAccess { read: true, update: true, ..Default::default() },
    )
    .unwrap();
    assert_eq!(
        s.field_access(u.id, project.id, "status").unwrap(),
        FieldAccess { read: true, edit: true }
    );
}

#[test]
fn test_field_access_composes_across_sources() {
    let (_dir, s) = store();
    let project = s.create_object("Project").unwrap();
    text_field(&s, project.id, "Status");
    let sales = s.create_profile("Sales", "").unwrap();
    let editor = s.create_permission_set("Editor", "").unwrap();
    let u = s.create_user("U", "u@x.example", None, Some(sales.id)).unwrap();
    s.assign_permission_set(u.id, editor.id).unwrap();

    s.set_object_permission(
        project.id,
        Principal::Profile(sales.id),
        ObjectAccess { read: true, update: true, ..Default::default() },
    )
    .unwrap();
    // Read from the profile, edit from the set
    s.set_field_permission(
        project.id,
        "status",
        Principal::Profile(sales.id),
        FieldAccess { read: true, edit: false },
    )
    .unwrap();
    s.toggle_field_permission(
        project.id,
        "status",
        Principal::PermissionSet(editor.id),
        FieldPermKey::Edit,
    )
    .unwrap();

    assert_eq!(
        s.field_access(u.id, project.id, "status").unwrap(),
        FieldAccess { read: true, edit: true }
    );
}

#[test]
fn test_mutations_reject_what_resolution_forgives() {
    let (_dir, s) = store();
    let project = s.create_object("Project").unwrap();

    // The same missing user that resolves to no access is a hard error for
    // a mutation that needs it
    assert!(matches!(
        s.assign_permission_set(999, 1),
        Err(OrgPermError::NotFound(_))
    ));
    assert_eq!(s.object_access(999, project.id).unwrap(), ObjectAccess::default());
}
