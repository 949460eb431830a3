//! Identity and hierarchy tests: roles, users, profiles, permission sets
//! and groups, and the cascades their deletes carry.

use orgperm::{OrgPermError, Store};
use tempfile::TempDir;

fn store() -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    (dir, store)
}

#[test]
fn test_role_crud() {
    let (_dir, s) = store();

    let ceo = s.create_role("CEO", None).unwrap();
    let vp = s.create_role("VP Sales", Some(ceo.id)).unwrap();

    assert_eq!(s.get_role(vp.id).unwrap().parent_id, Some(ceo.id));

    let renamed = s.update_role(vp.id, "VP of Sales", Some(ceo.id)).unwrap();
    assert_eq!(renamed.name, "VP of Sales");

    let tree = s.role_tree().unwrap();
    assert_eq!(tree.len(), 2);
}

#[test]
fn test_role_requires_name_and_parent() {
    let (_dir, s) = store();

    assert!(matches!(
        s.create_role("  ", None),
        Err(OrgPermError::Validation(_))
    ));
    assert!(matches!(
        s.create_role("Orphan", Some(999)),
        Err(OrgPermError::NotFound(_))
    ));
}

#[test]
fn test_role_cycle_rejected() {
    let (_dir, s) = store();

    let a = s.create_role("A", None).unwrap();
    let b = s.create_role("B", Some(a.id)).unwrap();
    let c = s.create_role("C", Some(b.id)).unwrap();

    // Re-parenting the root under its grandchild would close a loop
    assert!(matches!(
        s.update_role(a.id, "A", Some(c.id)),
        Err(OrgPermError::Validation(_))
    ));
    // Self-parenting is the degenerate case
    assert!(matches!(
        s.update_role(b.id, "B", Some(b.id)),
        Err(OrgPermError::Validation(_))
    ));
}

#[test]
fn test_role_delete_reparents_children() {
    let (_dir, s) = store();

    let a = s.create_role("A", None).unwrap();
    let b = s.create_role("B", Some(a.id)).unwrap();
    let c = s.create_role("C", Some(b.id)).unwrap();
    let user = s.create_user("Kim", "kim@x.example", Some(b.id), None).unwrap();

    s.delete_role(b.id).unwrap();

    // Grandchild moves up to the grandparent instead of dangling
    assert_eq!(s.get_role(c.id).unwrap().parent_id, Some(a.id));
    // Users referencing the deleted role become roleless
    assert_eq!(s.get_user(user.id).unwrap().role_id, None);
    assert!(matches!(s.get_role(b.id), Err(OrgPermError::NotFound(_))));
}

#[test]
fn test_root_role_delete_makes_children_roots() {
    let (_dir, s) = store();

    let a = s.create_role("A", None).unwrap();
    let b = s.create_role("B", Some(a.id)).unwrap();

    s.delete_role(a.id).unwrap();
    assert_eq!(s.get_role(b.id).unwrap().parent_id, None);
}

#[test]
fn test_user_references_validated() {
    let (_dir, s) = store();

    assert!(matches!(
        s.create_user("Ada", "ada@x.example", Some(42), None),
        Err(OrgPermError::NotFound(_))
    ));
    assert!(matches!(
        s.create_user("Ada", "ada@x.example", None, Some(42)),
        Err(OrgPermError::NotFound(_))
    ));
    assert!(matches!(
        s.create_user("", "ada@x.example", None, None),
        Err(OrgPermError::Validation(_))
    ));
}

#[test]
fn test_user_update_keeps_assignments() {
    let (_dir, s) = store();

    let set = s.create_permission_set("Editor", "").unwrap();
    let user = s.create_user("Ada", "ada@x.example", None, None).unwrap();
    s.assign_permission_set(user.id, set.id).unwrap();

    let updated = s
        .update_user(user.id, "Ada L.", "ada@y.example", None, None)
        .unwrap();
    assert_eq!(updated.email, "ada@y.example");
    assert_eq!(updated.permission_set_ids, vec![set.id]);
}

#[test]
fn test_permission_set_assignment_dedups() {
    let (_dir, s) = store();

    let set = s.create_permission_set("Editor", "").unwrap();
    let user = s.create_user("Ada", "ada@x.example", None, None).unwrap();

    s.assign_permission_set(user.id, set.id).unwrap();
    let again = s.assign_permission_set(user.id, set.id).unwrap();
    assert_eq!(again.permission_set_ids, vec![set.id]);

    let removed = s.unassign_permission_set(user.id, set.id).unwrap();
    assert!(removed.permission_set_ids.is_empty());
}

#[test]
fn test_group_members_validated_and_deduped() {
    let (_dir, s) = store();

    let a = s.create_permission_set("A", "").unwrap();
    let b = s.create_permission_set("B", "").unwrap();

    let group = s
        .create_permission_set_group("Bundle", "", &[a.id, b.id, a.id])
        .unwrap();
    assert_eq!(group.permission_set_ids, vec![a.id, b.id]);

    assert!(matches!(
        s.create_permission_set_group("Bad", "", &[999]),
        Err(OrgPermError::NotFound(_))
    ));
}

#[test]
fn test_permission_set_delete_cascades() {
    let (_dir, s) = store();

    let set = s.create_permission_set("Editor", "").unwrap();
    let keep = s.create_permission_set("Viewer", "").unwrap();
    let group = s
        .create_permission_set_group("Bundle", "", &[set.id, keep.id])
        .unwrap();
    let user = s.create_user("Ada", "ada@x.example", None, None).unwrap();
    s.assign_permission_set(user.id, set.id).unwrap();

    s.delete_permission_set(set.id).unwrap();

    assert!(s.get_user(user.id).unwrap().permission_set_ids.is_empty());
    assert_eq!(
        s.get_permission_set_group(group.id).unwrap().permission_set_ids,
        vec![keep.id]
    );
    assert!(matches!(
        s.get_permission_set(set.id),
        Err(OrgPermError::NotFound(_))
    ));
}

#[test]
fn test_profile_delete_clears_users() {
    let (_dir, s) = store();

    let profile = s.create_profile("Sales", "baseline").unwrap();
    let user = s
        .create_user("Ada", "ada@x.example", None, Some(profile.id))
        .unwrap();

    s.delete_profile(profile.id).unwrap();

    assert_eq!(s.get_user(user.id).unwrap().profile_id, None);
    assert!(matches!(
        s.get_profile(profile.id),
        Err(OrgPermError::NotFound(_))
    ));
}

#[test]
fn test_group_delete_unassigns_users() {
    let (_dir, s) = store();

    let set = s.create_permission_set("A", "").unwrap();
    let group = s.create_permission_set_group("G", "", &[set.id]).unwrap();
    let user = s.create_user("Ada", "ada@x.example", None, None).unwrap();
    s.assign_permission_set_group(user.id, group.id).unwrap();

    s.delete_permission_set_group(group.id).unwrap();
    assert!(s
        .get_user(user.id)
        .unwrap()
        .permission_set_group_ids
        .is_empty());
}

#[test]
fn test_ids_are_never_reused() {
    let (_dir, s) = store();

    let p = s.create_profile("One", "").unwrap();
    s.delete_profile(p.id).unwrap();
    let q = s.create_profile("Two", "").unwrap();
    assert!(q.id > p.id);
}
