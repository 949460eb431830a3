//! Metadata catalog tests: derived names, field type option schemas, and
//! the delete cascades.

use orgperm::{
    AccessLevel, DataType, FieldAccess, ObjectAccess, OrgPermError, Principal, RuleKind,
    ShareTarget, Store,
};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

fn store() -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    (dir, store)
}

fn opts(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_object_names_derived() {
    let (_dir, s) = store();

    let obj = s.create_object("Customer Invoice").unwrap();
    assert_eq!(obj.table_name, "custom_customer_invoice");
    assert_eq!(obj.uuid.len(), 36);
    assert!(obj.created_at > 0);

    let found = s.get_object_by_table_name("custom_customer_invoice").unwrap();
    assert_eq!(found.id, obj.id);
}

#[test]
fn test_object_name_validation() {
    let (_dir, s) = store();

    assert!(matches!(
        s.create_object("   "),
        Err(OrgPermError::Validation(_))
    ));

    s.create_object("Project").unwrap();
    // Same derived table name, different spelling
    assert!(matches!(
        s.create_object(" project "),
        Err(OrgPermError::Validation(_))
    ));
}

#[test]
fn test_object_rename_rederives() {
    let (_dir, s) = store();

    let obj = s.create_object("Project").unwrap();
    let renamed = s.rename_object(obj.id, "Project Archive").unwrap();
    assert_eq!(renamed.table_name, "custom_project_archive");

    // Old name is free again
    s.create_object("Project").unwrap();
}

#[test]
fn test_field_creation_and_options() {
    let (_dir, s) = store();

    let obj = s.create_object("Lead").unwrap();
    let field = s
        .create_field(
            obj.id,
            "Lead Rating",
            DataType::Picklist,
            false,
            opts(&[
                ("values", json!(["Hot", "Warm", "Cold"])),
                ("restrict_to_values", json!(true)),
            ]),
        )
        .unwrap();
    assert_eq!(field.column_name, "lead_rating");

    let fields = s.list_fields(obj.id).unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].data_type, DataType::Picklist);
}

#[test]
fn test_field_option_schema_enforced() {
    let (_dir, s) = store();
    let obj = s.create_object("Lead").unwrap();

    // Missing declared option
    assert!(matches!(
        s.create_field(obj.id, "Rating", DataType::Picklist, false, opts(&[("values", json!(["A"]))])),
        Err(OrgPermError::Validation(_))
    ));
    // Wrong kind
    assert!(matches!(
        s.create_field(
            obj.id,
            "Amount",
            DataType::Currency,
            false,
            opts(&[("precision", json!("ten")), ("scale", json!(2))]),
        ),
        Err(OrgPermError::Validation(_))
    ));
    // Unknown key
    assert!(matches!(
        s.create_field(
            obj.id,
            "Notes",
            DataType::Text,
            false,
            opts(&[("length", json!(255)), ("color", json!("red"))]),
        ),
        Err(OrgPermError::Validation(_))
    ));
    // Blank label
    assert!(matches!(
        s.create_field(obj.id, " ", DataType::Date, false, Map::new()),
        Err(OrgPermError::Validation(_))
    ));
}

#[test]
fn test_lookup_target_must_exist() {
    let (_dir, s) = store();
    let lead = s.create_object("Lead").unwrap();
    let account = s.create_object("Account").unwrap();

    assert!(matches!(
        s.create_field(
            lead.id,
            "Account",
            DataType::Lookup,
            false,
            opts(&[("related_object", json!(9999))]),
        ),
        Err(OrgPermError::NotFound(_))
    ));

    let field = s
        .create_field(
            lead.id,
            "Account",
            DataType::Lookup,
            true,
            opts(&[("related_object", json!(account.id))]),
        )
        .unwrap();
    assert!(field.is_required);
}

#[test]
fn test_duplicate_column_rejected() {
    let (_dir, s) = store();
    let obj = s.create_object("Lead").unwrap();

    s.create_field(obj.id, "Due Date", DataType::Date, false, Map::new())
        .unwrap();
    assert!(matches!(
        s.create_field(obj.id, "due date", DataType::Date, false, Map::new()),
        Err(OrgPermError::Validation(_))
    ));
}

#[test]
fn test_field_update_rederives_column() {
    let (_dir, s) = store();
    let obj = s.create_object("Lead").unwrap();
    let field = s
        .create_field(obj.id, "Due Date", DataType::Date, false, Map::new())
        .unwrap();

    let updated = s
        .update_field(field.id, "Close Date", DataType::Date, true, Map::new())
        .unwrap();
    assert_eq!(updated.column_name, "close_date");
    assert_eq!(updated.id, field.id);
    assert_eq!(s.get_field(field.id).unwrap().label, "Close Date");
}

#[test]
fn test_field_delete_drops_permissions() {
    let (_dir, s) = store();
    let obj = s.create_object("Lead").unwrap();
    let field = s
        .create_field(obj.id, "Status", DataType::Text, false, opts(&[("length", json!(80))]))
        .unwrap();
    let profile = s.create_profile("Sales", "").unwrap();
    let p = Principal::Profile(profile.id);

    s.set_field_permission(obj.id, "status", p, FieldAccess { read: true, edit: false })
        .unwrap();
    s.delete_field(field.id).unwrap();

    assert!(s.list_fields(obj.id).unwrap().is_empty());
    assert_eq!(s.get_field_permission(obj.id, "status", p).unwrap(), None);
}

#[test]
fn test_object_delete_cascades() {
    let (_dir, s) = store();

    let obj = s.create_object("Project").unwrap();
    s.create_field(obj.id, "Status", DataType::Text, false, opts(&[("length", json!(40))]))
        .unwrap();
    let profile = s.create_profile("Sales", "").unwrap();
    let p = Principal::Profile(profile.id);
    s.set_object_permission(obj.id, p, ObjectAccess { read: true, ..Default::default() })
        .unwrap();
    s.set_field_permission(obj.id, "status", p, FieldAccess { read: true, edit: false })
        .unwrap();
    s.set_owd(obj.id, AccessLevel::Read).unwrap();
    let user = s.create_user("Ada", "ada@x.example", None, None).unwrap();
    let rule = s
        .create_sharing_rule(obj.id, AccessLevel::Read, RuleKind::Owner, ShareTarget::User(user.id))
        .unwrap();
    let layout = s.create_layout(obj.id, "Default").unwrap();
    s.assign_layout(p, layout.id).unwrap();

    s.delete_object(obj.id).unwrap();

    assert!(matches!(s.get_object(obj.id), Err(OrgPermError::NotFound(_))));
    assert_eq!(s.get_object_permission(obj.id, p).unwrap(), None);
    assert_eq!(s.get_owd(obj.id).unwrap(), AccessLevel::Private);
    assert!(matches!(
        s.get_sharing_rule(rule.id),
        Err(OrgPermError::NotFound(_))
    ));
    assert_eq!(s.layout_for(p, obj.id).unwrap(), None);
    assert!(s.list_fields(obj.id).unwrap().is_empty());

    // The derived name is free again
    s.create_object("Project").unwrap();
}
