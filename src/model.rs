//! Entity rows and value types shared across the store.
//!
//! Rows are plain serde structs persisted through `heed::types::SerdeJson`.
//! Scalar permission state never lives on these rows; it sits in the mask
//! tables keyed by `(principal, object[, field])`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{
    CREATE, DELETE, FIELD_EDIT, FIELD_READ, MODIFY_ALL, PSET_TAG, READ, UPDATE, VIEW_ALL,
};

/// A node in the role hierarchy. `parent_id == None` marks a root; multiple
/// roots are allowed (the hierarchy is a forest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: u64,
    pub name: String,
    pub parent_id: Option<u64>,
}

/// A platform user. The profile is the permission baseline; permission sets
/// and permission set groups are strictly additive on top of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub role_id: Option<u64>,
    pub profile_id: Option<u64>,
    pub permission_set_ids: Vec<u64>,
    pub permission_set_group_ids: Vec<u64>,
}

/// Baseline permission bundle, single-assignment per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: u64,
    pub name: String,
    pub description: String,
}

/// Additive permission bundle, multiply-assignable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub id: u64,
    pub name: String,
    pub description: String,
}

/// Named bundle of permission sets, assigned as a unit. Assigning the group
/// is equivalent to assigning every member set; expansion happens at
/// evaluation time, never denormalized onto the user row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSetGroup {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub permission_set_ids: Vec<u64>,
}

/// A custom object definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDef {
    pub id: u64,
    pub uuid: String,
    pub name: String,
    /// Derived from `name`: lowercased, spaces to underscores, `custom_` prefix.
    pub table_name: String,
    /// Epoch milliseconds.
    pub created_at: u64,
}

/// A field on a custom object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub id: u64,
    pub object_id: u64,
    pub label: String,
    /// Derived from `label`: lowercased, spaces to underscores.
    pub column_name: String,
    pub data_type: DataType,
    pub is_required: bool,
    /// Type-specific options, validated against the option schema for
    /// `data_type` (see `fieldmeta`).
    pub options: Map<String, Value>,
}

/// A page layout, opaque to the engine apart from its owning object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub id: u64,
    pub name: String,
    pub object_id: u64,
}

/// The closed set of field data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    AutoNumber,
    Formula,
    Lookup,
    MasterDetail,
    Checkbox,
    Currency,
    Date,
    DateTime,
    Email,
    Geolocation,
    Number,
    Percent,
    Phone,
    Picklist,
    MultiPicklist,
    Text,
    TextArea,
    LongTextArea,
    RichTextArea,
    EncryptedText,
    Time,
    Url,
    ExternalLookup,
    IndirectLookup,
    File,
    MetadataRelationship,
}

impl DataType {
    pub const ALL: &'static [DataType] = &[
        DataType::AutoNumber,
        DataType::Formula,
        DataType::Lookup,
        DataType::MasterDetail,
        DataType::Checkbox,
        DataType::Currency,
        DataType::Date,
        DataType::DateTime,
        DataType::Email,
        DataType::Geolocation,
        DataType::Number,
        DataType::Percent,
        DataType::Phone,
        DataType::Picklist,
        DataType::MultiPicklist,
        DataType::Text,
        DataType::TextArea,
        DataType::LongTextArea,
        DataType::RichTextArea,
        DataType::EncryptedText,
        DataType::Time,
        DataType::Url,
        DataType::ExternalLookup,
        DataType::IndirectLookup,
        DataType::File,
        DataType::MetadataRelationship,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::AutoNumber => "autonumber",
            DataType::Formula => "formula",
            DataType::Lookup => "lookup",
            DataType::MasterDetail => "masterdetail",
            DataType::Checkbox => "checkbox",
            DataType::Currency => "currency",
            DataType::Date => "date",
            DataType::DateTime => "datetime",
            DataType::Email => "email",
            DataType::Geolocation => "geolocation",
            DataType::Number => "number",
            DataType::Percent => "percent",
            DataType::Phone => "phone",
            DataType::Picklist => "picklist",
            DataType::MultiPicklist => "multipicklist",
            DataType::Text => "text",
            DataType::TextArea => "textarea",
            DataType::LongTextArea => "longtextarea",
            DataType::RichTextArea => "richtextarea",
            DataType::EncryptedText => "encryptedtext",
            DataType::Time => "time",
            DataType::Url => "url",
            DataType::ExternalLookup => "externallookup",
            DataType::IndirectLookup => "indirectlookup",
            DataType::File => "file",
            DataType::MetadataRelationship => "metadatarelationship",
        }
    }

    /// Parse the lowercase wire name back into a DataType.
    pub fn parse(s: &str) -> Option<DataType> {
        DataType::ALL.iter().copied().find(|d| d.as_str() == s)
    }
}

/// The principal a permission row is scoped to. The profile/permission-set
/// exclusivity of the original model holds by construction here: a row is
/// keyed by exactly one variant, encoded as a tagged scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Principal {
    Profile(u64),
    PermissionSet(u64),
}

impl Principal {
    /// Encode to the key scalar. Permission sets carry the top tag bit.
    pub(crate) fn encode(self) -> u64 {
        match self {
            Principal::Profile(id) => id,
            Principal::PermissionSet(id) => id | PSET_TAG,
        }
    }

    pub(crate) fn decode(code: u64) -> Principal {
        if code & PSET_TAG != 0 {
            Principal::PermissionSet(code & !PSET_TAG)
        } else {
            Principal::Profile(code)
        }
    }
}

/// Object-level access, the decoded form of an object permission mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAccess {
    pub create: bool,
    pub read: bool,
    pub update: bool,
    pub delete: bool,
    pub view_all: bool,
    pub modify_all: bool,
}

impl ObjectAccess {
    pub(crate) fn from_mask(mask: u64) -> ObjectAccess {
        ObjectAccess {
            create: mask & CREATE != 0,
            read: mask & READ != 0,
            update: mask & UPDATE != 0,
            delete: mask & DELETE != 0,
            view_all: mask & VIEW_ALL != 0,
            modify_all: mask & MODIFY_ALL != 0,
        }
    }

    pub(crate) fn mask(self) -> u64 {
        let mut m = 0;
        if self.create {
            m |= CREATE;
        }
        if self.read {
            m |= READ;
        }
        if self.update {
            m |= UPDATE;
        }
        if self.delete {
            m |= DELETE;
        }
        if self.view_all {
            m |= VIEW_ALL;
        }
        if self.modify_all {
            m |= MODIFY_ALL;
        }
        m
    }
}

/// Field-level access. `edit` implies `read` on every write path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAccess {
    pub read: bool,
    pub edit: bool,
}

impl FieldAccess {
    pub(crate) fn from_mask(mask: u64) -> FieldAccess {
        FieldAccess {
            read: mask & FIELD_READ != 0,
            edit: mask & FIELD_EDIT != 0,
        }
    }

    pub(crate) fn mask(self) -> u64 {
        let mut m = 0;
        if self.read {
            m |= FIELD_READ;
        }
        if self.edit {
            m |= FIELD_EDIT;
        }
        m
    }
}

/// Record-level access for a concrete record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAccess {
    pub read: bool,
    pub update: bool,
}

/// One toggleable object permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectPermKey {
    Create,
    Read,
    Update,
    Delete,
    ViewAll,
    ModifyAll,
}

impl ObjectPermKey {
    pub(crate) fn bit(self) -> u64 {
        match self {
            ObjectPermKey::Create => CREATE,
            ObjectPermKey::Read => READ,
            ObjectPermKey::Update => UPDATE,
            ObjectPermKey::Delete => DELETE,
            ObjectPermKey::ViewAll => VIEW_ALL,
            ObjectPermKey::ModifyAll => MODIFY_ALL,
        }
    }
}

/// One toggleable field permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPermKey {
    Read,
    Edit,
}

/// Record visibility level, ordered Private < Read < ReadWrite. Used both as
/// the org-wide default and as the grant level of a sharing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessLevel {
    Private,
    Read,
    ReadWrite,
}

impl AccessLevel {
    pub(crate) fn code(self) -> u64 {
        match self {
            AccessLevel::Private => 0,
            AccessLevel::Read => 1,
            AccessLevel::ReadWrite => 2,
        }
    }

    pub(crate) fn from_code(code: u64) -> AccessLevel {
        match code {
            2 => AccessLevel::ReadWrite,
            1 => AccessLevel::Read,
            _ => AccessLevel::Private,
        }
    }
}

/// How a sharing rule selects the records it widens access to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleKind {
    /// Applies to every record of the object, whoever owns it.
    Owner,
    /// Applies to records whose field values match all criteria.
    Criteria(Vec<Criterion>),
}

/// One predicate of a criteria-based sharing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    /// Field label or column name on the rule's object.
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Contains,
}

/// Who a sharing rule widens access for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShareTarget {
    /// The role and every role below it.
    Role(u64),
    /// A permission set or permission set group carried by the user.
    Group(u64),
    User(u64),
}

/// A declarative rule widening record visibility beyond the org-wide default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingRule {
    pub id: u64,
    pub object_id: u64,
    /// Never `Private`; rules only widen.
    pub access: AccessLevel,
    pub kind: RuleKind,
    pub share_with: ShareTarget,
}

/// A record presented to the resolver. Never stored; the engine only decides
/// access, the data layer owns the rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Owning user id.
    pub owner_id: u64,
    /// Field values keyed by column name (labels also accepted by criteria
    /// resolution).
    pub values: Map<String, Value>,
}

impl Record {
    pub fn new(owner_id: u64) -> Record {
        Record {
            owner_id,
            values: Map::new(),
        }
    }

    pub fn with_value(mut self, field: &str, value: Value) -> Record {
        self.values.insert(field.to_string(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_roundtrip() {
        for p in [Principal::Profile(7), Principal::PermissionSet(7)] {
            assert_eq!(Principal::decode(p.encode()), p);
        }
    }

    #[test]
    fn principal_codes_disjoint() {
        assert_ne!(
            Principal::Profile(42).encode(),
            Principal::PermissionSet(42).encode()
        );
    }

    #[test]
    fn object_access_mask_roundtrip() {
        let a = ObjectAccess {
            create: true,
            read: true,
            update: false,
            delete: true,
            view_all: false,
            modify_all: true,
        };
        assert_eq!(ObjectAccess::from_mask(a.mask()), a);
    }

    #[test]
    fn data_type_names_roundtrip() {
        for dt in DataType::ALL {
            assert_eq!(DataType::parse(dt.as_str()), Some(*dt));
        }
    }

    #[test]
    fn access_level_ordering() {
        assert!(AccessLevel::Private < AccessLevel::Read);
        assert!(AccessLevel::Read < AccessLevel::ReadWrite);
    }
}
