//! Static per-data-type option schemas.
//!
//! Every field type declares the configuration options a field of that type
//! accepts, as const data. Field creation validates the supplied options
//! against this table; dynamic form rendering in a console reads it the same
//! way.

use serde_json::{Map, Value};

use crate::error::{invalid, Result};
use crate::model::DataType;

/// The primitive kind an option value must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    String,
    Number,
    Boolean,
    StringArray,
    /// A reference to an existing object, supplied as its numeric id.
    ObjectRef,
}

impl OptionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OptionKind::String => "string",
            OptionKind::Number => "number",
            OptionKind::Boolean => "boolean",
            OptionKind::StringArray => "string array",
            OptionKind::ObjectRef => "object reference",
        }
    }

    fn accepts(self, v: &Value) -> bool {
        match self {
            OptionKind::String => v.is_string(),
            OptionKind::Number => v.is_number(),
            OptionKind::Boolean => v.is_boolean(),
            OptionKind::StringArray => {
                v.as_array().is_some_and(|a| a.iter().all(Value::is_string))
            }
            OptionKind::ObjectRef => v.is_u64(),
        }
    }
}

/// One declared option on a field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub kind: OptionKind,
}

const fn opt(name: &'static str, kind: OptionKind) -> OptionSpec {
    OptionSpec { name, kind }
}

const AUTO_NUMBER: &[OptionSpec] = &[
    opt("display_format", OptionKind::String),
    opt("starting_number", OptionKind::Number),
];
const FORMULA: &[OptionSpec] = &[
    opt("expression", OptionKind::String),
    opt("return_type", OptionKind::String),
];
const RELATED: &[OptionSpec] = &[opt("related_object", OptionKind::ObjectRef)];
const CHECKBOX: &[OptionSpec] = &[opt("default_checked", OptionKind::Boolean)];
const DECIMAL: &[OptionSpec] = &[
    opt("precision", OptionKind::Number),
    opt("scale", OptionKind::Number),
];
const GEOLOCATION: &[OptionSpec] = &[opt("decimal_places", OptionKind::Number)];
const PICKLIST: &[OptionSpec] = &[
    opt("values", OptionKind::StringArray),
    opt("restrict_to_values", OptionKind::Boolean),
];
const MULTI_PICKLIST: &[OptionSpec] = &[
    opt("values", OptionKind::StringArray),
    opt("visible_lines", OptionKind::Number),
];
const TEXT: &[OptionSpec] = &[opt("length", OptionKind::Number)];
const LONG_TEXT: &[OptionSpec] = &[
    opt("length", OptionKind::Number),
    opt("visible_lines", OptionKind::Number),
];
const ENCRYPTED_TEXT: &[OptionSpec] = &[
    opt("length", OptionKind::Number),
    opt("mask_type", OptionKind::String),
];
const INDIRECT_LOOKUP: &[OptionSpec] = &[
    opt("related_object", OptionKind::ObjectRef),
    opt("target_field", OptionKind::String),
];
const NONE: &[OptionSpec] = &[];

/// The option schema for each data type.
pub fn options_for(data_type: DataType) -> &'static [OptionSpec] {
    match data_type {
        DataType::AutoNumber => AUTO_NUMBER,
        DataType::Formula => FORMULA,
        DataType::Lookup
        | DataType::MasterDetail
        | DataType::ExternalLookup
        | DataType::MetadataRelationship => RELATED,
        DataType::Checkbox => CHECKBOX,
        DataType::Currency | DataType::Number | DataType::Percent => DECIMAL,
        DataType::Geolocation => GEOLOCATION,
        DataType::Picklist => PICKLIST,
        DataType::MultiPicklist => MULTI_PICKLIST,
        DataType::Text => TEXT,
        DataType::LongTextArea | DataType::RichTextArea => LONG_TEXT,
        DataType::EncryptedText => ENCRYPTED_TEXT,
        DataType::IndirectLookup => INDIRECT_LOOKUP,
        DataType::Date
        | DataType::DateTime
        | DataType::Email
        | DataType::Phone
        | DataType::TextArea
        | DataType::Time
        | DataType::Url
        | DataType::File => NONE,
    }
}

/// Validate supplied options against the schema for `data_type`.
///
/// Every declared option must be present with the declared kind; unknown
/// keys are rejected. ObjectRef targets are existence-checked by the caller
/// (the catalog has the transaction).
pub(crate) fn validate_options(data_type: DataType, options: &Map<String, Value>) -> Result<()> {
    let specs = options_for(data_type);
    for spec in specs {
        match options.get(spec.name) {
            None => {
                return Err(invalid(format!(
                    "field type {} requires option '{}'",
                    data_type.as_str(),
                    spec.name
                )))
            }
            Some(v) if !spec.kind.accepts(v) => {
                return Err(invalid(format!(
                    "option '{}' on field type {} must be a {}",
                    spec.name,
                    data_type.as_str(),
                    spec.kind.as_str()
                )))
            }
            Some(_) => {}
        }
    }
    for key in options.keys() {
        if !specs.iter().any(|s| s.name == key) {
            return Err(invalid(format!(
                "unknown option '{}' for field type {}",
                key,
                data_type.as_str()
            )));
        }
    }
    Ok(())
}

/// Ids of every ObjectRef option value, for existence checks.
pub(crate) fn object_refs(data_type: DataType, options: &Map<String, Value>) -> Vec<u64> {
    options_for(data_type)
        .iter()
        .filter(|s| s.kind == OptionKind::ObjectRef)
        .filter_map(|s| options.get(s.name).and_then(Value::as_u64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn picklist_options_validate() {
        let opts = map(&[
            ("values", json!(["Hot", "Warm", "Cold"])),
            ("restrict_to_values", json!(true)),
        ]);
        assert!(validate_options(DataType::Picklist, &opts).is_ok());
    }

    #[test]
    fn missing_option_rejected() {
        let opts = map(&[("values", json!(["A"]))]);
        assert!(validate_options(DataType::Picklist, &opts).is_err());
    }

    #[test]
    fn wrong_kind_rejected() {
        let opts = map(&[
            ("values", json!("not-an-array")),
            ("restrict_to_values", json!(true)),
        ]);
        assert!(validate_options(DataType::Picklist, &opts).is_err());
    }

    #[test]
    fn unknown_key_rejected() {
        let opts = map(&[("length", json!(80)), ("color", json!("red"))]);
        assert!(validate_options(DataType::Text, &opts).is_err());
    }

    #[test]
    fn optionless_types_accept_empty() {
        assert!(validate_options(DataType::Date, &Map::new()).is_ok());
        assert!(validate_options(DataType::File, &Map::new()).is_ok());
    }

    #[test]
    fn object_refs_extracted() {
        let opts = map(&[("related_object", json!(12))]);
        assert_eq!(object_refs(DataType::Lookup, &opts), vec![12]);
        assert!(object_refs(DataType::Date, &Map::new()).is_empty());
    }
}
