//! Building records from edited form input.

use crate::error::{LazyAdminError, Result};
use crate::models::schema::ColumnInfo;
use crate::models::value::{Record, Value};
use std::collections::HashMap;

/// Build the record for an INSERT from raw text input.
///
/// Inputs are trimmed and blank fields are left out so the database applies
/// its defaults. Fails if a required column (not nullable, no default) is
/// blank, naming every such column.
pub fn insert_record(columns: &[ColumnInfo], inputs: &HashMap<String, String>) -> Result<Record> {
    let mut record = Record::new();
    let mut missing = Vec::new();

    for column in columns {
        let value = inputs.get(&column.name).map(|s| s.trim()).unwrap_or_default();
        if value.is_empty() {
            if column.is_required() {
                missing.push(column.name.as_str());
            }
            continue;
        }
        record.insert(column.name.clone(), Value::Text(value.to_string()));
    }

    if !missing.is_empty() {
        return Err(LazyAdminError::validation(format!(
            "required fields missing: {}",
            missing.join(", ")
        )));
    }

    Ok(record)
}

/// Collect the fields an edit actually changed, for an UPDATE.
///
/// Primary-key columns are never included. A field cleared on a nullable
/// column becomes NULL; fields whose trimmed text equals the original display
/// text are skipped.
pub fn changed_fields(
    columns: &[ColumnInfo],
    original: &Record,
    edited: &HashMap<String, String>,
) -> Record {
    let mut changes = Record::new();

    for column in columns.iter().filter(|c| !c.primary_key) {
        let Some(edited) = edited.get(&column.name) else {
            continue;
        };
        let value = edited.trim();
        let before = match original.get(&column.name) {
            None | Some(Value::Null) => String::new(),
            Some(v) => v.to_display(),
        };
        if value == before {
            continue;
        }
        let new_value = if value.is_empty() && column.nullable {
            Value::Null
        } else {
            Value::Text(value.to_string())
        };
        changes.insert(column.name.clone(), new_value);
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn columns() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo {
                name: "id".into(),
                data_type: "INTEGER".into(),
                nullable: true,
                primary_key: true,
                default_value: None,
            },
            ColumnInfo {
                name: "email".into(),
                data_type: "TEXT".into(),
                nullable: false,
                primary_key: false,
                default_value: None,
            },
            ColumnInfo {
                name: "bio".into(),
                data_type: "TEXT".into(),
                nullable: true,
                primary_key: false,
                default_value: None,
            },
            ColumnInfo {
                name: "role".into(),
                data_type: "TEXT".into(),
                nullable: false,
                primary_key: false,
                default_value: Some("'member'".into()),
            },
        ]
    }

    fn inputs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_insert_record_trims_and_skips_blanks() {
        let record =
            insert_record(&columns(), &inputs(&[("email", "  a@b.com "), ("bio", "   ")])).unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record["email"], Value::Text("a@b.com".into()));
    }

    #[test]
    fn test_insert_record_reports_required_fields() {
        let err = insert_record(&columns(), &inputs(&[("bio", "hi")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("required fields missing: email"));
    }

    #[test]
    fn test_changed_fields() {
        let original: Record = [
            ("id".to_string(), Value::Int(1)),
            ("email".to_string(), Value::Text("a@b.com".into())),
            ("bio".to_string(), Value::Text("hello".into())),
            ("role".to_string(), Value::Null),
        ]
        .into_iter()
        .collect();

        let edited = inputs(&[("id", "99"), ("email", "a@b.com"), ("bio", ""), ("role", "admin")]);
        let changes = changed_fields(&columns(), &original, &edited);

        assert!(!changes.contains_key("id"));
        assert!(!changes.contains_key("email"));
        assert_eq!(changes["bio"], Value::Null);
        assert_eq!(changes["role"], Value::Text("admin".into()));
    }

    #[test]
    fn test_changed_fields_blank_on_required_stays_text() {
        let original: Record =
            [("email".to_string(), Value::Text("a@b.com".into()))].into_iter().collect();
        let changes = changed_fields(&columns(), &original, &inputs(&[("email", " ")]));
        assert_eq!(changes["email"], Value::Text(String::new()));
    }
}
