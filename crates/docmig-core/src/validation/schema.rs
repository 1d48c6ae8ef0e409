//! Per-document schema validation.

use crate::schema::Schema;
use crate::value::Fields;

/// Validate one document against one schema.
///
/// Returns one message per problem: missing required fields first, then type
/// mismatches, each in schema declaration order. Null values count as
/// missing and are never type-checked.
pub fn validate_document(fields: &Fields, schema: &Schema, path: &str) -> Vec<String> {
    let mut errors = Vec::new();

    for field in &schema.required {
        if fields.get(field).map_or(true, |v| v.is_null()) {
            errors.push(format!("{}: Missing required field '{}'", path, field));
        }
    }

    for declared in &schema.types {
        let Some(value) = fields.get(&declared.field) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let actual = value.type_tag();
        if actual != declared.tag {
            errors.push(format!(
                "{}: Field '{}' has type '{}', expected '{}'",
                path, declared.field, actual, declared.tag
            ));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaSet;
    use crate::value::{fields, Timestamp, Value};
    use pretty_assertions::assert_eq;

    fn valid_user() -> Fields {
        fields([
            ("email", Value::from("coach@example.com")),
            ("name", Value::from("Coach")),
            ("role", Value::from("instructor")),
            ("createdAt", Value::from(Timestamp::now())),
            ("isActive", Value::from(true)),
        ])
    }

    #[test]
    fn test_valid_document() {
        let set = SchemaSet::educational();
        let errors = validate_document(&valid_user(), set.get("users").unwrap(), "users/u1");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_missing_and_null_required_fields() {
        let set = SchemaSet::educational();
        let mut doc = valid_user();
        doc.remove("email");
        doc.insert("role".into(), Value::Null);

        let errors = validate_document(&doc, set.get("users").unwrap(), "users/u1");
        assert_eq!(
            errors,
            vec![
                "users/u1: Missing required field 'email'".to_string(),
                "users/u1: Missing required field 'role'".to_string(),
            ]
        );
    }

    #[test]
    fn test_string_boolean_is_one_type_error() {
        let set = SchemaSet::educational();
        let mut doc = valid_user();
        doc.insert("isActive".into(), Value::from("true"));

        let errors = validate_document(&doc, set.get("users").unwrap(), "users/u1");
        assert_eq!(
            errors,
            vec!["users/u1: Field 'isActive' has type 'string', expected 'boolean'".to_string()]
        );
    }

    #[test]
    fn test_error_ordering() {
        let set = SchemaSet::educational();
        let doc = fields([
            ("createdAt", Value::from("2025-01-01")),
            ("email", Value::from(42)),
            ("name", Value::from("N")),
        ]);

        let errors = validate_document(&doc, set.get("users").unwrap(), "users/x");
        assert_eq!(
            errors,
            vec![
                "users/x: Missing required field 'role'".to_string(),
                "users/x: Field 'email' has type 'number', expected 'string'".to_string(),
                "users/x: Field 'createdAt' has type 'string', expected 'timestamp'".to_string(),
            ]
        );
    }

    #[test]
    fn test_lists_count_as_objects() {
        let set = SchemaSet::educational();
        let doc = fields([
            ("userId", Value::from("u1")),
            ("modules", Value::List(vec![])),
            ("updatedAt", Value::from("2025-01-01T00:00:00Z")),
        ]);
        let errors = validate_document(&doc, set.get("userProgress").unwrap(), "userProgress/u1");
        assert!(errors.is_empty());
    }
}
