//! Collection schemas.
//!
//! A [`Schema`] declares the required fields, optional fields and field type
//! tags of one collection. A [`SchemaSet`] is the static set of governed
//! collections, loaded once at startup and never mutated afterwards.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::value::TypeTag;

/// Declared type of a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldType {
    /// Field name.
    pub field: String,
    /// Declared tag.
    #[serde(rename = "type")]
    pub tag: TypeTag,
}

/// Schema of one collection.
///
/// Field lists keep declaration order; validation messages follow it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Fields that must be present and non-null.
    #[serde(default)]
    pub required: Vec<String>,
    /// Fields that may be present.
    #[serde(default)]
    pub optional: Vec<String>,
    /// Declared types, checked when the field is present and non-null.
    #[serde(default)]
    pub types: Vec<FieldType>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add required fields.
    pub fn with_required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Add optional fields.
    pub fn with_optional<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Declare the type of a field.
    pub fn with_type(mut self, field: impl Into<String>, tag: TypeTag) -> Self {
        self.types.push(FieldType {
            field: field.into(),
            tag,
        });
        self
    }

    /// Declared type of a field, if any.
    pub fn type_of(&self, field: &str) -> Option<TypeTag> {
        self.types.iter().find(|t| t.field == field).map(|t| t.tag)
    }
}

/// A named collection schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Collection name.
    pub name: String,
    /// Its schema.
    #[serde(flatten)]
    pub schema: Schema,
}

/// The governed collections, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSet {
    collections: Vec<CollectionSchema>,
}

impl SchemaSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a collection schema.
    pub fn with_collection(mut self, name: impl Into<String>, schema: Schema) -> Self {
        let name = name.into();
        match self.collections.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.schema = schema,
            None => self.collections.push(CollectionSchema { name, schema }),
        }
        self
    }

    /// Schema of a collection, if governed.
    pub fn get(&self, collection: &str) -> Option<&Schema> {
        self.collections
            .iter()
            .find(|c| c.name == collection)
            .map(|c| &c.schema)
    }

    /// Governed collection names.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(|c| c.name.as_str())
    }

    /// Iterate `(name, schema)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Schema)> {
        self.collections.iter().map(|c| (c.name.as_str(), &c.schema))
    }

    /// Number of governed collections.
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// Check if no collection is governed.
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Load a schema set from a JSON file.
    ///
    /// ```json
    /// { "collections": [
    ///     { "name": "users", "required": ["email"],
    ///       "types": [{ "field": "email", "type": "string" }] }
    /// ] }
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::SchemaFile {
            path: path.display().to_string(),
            source,
        })?;
        let set: SchemaSet =
            serde_json::from_str(&text).map_err(|source| ConfigError::SchemaParse {
                path: path.display().to_string(),
                source,
            })?;
        set.check()?;
        Ok(set)
    }

    fn check(&self) -> Result<(), ConfigError> {
        for (name, schema) in self.iter() {
            if let Some(t) = schema.types.iter().find(|t| t.tag == TypeTag::Null) {
                return Err(ConfigError::Invalid(format!(
                    "collection '{}' declares field '{}' with type 'null'",
                    name, t.field
                )));
            }
        }
        Ok(())
    }

    /// The schemas of the coaching education platform.
    pub fn educational() -> Self {
        use TypeTag::*;

        SchemaSet::new()
            .with_collection(
                "users",
                Schema::new()
                    .with_required(["email", "name", "role", "createdAt"])
                    .with_optional(["profileImage", "bio", "preferences", "lastLoginAt", "isActive"])
                    .with_type("email", String)
                    .with_type("name", String)
                    .with_type("role", String)
                    .with_type("createdAt", Timestamp)
                    .with_type("isActive", Boolean),
            )
            .with_collection(
                "modules",
                Schema::new()
                    .with_required(["id", "title", "description", "order", "isActive"])
                    .with_optional([
                        "category",
                        "difficulty",
                        "estimatedTime",
                        "prerequisites",
                        "resources",
                    ])
                    .with_type("id", String)
                    .with_type("title", String)
                    .with_type("description", String)
                    .with_type("order", Number)
                    .with_type("isActive", Boolean)
                    .with_type("difficulty", String)
                    .with_type("estimatedTime", Number),
            )
            .with_collection(
                "userProgress",
                Schema::new()
                    .with_required(["userId", "modules", "updatedAt"])
                    .with_optional(["overallProgress", "achievements", "createdAt"])
                    .with_type("userId", String)
                    .with_type("modules", Object)
                    .with_type("updatedAt", String)
                    .with_type("overallProgress", Number),
            )
            .with_collection(
                "quizSubmissions",
                Schema::new()
                    .with_required([
                        "userId",
                        "moduleId",
                        "quizType",
                        "score",
                        "totalQuestions",
                        "percentage",
                        "submittedAt",
                    ])
                    .with_optional(["answers", "timeSpent", "requestId"])
                    .with_type("userId", String)
                    .with_type("moduleId", String)
                    .with_type("quizType", String)
                    .with_type("score", Number)
                    .with_type("totalQuestions", Number)
                    .with_type("percentage", Number)
                    .with_type("submittedAt", String),
            )
    }
}
