//! Migration steps.
//!
//! A step names the collections it rewrites and turns one document into the
//! fields to merge into it. The runner handles reading, idempotence markers
//! and batching.

use super::error::StepError;
use crate::value::{fields, Document, Fields, Value};

/// A transformation applied to every document of its target collections.
pub trait MigrationStep: Send + Sync {
    /// Human-readable summary, logged when the step starts.
    fn description(&self) -> &str;

    /// Collections the step rewrites, in processing order.
    fn collections(&self) -> &[String];

    /// Fields to merge into `doc`, or `None` to leave it untouched.
    fn transform(&self, collection: &str, doc: &Document) -> Result<Option<Fields>, StepError>;
}

/// Additive step: sets a field to a default where it is absent or null.
#[derive(Debug, Clone)]
pub struct AddFieldStep {
    collections: Vec<String>,
    field: String,
    default: Value,
    description: String,
}

impl AddFieldStep {
    /// Add `field` with `default` to documents of `collection` lacking it.
    pub fn new(collection: impl Into<String>, field: impl Into<String>, default: Value) -> Self {
        let collection = collection.into();
        let field = field.into();
        let description = format!("Adding {} to {}", field, collection);
        Self {
            collections: vec![collection],
            field,
            default,
            description,
        }
    }

    /// Override the logged description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl MigrationStep for AddFieldStep {
    fn description(&self) -> &str {
        &self.description
    }

    fn collections(&self) -> &[String] {
        &self.collections
    }

    fn transform(&self, _collection: &str, doc: &Document) -> Result<Option<Fields>, StepError> {
        match doc.get(&self.field) {
            Some(v) if !v.is_null() => Ok(None),
            _ => Ok(Some(fields([(self.field.clone(), self.default.clone())]))),
        }
    }
}

type DeriveFn = dyn Fn(&Document) -> Result<Fields, StepError> + Send + Sync;

/// Derived step: computes new fields from each document's existing ones.
pub struct DeriveFieldsStep {
    collections: Vec<String>,
    description: String,
    derive: Box<DeriveFn>,
}

impl DeriveFieldsStep {
    /// Derive fields for every document of `collection`.
    pub fn new<F>(collection: impl Into<String>, description: impl Into<String>, derive: F) -> Self
    where
        F: Fn(&Document) -> Result<Fields, StepError> + Send + Sync + 'static,
    {
        Self {
            collections: vec![collection.into()],
            description: description.into(),
            derive: Box::new(derive),
        }
    }
}

impl std::fmt::Debug for DeriveFieldsStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeriveFieldsStep")
            .field("collections", &self.collections)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl MigrationStep for DeriveFieldsStep {
    fn description(&self) -> &str {
        &self.description
    }

    fn collections(&self) -> &[String] {
        &self.collections
    }

    fn transform(&self, _collection: &str, doc: &Document) -> Result<Option<Fields>, StepError> {
        (self.derive)(doc).map(Some)
    }
}

/// Quiz difficulty from the score percentage.
pub fn quiz_difficulty(percentage: Option<f64>) -> &'static str {
    match percentage {
        Some(p) if p >= 90.0 => "easy",
        Some(p) if p >= 70.0 => "medium",
        _ => "hard",
    }
}

/// Performance band from the score percentage.
pub fn performance_category(percentage: Option<f64>) -> &'static str {
    match percentage {
        Some(p) if p >= 90.0 => "excellent",
        Some(p) if p >= 80.0 => "good",
        Some(p) if p >= 70.0 => "satisfactory",
        _ => "needs_improvement",
    }
}

/// Number field, or `fallback` when absent, null, zero or non-numeric.
fn number_or(doc: &Document, field: &str, fallback: i64) -> Value {
    match doc.get(field) {
        Some(v @ (Value::Integer(_) | Value::Float(_))) if v.as_f64() != Some(0.0) => v.clone(),
        _ => Value::Integer(fallback),
    }
}

/// The quiz analytics step: derives `analytics` from `timeSpent`,
/// `attemptNumber` and `percentage`.
pub fn analytics_step(collection: &str) -> DeriveFieldsStep {
    DeriveFieldsStep::new(
        collection,
        "Restructuring quiz submissions for analytics",
        |doc| {
            let percentage = doc.get("percentage").and_then(Value::as_f64);
            let analytics = fields([
                ("responseTime", number_or(doc, "timeSpent", 0)),
                ("attemptNumber", number_or(doc, "attemptNumber", 1)),
                ("difficulty", Value::from(quiz_difficulty(percentage))),
                (
                    "performanceCategory",
                    Value::from(performance_category(percentage)),
                ),
            ]);
            Ok(fields([("analytics", Value::Object(analytics))]))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_field_only_when_missing() {
        let step = AddFieldStep::new("userProgress", "achievements", Value::List(vec![]));

        let bare = Document::new("p1", fields([("userId", "u1")]));
        assert_eq!(
            step.transform("userProgress", &bare).unwrap(),
            Some(fields([("achievements", Value::List(vec![]))]))
        );

        let done = Document::new(
            "p2",
            fields([("achievements", Value::List(vec![Value::from("first_quiz_completed")]))]),
        );
        assert_eq!(step.transform("userProgress", &done).unwrap(), None);
    }

    #[test]
    fn test_bands() {
        assert_eq!(quiz_difficulty(Some(95.0)), "easy");
        assert_eq!(quiz_difficulty(Some(70.0)), "medium");
        assert_eq!(quiz_difficulty(None), "hard");
        assert_eq!(performance_category(Some(90.0)), "excellent");
        assert_eq!(performance_category(Some(85.0)), "good");
        assert_eq!(performance_category(Some(72.0)), "satisfactory");
        assert_eq!(performance_category(Some(10.0)), "needs_improvement");
    }

    #[test]
    fn test_analytics_defaults() {
        let step = analytics_step("quizSubmissions");
        let doc = Document::new("q1", fields([("percentage", 84), ("timeSpent", 0)]));
        let derived = step.transform("quizSubmissions", &doc).unwrap().unwrap();

        let expected = fields([(
            "analytics",
            Value::Object(fields([
                ("responseTime", Value::from(0)),
                ("attemptNumber", Value::from(1)),
                ("difficulty", Value::from("medium")),
                ("performanceCategory", Value::from("good")),
            ])),
        )]);
        assert_eq!(derived, expected);
    }

    #[test]
    fn test_analytics_carries_values() {
        let step = analytics_step("quizSubmissions");
        let doc = Document::new(
            "q2",
            fields([("percentage", 95), ("timeSpent", 240), ("attemptNumber", 3)]),
        );
        let derived = step.transform("quizSubmissions", &doc).unwrap().unwrap();
        let analytics = derived["analytics"].as_object().unwrap();
        assert_eq!(analytics["responseTime"], Value::from(240));
        assert_eq!(analytics["attemptNumber"], Value::from(3));
    }
}
