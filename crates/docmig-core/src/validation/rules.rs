//! Cross-document business rules.
//!
//! Every rule produces warnings, never errors. A document lacking the inputs
//! a rule needs is skipped for that rule.

use crate::error::StoreError;
use crate::store::DocumentStore;
use crate::value::{Document, Value};

/// Tolerance between stored and computed overall progress.
pub const PROGRESS_TOLERANCE: f64 = 5.0;

/// Tolerance between stored and computed quiz percentage.
pub const PERCENTAGE_TOLERANCE: f64 = 1.0;

/// Collections the business rules read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    /// Collection holding user documents.
    pub users: String,
    /// Collection holding per-user progress documents.
    pub progress: String,
    /// Collection holding quiz submissions.
    pub quizzes: String,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            users: "users".to_string(),
            progress: "userProgress".to_string(),
            quizzes: "quizSubmissions".to_string(),
        }
    }
}

impl RuleSet {
    /// Evaluate every rule against the store and return the warnings.
    pub fn evaluate<S: DocumentStore + ?Sized>(&self, store: &S) -> Result<Vec<String>, StoreError> {
        let mut warnings = Vec::new();

        for doc in store.list(&self.progress)? {
            if let Some(user_id) = doc.get("userId").and_then(Value::as_str) {
                if store.get(&self.users, user_id)?.is_none() {
                    warnings.push(format!(
                        "User progress exists for non-existent user: {}",
                        user_id
                    ));
                }
            }
            warnings.extend(check_overall_progress(&doc));
        }

        for doc in store.list(&self.quizzes)? {
            warnings.extend(check_quiz_percentage(&doc));
        }

        Ok(warnings)
    }
}

/// Compare a progress document's `overallProgress` with the mean of its
/// module completion percentages.
pub fn check_overall_progress(doc: &Document) -> Option<String> {
    let modules = doc.get("modules")?.as_object()?;
    if modules.is_empty() {
        return None;
    }

    let total: f64 = modules
        .values()
        .map(|m| {
            m.as_object()
                .and_then(|m| m.get("completionPercentage"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0)
        })
        .sum();
    let calculated = round_half_up(total / modules.len() as f64);

    let stored = match doc.get("overallProgress") {
        None | Some(Value::Null) => 0.0,
        Some(v) => v.as_f64()?,
    };

    if (calculated - stored).abs() > PROGRESS_TOLERANCE {
        let user = doc
            .get("userId")
            .and_then(Value::as_str)
            .unwrap_or(doc.id.as_str());
        return Some(format!(
            "User {}: Overall progress mismatch (stored: {}, calculated: {})",
            user, stored, calculated
        ));
    }
    None
}

/// Compare a quiz submission's `percentage` with `score / totalQuestions`.
pub fn check_quiz_percentage(doc: &Document) -> Option<String> {
    let score = doc.get("score")?.as_f64()?;
    let total = doc.get("totalQuestions")?.as_f64()?;
    let stored = doc.get("percentage")?.as_f64()?;
    if total == 0.0 {
        return None;
    }

    let calculated = round_half_up(score / total * 100.0);
    if (calculated - stored).abs() > PERCENTAGE_TOLERANCE {
        return Some(format!(
            "Quiz {}: Percentage mismatch (stored: {}, calculated: {})",
            doc.id, stored, calculated
        ));
    }
    None
}

/// Round to the nearest integer, halves towards positive infinity.
fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::value::{fields, Fields};

    fn module(pct: i64) -> Value {
        Value::Object(fields([("completionPercentage", pct)]))
    }

    fn progress_doc(overall: Value) -> Document {
        let modules: Fields = fields([("a", module(40)), ("b", module(60))]);
        Document::new(
            "u1",
            fields([
                ("userId", Value::from("u1")),
                ("modules", Value::Object(modules)),
                ("overallProgress", overall),
            ]),
        )
    }

    #[test]
    fn test_progress_within_tolerance() {
        assert_eq!(check_overall_progress(&progress_doc(Value::from(50))), None);
        assert_eq!(check_overall_progress(&progress_doc(Value::from(54.5))), None);
    }

    #[test]
    fn test_progress_mismatch() {
        let warning = check_overall_progress(&progress_doc(Value::from(90))).unwrap();
        assert_eq!(
            warning,
            "User u1: Overall progress mismatch (stored: 90, calculated: 50)"
        );
    }

    #[test]
    fn test_progress_skips_without_modules() {
        let doc = Document::new(
            "u1",
            fields([
                ("modules", Value::Object(Fields::new())),
                ("overallProgress", Value::from(80)),
            ]),
        );
        assert_eq!(check_overall_progress(&doc), None);

        let doc = Document::new("u2", fields([("overallProgress", 80)]));
        assert_eq!(check_overall_progress(&doc), None);
    }

    #[test]
    fn test_progress_missing_overall_counts_as_zero() {
        let mut doc = progress_doc(Value::Null);
        doc.fields.remove("overallProgress");
        assert!(check_overall_progress(&doc).is_some());
    }

    #[test]
    fn test_quiz_percentage() {
        let ok = Document::new(
            "q1",
            fields([("score", 7), ("totalQuestions", 9), ("percentage", 78)]),
        );
        assert_eq!(check_quiz_percentage(&ok), None);

        let bad = Document::new(
            "q2",
            fields([("score", 7), ("totalQuestions", 10), ("percentage", 90)]),
        );
        assert_eq!(
            check_quiz_percentage(&bad).unwrap(),
            "Quiz q2: Percentage mismatch (stored: 90, calculated: 70)"
        );
    }

    #[test]
    fn test_quiz_skips_zero_questions() {
        let doc = Document::new(
            "q3",
            fields([("score", 0), ("totalQuestions", 0), ("percentage", 0)]),
        );
        assert_eq!(check_quiz_percentage(&doc), None);
    }

    #[test]
    fn test_evaluate_reports_orphan_progress() {
        let store = MemoryStore::new();
        store.insert("users", "u1", fields([("name", "Ann")]));
        store.insert(
            "userProgress",
            "u1",
            fields([("userId", Value::from("u1"))]),
        );
        store.insert(
            "userProgress",
            "ghost",
            fields([("userId", Value::from("ghost"))]),
        );

        let warnings = RuleSet::default().evaluate(&store).unwrap();
        assert_eq!(
            warnings,
            vec!["User progress exists for non-existent user: ghost".to_string()]
        );
    }
}
