//! Initial data for fresh environments.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::error::SeedError;
use crate::store::{DocumentStore, WriteOp};
use crate::value::{fields, generate_id, Fields, Timestamp, Value};

/// Deployment environment being seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development: catalog plus sample users.
    Development,
    /// Staging: catalog only.
    Staging,
    /// Production: never seeded.
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = SeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(SeedError::UnknownEnvironment(other.to_string())),
        }
    }
}

/// Outcome of a seeding run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSummary {
    /// Seeded environment.
    pub environment: Environment,
    /// Collections written, in order.
    pub collections: Vec<String>,
    /// Documents written.
    pub total_records: usize,
}

/// Writes the built-in catalog and sample data.
pub struct Seeder<S: DocumentStore> {
    store: Arc<S>,
}

impl<S: DocumentStore> Seeder<S> {
    /// Create a seeder.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Seed `environment`.
    ///
    /// Modules and achievements are written with fixed ids, so seeding twice
    /// overwrites them. Development also gets sample users with generated
    /// ids and an empty progress document per user.
    pub fn seed(&self, environment: Environment) -> Result<SeedSummary, SeedError> {
        if environment == Environment::Production {
            return Err(SeedError::ProductionRefused);
        }
        info!(environment = %environment, "Seeding data");

        let mut summary = SeedSummary {
            environment,
            collections: Vec::new(),
            total_records: 0,
        };
        let now = Timestamp::now();

        let modules = seed_modules();
        self.write("modules", modules, &mut summary)?;

        let achievements = seed_achievements(now);
        self.write("achievements", achievements, &mut summary)?;

        if environment == Environment::Development {
            let users: Vec<(String, Fields)> = sample_users(now)
                .into_iter()
                .map(|user| (generate_id(), user))
                .collect();
            let progress = users
                .iter()
                .map(|(id, _)| (id.clone(), initial_progress(id, now)))
                .collect();
            self.write("users", users, &mut summary)?;
            self.write("userProgress", progress, &mut summary)?;
        }

        info!(
            records = summary.total_records,
            collections = summary.collections.len(),
            "Seeding completed"
        );
        Ok(summary)
    }

    fn write(
        &self,
        collection: &str,
        docs: Vec<(String, Fields)>,
        summary: &mut SeedSummary,
    ) -> Result<(), SeedError> {
        let count = docs.len();
        let ops = docs
            .into_iter()
            .map(|(id, body)| WriteOp::set(id, body))
            .collect();
        self.store.commit(collection, ops)?;
        info!(collection = %collection, documents = count, "Seeded collection");
        summary.collections.push(collection.to_string());
        summary.total_records += count;
        Ok(())
    }
}

fn resource(kind: &str, title: &str, url: &str) -> Value {
    Value::Object(fields([("type", kind), ("title", title), ("url", url)]))
}

fn seed_modules() -> Vec<(String, Fields)> {
    vec![
        (
            "m1".to_string(),
            fields([
                ("id", Value::from("m1")),
                ("title", Value::from("Basketball Fundamentals")),
                (
                    "description",
                    Value::from("Learn the basic skills and rules of basketball"),
                ),
                ("category", Value::from("fundamentals")),
                ("difficulty", Value::from("beginner")),
                ("order", Value::from(1)),
                ("estimatedTime", Value::from(120)),
                ("isActive", Value::from(true)),
                ("prerequisites", Value::List(Vec::new())),
                (
                    "resources",
                    Value::List(vec![
                        resource("video", "Basic Dribbling", "https://example.com/video1"),
                        resource("pdf", "Rules Guide", "https://example.com/rules.pdf"),
                    ]),
                ),
            ]),
        ),
        (
            "m2".to_string(),
            fields([
                ("id", Value::from("m2")),
                ("title", Value::from("Shooting Techniques")),
                (
                    "description",
                    Value::from("Master various shooting techniques and form"),
                ),
                ("category", Value::from("skills")),
                ("difficulty", Value::from("intermediate")),
                ("order", Value::from(2)),
                ("estimatedTime", Value::from(90)),
                ("isActive", Value::from(true)),
                ("prerequisites", Value::List(vec![Value::from("m1")])),
                (
                    "resources",
                    Value::List(vec![
                        resource("video", "Perfect Shooting Form", "https://example.com/video2"),
                        resource("interactive", "Shooting Practice", "https://example.com/practice"),
                    ]),
                ),
            ]),
        ),
    ]
}

fn seed_achievements(now: Timestamp) -> Vec<(String, Fields)> {
    [
        ("first_quiz_completed", "Quiz Rookie", "Completed your first quiz", "education", "quiz", 10),
        ("first_module_completed", "Module Master", "Completed your first module", "education", "module", 25),
        (
            "high_achiever",
            "High Achiever",
            "Maintained 90%+ average across multiple quizzes",
            "performance",
            "star",
            100,
        ),
    ]
    .into_iter()
    .map(|(id, title, description, category, icon, points)| {
        (
            id.to_string(),
            fields([
                ("id", Value::from(id)),
                ("title", Value::from(title)),
                ("description", Value::from(description)),
                ("category", Value::from(category)),
                ("icon", Value::from(icon)),
                ("points", Value::from(points)),
                ("isActive", Value::from(true)),
                ("createdAt", Value::from(now)),
            ]),
        )
    })
    .collect()
}

fn sample_users(now: Timestamp) -> Vec<Fields> {
    let preferences = || {
        Value::Object(fields([
            ("notifications", Value::from(true)),
            ("theme", Value::from("light")),
            ("language", Value::from("en")),
        ]))
    };
    vec![
        fields([
            ("name", Value::from("John Smith")),
            ("email", Value::from("coach.smith@example.com")),
            ("role", Value::from("instructor")),
            (
                "bio",
                Value::from("Experienced basketball coach with 10+ years of experience"),
            ),
            ("isActive", Value::from(true)),
            ("preferences", preferences()),
            ("createdAt", Value::from(now)),
        ]),
        fields([
            ("name", Value::from("Jane Doe")),
            ("email", Value::from("student.jane@example.com")),
            ("role", Value::from("student")),
            ("bio", Value::from("Aspiring basketball coach")),
            ("isActive", Value::from(true)),
            ("preferences", preferences()),
            ("createdAt", Value::from(now)),
        ]),
    ]
}

fn initial_progress(user_id: &str, now: Timestamp) -> Fields {
    fields([
        ("userId", Value::from(user_id)),
        ("modules", Value::Object(Fields::new())),
        ("overallProgress", Value::from(0)),
        ("achievements", Value::List(Vec::new())),
        ("createdAt", Value::from(now)),
        // Declared as a string in the progress schema.
        ("updatedAt", Value::from(now.to_iso_string())),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaSet;
    use crate::store::MemoryStore;
    use crate::validation::IntegrityValidator;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_production_refused() {
        let store = Arc::new(MemoryStore::new());
        let err = Seeder::new(Arc::clone(&store))
            .seed(Environment::Production)
            .unwrap_err();
        assert!(matches!(err, SeedError::ProductionRefused));
        assert!(store.is_empty("modules"));
    }

    #[test]
    fn test_staging_seeds_catalog_only() {
        let store = Arc::new(MemoryStore::new());
        let summary = Seeder::new(Arc::clone(&store)).seed(Environment::Staging).unwrap();
        assert_eq!(summary.collections, vec!["modules", "achievements"]);
        assert_eq!(summary.total_records, 5);
        assert_eq!(store.len("users"), 0);
    }

    #[test]
    fn test_development_seed_is_valid() {
        let store = Arc::new(MemoryStore::new());
        let summary = Seeder::new(Arc::clone(&store))
            .seed(Environment::Development)
            .unwrap();
        assert_eq!(
            summary.collections,
            vec!["modules", "achievements", "users", "userProgress"]
        );
        assert_eq!(summary.total_records, 9);

        for user in store.list("users").unwrap() {
            let progress = store.get("userProgress", &user.id).unwrap().unwrap();
            assert_eq!(progress.get("userId"), Some(&Value::from(user.id.as_str())));
        }

        let report = IntegrityValidator::new(SchemaSet::educational()).validate(store.as_ref());
        assert!(report.is_valid(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_parse_environment() {
        assert_eq!("staging".parse::<Environment>().unwrap(), Environment::Staging);
        assert!(matches!(
            "qa".parse::<Environment>(),
            Err(SeedError::UnknownEnvironment(_))
        ));
    }
}
