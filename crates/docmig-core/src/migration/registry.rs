//! Version pairs and the step registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::error::MigrationError;
use super::step::{analytics_step, AddFieldStep, MigrationStep};
use crate::value::Value;

/// A schema version transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionPair {
    /// Source version.
    pub from: u32,
    /// Target version.
    pub to: u32,
}

impl VersionPair {
    /// Create a pair.
    pub fn new(from: u32, to: u32) -> Self {
        Self { from, to }
    }

    /// Parse a pair from two version strings, each `N` or `vN`.
    pub fn parse(from: &str, to: &str) -> Result<Self, MigrationError> {
        Ok(Self {
            from: parse_version(from)?,
            to: parse_version(to)?,
        })
    }

    /// Registry key, `v{from}_to_v{to}`.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Marker value written on migrated documents, `v{to}`.
    pub fn marker(&self) -> String {
        format!("v{}", self.to)
    }
}

impl fmt::Display for VersionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}_to_v{}", self.from, self.to)
    }
}

fn parse_version(raw: &str) -> Result<u32, MigrationError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    digits
        .parse()
        .map_err(|_| MigrationError::InvalidVersion(raw.to_string()))
}

/// Explicit map from version pair to migration step.
#[derive(Clone, Default)]
pub struct MigrationRegistry {
    steps: BTreeMap<VersionPair, Arc<dyn MigrationStep>>,
}

impl MigrationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The steps shipped with the engine:
    ///
    /// * `v1_to_v2` adds an empty `achievements` list to user progress.
    /// * `v2_to_v3` derives an `analytics` object on quiz submissions.
    pub fn builtin() -> Self {
        Self::new()
            .with_step(
                VersionPair::new(1, 2),
                AddFieldStep::new("userProgress", "achievements", Value::List(Vec::new()))
                    .with_description("Migrating user progress to include achievements"),
            )
            .with_step(VersionPair::new(2, 3), analytics_step("quizSubmissions"))
    }

    /// Register a step, replacing any step already registered for `pair`.
    pub fn with_step<M: MigrationStep + 'static>(mut self, pair: VersionPair, step: M) -> Self {
        self.register(pair, Arc::new(step));
        self
    }

    /// Register a shared step, replacing any step already registered for `pair`.
    pub fn register(&mut self, pair: VersionPair, step: Arc<dyn MigrationStep>) {
        self.steps.insert(pair, step);
    }

    /// Look up the step for a pair.
    pub fn get(&self, pair: VersionPair) -> Option<Arc<dyn MigrationStep>> {
        self.steps.get(&pair).cloned()
    }

    /// Look up the step for a pair, failing with
    /// [`MigrationError::UnknownStrategy`].
    pub fn resolve(&self, pair: VersionPair) -> Result<Arc<dyn MigrationStep>, MigrationError> {
        self.get(pair)
            .ok_or_else(|| MigrationError::UnknownStrategy(pair.key()))
    }

    /// Registered pairs in ascending order.
    pub fn pairs(&self) -> impl Iterator<Item = VersionPair> + '_ {
        self.steps.keys().copied()
    }
}

impl fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.steps.iter().map(|(pair, step)| (pair.key(), step.description().to_string())))
            .finish()
    }
}
