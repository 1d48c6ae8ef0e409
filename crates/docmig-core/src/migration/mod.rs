//! Versioned schema migrations.
//!
//! A [`MigrationStep`] is registered in a [`MigrationRegistry`] under the
//! [`VersionPair`] it implements. The [`MigrationRunner`] applies one step to
//! the store in batches, stamping every rewritten document with the target
//! version so that re-running the step is a no-op.

mod error;
mod registry;
mod runner;
mod step;

pub use error::{MigrationError, StepError};
pub use registry::{MigrationRegistry, VersionPair};
pub use runner::{MigrationResult, MigrationRunner, MARKER_FIELD, MIGRATED_AT_FIELD};
pub use step::{
    analytics_step, performance_category, quiz_difficulty, AddFieldStep, DeriveFieldsStep,
    MigrationStep,
};
