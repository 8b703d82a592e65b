use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

/// Failure reasons produced while building or validating a [`crate::model::TaskModel`]
/// and compiling it into a [`crate::graph::TaskGraph`].
///
/// All of these are pre-run, terminal errors per the error-handling design:
/// a schema/cycle/binding error means no task ever runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum CoreReason {
    /// Duplicate names, missing description, inner-node-with-description,
    /// unknown prerequisite, unknown JSON field.
    #[error("schema error")]
    Schema,
    /// The dependency graph contains a cycle.
    #[error("cycle error")]
    Cycle,
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for CoreReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::Schema => 1001,
            Self::Cycle => 1002,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type CoreError = StructError<CoreReason>;
pub type CoreResult<T> = Result<T, CoreError>;
