use chk_core::CoreReason;
use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

/// Failure reasons produced while loading config, binding task functions,
/// or running the compiled task graph.
///
/// Per the error-handling design (spec.md §7), every one of these except
/// a mid-run thread panic is a pre-run, terminal error: nothing ever
/// starts. A mid-run panic is caught at the `Task` level and turned into
/// a WAITING_FOR_USER prompt instead, so it never reaches here.
#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum RuntimeReason {
    /// Config file missing, malformed, or failed validation.
    #[error("bootstrap error")]
    Bootstrap,
    /// A `TaskThread` panicked or could not be joined.
    #[error("shutdown error")]
    Shutdown,
    /// `FunctionFinder` found zero or more than one candidate for a
    /// task's function, or for one of its dependency-injected arguments.
    #[error("function binding error")]
    FunctionBinding,
    #[error("{0}")]
    Core(CoreReason),
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for RuntimeReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::Bootstrap => 2001,
            Self::Shutdown => 2002,
            Self::FunctionBinding => 2003,
            Self::Core(c) => c.error_code(),
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type RuntimeError = StructError<RuntimeReason>;
pub type RuntimeResult<T> = Result<T, RuntimeError>;
