//! Execution half of the checklist runner: everything `chk-core` can't
//! decide statically — the Messenger, task state machine, function
//! binding, threaded scheduler, and the top-level `Runner` that wires
//! them together (spec.md §4).

#[macro_use]
mod log_macros;

pub mod cancellation;
pub mod error;
pub mod function_finder;
pub mod lifecycle;
pub mod messenger;
pub mod scheduler;
pub mod task;
pub mod tracing_init;

pub use error::{RuntimeError, RuntimeReason, RuntimeResult};
pub use function_finder::{DependencyProvider, FunctionFinder, FunctionNamespace};
pub use lifecycle::Runner;
pub use scheduler::{RunOutcome, TaskGraph};
pub use task::{Task, TaskError, TaskFn, TaskOutcome};
