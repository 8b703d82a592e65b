//! Declarative task-model types and compile-time graph analysis.
//!
//! This crate owns everything that can be decided *before* any task
//! runs: parsing/building a [`model::TaskModel`], validating it, and
//! compiling it into a [`graph::CompiledGraph`] of leaves and thread
//! groups. Execution (threads, Messenger, FunctionFinder) lives in
//! `chk-runtime`.

pub mod error;
pub mod graph;
pub mod model;

pub use error::{CoreError, CoreReason, CoreResult};
pub use graph::{CompiledGraph, ResolvedLeaf, ThreadPlan, compile};
pub use model::TaskModel;
