//! Shared vocabulary between the Messenger façade and its sinks
//! (spec.md §4.5). Grounded on
//! `autochecklist/messenger/input_messenger.py`.

use std::sync::Arc;

use crate::cancellation::Cancelled;

/// Lifecycle state of a task, as seen by a UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    NotStarted,
    Running,
    WaitingForUser,
    Done,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Running => "RUNNING",
            Self::WaitingForUser => "WAITING_FOR_USER",
            Self::Done => "DONE",
            Self::Skipped => "SKIPPED",
        }
    }
}

/// Severity of a problem reported by a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemLevel {
    Warn,
    Error,
    Fatal,
}

impl ProblemLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }
}

/// Validates one field's raw text, returning an error message to show the
/// user if it's rejected (`input_messenger.py::Parameter.parser`). Kept
/// type-erased since `InteractiveSink` is a trait object — the actual
/// parse into a concrete `T` happens one level up, in `Messenger::input`.
pub type Validator = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

fn accept_any(_: &str) -> Result<(), String> {
    Ok(())
}

/// One field of a multi-field input prompt.
#[derive(Clone)]
pub struct Parameter {
    pub display_name: String,
    pub password: bool,
    pub description: Option<String>,
    pub validate: Validator,
}

impl std::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameter")
            .field("display_name", &self.display_name)
            .field("password", &self.password)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl Parameter {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            password: false,
            description: None,
            validate: Arc::new(accept_any),
        }
    }

    pub fn password(mut self) -> Self {
        self.password = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Rejects a submitted value when `validate` returns `Err`, showing its
    /// message and re-prompting just this field
    /// (`console_messenger.py::input_multiple`'s `except ArgumentTypeError`
    /// loop).
    pub fn with_parser(mut self, validate: impl Fn(&str) -> Result<(), String> + Send + Sync + 'static) -> Self {
        self.validate = Arc::new(validate);
        self
    }
}

/// Opaque handle to a progress bar; sinks are free to interpret it
/// however they like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressHandle(pub u64);

/// A manual step's resolution, chosen by the user at a WAITING_FOR_USER
/// prompt (spec.md §4.2). Which variants are actually offered depends
/// on why the task stopped and its `only_auto` flag — see
/// [`crate::task::Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Done,
    Retry,
    Skip,
}

impl Response {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "DONE",
            Self::Retry => "RETRY",
            Self::Skip => "SKIP",
        }
    }
}

/// The interactive half of a Messenger: console, headless, or any other
/// UI that can show status/problems and collect input. All methods that
/// wait on a human return `Err(Cancelled)` if the token allowing
/// cancellation for this task fires first.
pub trait InteractiveSink: Send + Sync {
    fn log_status(&self, index: usize, task_name: &str, status: TaskStatus, message: &str);
    fn log_problem(&self, index: usize, task_name: &str, level: ProblemLevel, message: &str);

    /// Collects every field in `params`, reprompting a field individually
    /// when its `validate` rejects the submitted value
    /// (`tk_messenger.py::input_multiple`'s per-field error loop).
    fn input_multiple(&self, params: &[Parameter], prompt: &str) -> Result<Vec<String>, Cancelled>;

    /// Single-field convenience built on `input_multiple`, mirroring
    /// `console_messenger.py::input`'s delegation to `input_multiple`.
    fn input(&self, display_name: &str, password: bool, prompt: &str, validate: &Validator) -> Result<String, Cancelled> {
        let param = Parameter {
            display_name: display_name.to_string(),
            password,
            description: None,
            validate: validate.clone(),
        };
        let mut values = self.input_multiple(std::slice::from_ref(&param), prompt)?;
        Ok(values.remove(0))
    }

    fn input_bool(&self, prompt: &str) -> Result<bool, Cancelled>;
    /// Blocks until the user picks one of `allowed` for this manual step.
    fn wait(&self, task_name: &str, index: usize, prompt: &str, allowed: &[Response]) -> Result<Response, Cancelled>;

    fn create_progress_bar(&self, task_name: &str, index: usize, total: u64) -> ProgressHandle;
    fn update_progress_bar(&self, handle: ProgressHandle, current: u64);
    fn delete_progress_bar(&self, handle: ProgressHandle);

    /// True once the user has asked to close the whole run (e.g. closed
    /// the window, Ctrl-C at the console prompt).
    fn shutdown_requested(&self) -> bool;

    /// Records that the whole run should stop and unblocks anyone
    /// already waiting in `input`/`wait` where that's possible without
    /// tearing the sink down (contrast with `close`, which additionally
    /// releases the sink's own resources). Called from the process
    /// signal handler, so it must not block.
    fn request_shutdown(&self);

    /// Flush and release any resources; unblocks anyone still waiting in
    /// `input`/`wait`.
    fn close(&self);
}
