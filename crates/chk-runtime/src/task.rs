//! One leaf task's state machine (spec.md §4.2). A [`Task`] owns at
//! most one bound implementation; [`Task::run`] walks NOT_STARTED →
//! RUNNING → a terminal status, falling back to the Messenger's
//! interactive sink whenever automation is absent, signals "not
//! implemented", or errors. Grounded on `task.py::Task.run`.

use crate::cancellation::Cancelled;
use crate::messenger::{Messenger, ProblemLevel, Response, TaskStatus};

/// What a task implementation can signal back to the runtime. Distinct
/// from [`crate::error::RuntimeError`]: these are recovered locally via
/// a WAITING_FOR_USER prompt, never propagated as a fatal error.
pub enum TaskError {
    /// Automation exists in principle but isn't wired up for this
    /// environment. Same manual fallback as a missing implementation —
    /// DONE or SKIP, never RETRY.
    NotImplemented,
    /// The task's own cancellation token tripped mid-run.
    Cancelled,
    /// Any other failure. `stacktrace`, if present, is written to the
    /// file sink only (spec.md §4.2).
    Other {
        message: String,
        stacktrace: Option<String>,
    },
}

impl TaskError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            stacktrace: None,
        }
    }

    pub fn with_stacktrace(message: impl Into<String>, stacktrace: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            stacktrace: Some(stacktrace.into()),
        }
    }
}

impl From<Cancelled> for TaskError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

pub type TaskOutcome = Result<(), TaskError>;

/// A bound, zero-argument task implementation (see
/// [`crate::function_finder`]).
pub type TaskFn = Box<dyn Fn() -> TaskOutcome + Send + Sync>;

/// Runtime state for one leaf task, constructed once per compiled graph
/// entry (spec.md §3 Task).
pub struct Task {
    pub name: String,
    pub description: String,
    pub index: usize,
    pub only_auto: bool,
    implementation: Option<TaskFn>,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        index: usize,
        only_auto: bool,
        implementation: Option<TaskFn>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            index,
            only_auto,
            implementation,
        }
    }

    /// Runs this task to a terminal status. Never panics on behalf of
    /// the implementation — a panicking `TaskFn` is caught by the
    /// caller (`TaskThread`), not here, so the scheduler can still mark
    /// the task DONE and continue (spec.md §4.4 Step 2).
    pub fn run(&self, messenger: &Messenger) -> TaskStatus {
        messenger.log_status(TaskStatus::Running, "Task started.", Some(&self.name), false);

        let outcome = self.invoke();
        let (status, message) = self.settle(messenger, outcome);

        messenger.log_status(status, &message, Some(&self.name), false);
        status
    }

    fn invoke(&self) -> TaskOutcome {
        match &self.implementation {
            Some(f) => f(),
            None => Err(TaskError::NotImplemented),
        }
    }

    fn settle(&self, messenger: &Messenger, outcome: TaskOutcome) -> (TaskStatus, String) {
        match outcome {
            Ok(()) => (TaskStatus::Done, "Task completed automatically.".to_string()),
            Err(TaskError::NotImplemented) => {
                self.prompt(messenger, "This task is not automated.", &[Response::Done, Response::Skip])
            }
            Err(TaskError::Cancelled) => {
                self.prompt(messenger, "This task was cancelled.", &self.allowed_after_failure())
            }
            Err(TaskError::Other { message, stacktrace }) => {
                messenger.log_problem(ProblemLevel::Error, &message, stacktrace.as_deref(), Some(&self.name));
                self.prompt(messenger, &message, &self.allowed_after_failure())
            }
        }
    }

    fn allowed_after_failure(&self) -> Vec<Response> {
        if self.only_auto {
            vec![Response::Retry, Response::Skip]
        } else {
            vec![Response::Done, Response::Retry, Response::Skip]
        }
    }

    /// Blocks on the Messenger until the user picks a terminal status,
    /// re-running the implementation (and re-prompting on renewed
    /// failure) every time RETRY is chosen.
    fn prompt(&self, messenger: &Messenger, message: &str, allowed: &[Response]) -> (TaskStatus, String) {
        let prompt = format!("{message} {}", self.description);
        let mut response = messenger.wait(&prompt, allowed).unwrap_or(Response::Skip);

        loop {
            match response {
                Response::Done => return (TaskStatus::Done, "Task completed manually.".to_string()),
                Response::Skip => return (TaskStatus::Skipped, "Task skipped.".to_string()),
                Response::Retry => match self.invoke() {
                    Ok(()) => return (TaskStatus::Done, "Task completed automatically.".to_string()),
                    Err(TaskError::Other { message, stacktrace }) => {
                        messenger.log_problem(ProblemLevel::Error, &message, stacktrace.as_deref(), Some(&self.name));
                        response = messenger
                            .wait(&format!("{message} {}", self.description), &self.allowed_after_failure())
                            .unwrap_or(Response::Skip);
                    }
                    Err(TaskError::Cancelled) => {
                        response = messenger
                            .wait("This task was cancelled.", &self.allowed_after_failure())
                            .unwrap_or(Response::Skip);
                    }
                    Err(TaskError::NotImplemented) => unreachable!("RETRY is only offered when an implementation exists"),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::headless_sink::HeadlessSink;
    use std::sync::Arc;
    use std::time::Duration;

    fn messenger() -> (Arc<Messenger>, Arc<HeadlessSink>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(HeadlessSink::new());
        let messenger = Arc::new(
            Messenger::new(dir.path().join("c.log"), sink.clone(), Duration::from_millis(5)).unwrap(),
        );
        (messenger, sink, dir)
    }

    #[test]
    fn successful_automation_is_done_without_prompting() {
        let (messenger, _sink, _dir) = messenger();
        let task = Task::new("a", "do a", 1, false, Some(Box::new(|| Ok(()))));
        assert_eq!(task.run(&messenger), TaskStatus::Done);
    }

    #[test]
    fn missing_implementation_prompts_done_or_skip() {
        let (messenger, sink, _dir) = messenger();
        let task = Arc::new(Task::new("a", "do a", 1, false, None));
        let worker = {
            let messenger = messenger.clone();
            let task = task.clone();
            std::thread::spawn(move || task.run(&messenger))
        };
        std::thread::sleep(Duration::from_millis(30));
        let items = sink.action_items();
        assert_eq!(items.len(), 1);
        sink.respond_wait(items[0].id, Ok(Response::Done));
        assert_eq!(worker.join().unwrap(), TaskStatus::Done);
    }

    #[test]
    fn only_auto_failure_never_offers_done() {
        let (messenger, sink, _dir) = messenger();
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let task = Arc::new(Task::new(
            "a",
            "do a",
            1,
            true,
            Some(Box::new(move || {
                attempts_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(TaskError::other("boom"))
            })),
        ));
        let worker = {
            let messenger = messenger.clone();
            let task = task.clone();
            std::thread::spawn(move || task.run(&messenger))
        };
        std::thread::sleep(Duration::from_millis(30));
        let items = sink.action_items();
        assert_eq!(items.len(), 1);
        match &items[0].kind {
            crate::messenger::headless_sink::ActionKind::Wait { allowed } => {
                assert!(!allowed.contains(&Response::Done));
            }
            _ => panic!("expected a wait action item"),
        }
        sink.respond_wait(items[0].id, Ok(Response::Skip));
        assert_eq!(worker.join().unwrap(), TaskStatus::Skipped);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_reruns_the_implementation() {
        let (messenger, sink, _dir) = messenger();
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let task = Arc::new(Task::new(
            "a",
            "do a",
            1,
            false,
            Some(Box::new(move || {
                if attempts_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                    Err(TaskError::other("first attempt fails"))
                } else {
                    Ok(())
                }
            })),
        ));
        let worker = {
            let messenger = messenger.clone();
            let task = task.clone();
            std::thread::spawn(move || task.run(&messenger))
        };
        std::thread::sleep(Duration::from_millis(30));
        let items = sink.action_items();
        assert_eq!(items.len(), 1);
        sink.respond_wait(items[0].id, Ok(Response::Retry));
        assert_eq!(worker.join().unwrap(), TaskStatus::Done);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
