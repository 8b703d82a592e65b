//! Thread-safe façade over a file log and an interactive sink
//! (spec.md §4.5). Every `TaskThread` shares one `Messenger`; the
//! façade tracks which task each calling thread is "currently" running
//! so callers don't have to pass a task name into every call. Grounded
//! on `autochecklist/messenger/messenger.py::Messenger` and its
//! `_TaskManager` helper.

pub mod console_sink;
pub mod file_sink;
pub mod headless_sink;
pub mod sink;

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use sink::{InteractiveSink, Parameter, ProblemLevel, ProgressHandle, Response, TaskStatus, Validator};

use crate::cancellation::CancellationToken;
use crate::log_macros::*;

/// Pseudo task name used for anything logged outside of a `TaskThread`
/// (startup, shutdown, top-level errors).
pub const ROOT_PSEUDOTASK_NAME: &str = "SCRIPT MAIN";

thread_local! {
    static CURRENT_TASK_NAME: RefCell<String> = RefCell::new(ROOT_PSEUDOTASK_NAME.to_string());
}

struct TaskManager {
    index_by_task: Mutex<HashMap<String, usize>>,
    cancellation_token_by_task: Mutex<HashMap<String, CancellationToken>>,
}

impl TaskManager {
    fn new() -> Self {
        let mut index_by_task = HashMap::new();
        index_by_task.insert(ROOT_PSEUDOTASK_NAME.to_string(), 0);
        Self {
            index_by_task: Mutex::new(index_by_task),
            cancellation_token_by_task: Mutex::new(HashMap::new()),
        }
    }

    fn set_index_table(&self, table: HashMap<String, usize>) {
        let mut guard = self.index_by_task.lock().unwrap();
        for (name, index) in table {
            guard.insert(name, index);
        }
    }

    fn index_of(&self, task_name: &str) -> usize {
        self.index_by_task
            .lock()
            .unwrap()
            .get(task_name)
            .copied()
            .unwrap_or(0)
    }
}

/// The public logging/input/cancellation façade shared by the runner,
/// every `TaskThread`, and the task functions they call.
pub struct Messenger {
    file: file_sink::FileSink,
    interactive: Arc<dyn InteractiveSink>,
    tasks: TaskManager,
    poll_frequency: Duration,
}

impl Messenger {
    pub fn new(
        log_path: impl AsRef<Path>,
        interactive: Arc<dyn InteractiveSink>,
        poll_frequency: Duration,
    ) -> io::Result<Self> {
        Ok(Self {
            file: file_sink::FileSink::open(log_path)?,
            interactive,
            tasks: TaskManager::new(),
            poll_frequency,
        })
    }

    /// Called by a `TaskThread` before/after running each of its tasks.
    pub fn set_current_task_name(&self, name: &str) {
        CURRENT_TASK_NAME.with(|c| *c.borrow_mut() = name.to_string());
    }

    pub fn current_task_name(&self) -> String {
        CURRENT_TASK_NAME.with(|c| c.borrow().clone())
    }

    /// Seeds the task→display-index table from a compiled graph, so
    /// `log_status`/`log_problem` can show `[3] check_mics: ...` without
    /// every caller threading an index through.
    pub fn set_task_index_table(&self, table: HashMap<String, usize>) {
        self.tasks.set_index_table(table);
    }

    /// Debug-only note, written to the log file and the ambient tracing
    /// stream, never surfaced to the interactive sink.
    pub fn log_debug(&self, message: &str) {
        let task_name = self.current_task_name();
        self.file.log(&task_name, message);
        wf_debug!(task, name = %task_name, "{message}");
    }

    /// Record a status transition. Always written to the file; skipped
    /// on the interactive sink when `file_only` is set (used for
    /// NOT_STARTED's initial batch — spec.md §4.1 Step 8 only needs it
    /// to appear once execution actually begins).
    pub fn log_status(&self, status: TaskStatus, message: &str, task_name: Option<&str>, file_only: bool) {
        let task_name = task_name.map(str::to_string).unwrap_or_else(|| self.current_task_name());
        self.file.log(&task_name, &format!("{} — {message}", status.as_str()));
        if !file_only {
            let index = self.tasks.index_of(&task_name);
            self.interactive.log_status(index, &task_name, status, message);
        }
    }

    pub fn log_problem(&self, level: ProblemLevel, message: &str, stacktrace: Option<&str>, task_name: Option<&str>) {
        let task_name = task_name.map(str::to_string).unwrap_or_else(|| self.current_task_name());
        let full = match stacktrace {
            Some(trace) => format!("{message}\n{trace}"),
            None => message.to_string(),
        };
        self.file.log(&task_name, &format!("{} — {full}", level.as_str()));
        let index = self.tasks.index_of(&task_name);
        self.interactive.log_problem(index, &task_name, level, message);
        match level {
            ProblemLevel::Warn => wf_warn!(task, name = %task_name, "{message}"),
            ProblemLevel::Error | ProblemLevel::Fatal => {
                wf_error!(task, name = %task_name, "{message}")
            }
        }
    }

    /// Collects one field, re-prompting until `parser` accepts the raw text
    /// (`input_messenger.py::InputMessenger.input`'s `parser` argument).
    /// `parser` both validates and converts; it's called once inside the
    /// sink's reprompt loop to decide whether to accept a value, then once
    /// more here to produce `T` from the text the sink already accepted.
    pub fn input<T>(
        &self,
        display_name: &str,
        password: bool,
        prompt: &str,
        parser: impl Fn(&str) -> Result<T, String> + Send + Sync + 'static,
    ) -> Result<T, crate::cancellation::Cancelled> {
        let parser = Arc::new(parser);
        let validate: Validator = {
            let parser = parser.clone();
            Arc::new(move |raw: &str| parser(raw).map(|_| ()))
        };
        let raw = self.interactive.input(display_name, password, prompt, &validate)?;
        Ok(parser(&raw).unwrap_or_else(|_| panic!("sink accepted '{raw}' that its own validator had just rejected")))
    }

    pub fn input_multiple(&self, params: &[Parameter], prompt: &str) -> Result<Vec<String>, crate::cancellation::Cancelled> {
        self.interactive.input_multiple(params, prompt)
    }

    pub fn input_bool(&self, prompt: &str) -> Result<bool, crate::cancellation::Cancelled> {
        self.interactive.input_bool(prompt)
    }

    /// Block the current task until the user picks one of `allowed`.
    pub fn wait(&self, prompt: &str, allowed: &[Response]) -> Result<Response, crate::cancellation::Cancelled> {
        let task_name = self.current_task_name();
        let index = self.tasks.index_of(&task_name);
        self.interactive.wait(&task_name, index, prompt, allowed)
    }

    /// Returns a token the current task can poll to notice a
    /// user-requested cancellation. Reuses the existing token for this
    /// task if `allow_cancel` was already called, matching the
    /// original's "don't double-register the Cancel command" behavior.
    pub fn allow_cancel(&self, task_name: Option<&str>) -> CancellationToken {
        let task_name = task_name.map(str::to_string).unwrap_or_else(|| self.current_task_name());
        let mut guard = self.tasks.cancellation_token_by_task.lock().unwrap();
        guard
            .entry(task_name)
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    pub fn disallow_cancel(&self, task_name: Option<&str>) {
        let task_name = task_name.map(str::to_string).unwrap_or_else(|| self.current_task_name());
        self.tasks.cancellation_token_by_task.lock().unwrap().remove(&task_name);
    }

    pub fn create_progress_bar(&self, total: u64) -> ProgressHandle {
        let task_name = self.current_task_name();
        let index = self.tasks.index_of(&task_name);
        self.interactive.create_progress_bar(&task_name, index, total)
    }

    pub fn update_progress_bar(&self, handle: ProgressHandle, current: u64) {
        self.interactive.update_progress_bar(handle, current);
    }

    pub fn delete_progress_bar(&self, handle: ProgressHandle) {
        self.interactive.delete_progress_bar(handle);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.interactive.shutdown_requested()
    }

    /// Called from the process signal handler: marks the run as
    /// shutting down and releases anyone already blocked in `input*`/
    /// `wait` (spec.md §8 invariant 7).
    pub fn request_shutdown(&self) {
        self.interactive.request_shutdown();
    }

    pub fn poll_frequency(&self) -> Duration {
        self.poll_frequency
    }

    /// No-op in this port: both sinks pump their own queue on a
    /// dedicated worker thread started at construction, so there is no
    /// two-phase startup to wait on the way the original's
    /// `ConsoleMessenger`/`TkMessenger` had.
    pub fn wait_for_start(&self) {}

    /// Blocks the calling thread until the interactive sink is closed.
    /// Kept for parity with the original's explicit main-thread event
    /// loop; the Runner doesn't call this on its own critical path
    /// since `TaskGraph::run()` already blocks the calling thread until
    /// every task settles, and the sinks here never need a thread
    /// pumping their queue beyond the one spawned in `ConsoleSink::new`.
    pub fn run_main_loop(&self) {
        while !self.interactive.shutdown_requested() {
            std::thread::sleep(self.poll_frequency);
        }
    }

    /// Flush the log file and release the interactive sink. Blocking on
    /// the interactive close matches the original's `close(wait=True)`
    /// default; pass `wait=false` to request shutdown without joining
    /// it (used on the panic/FATAL path where the sink may itself be
    /// stuck waiting on a human).
    pub fn close(&self, wait: bool) {
        self.file.flush();
        if wait {
            self.interactive.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::headless_sink::HeadlessSink;

    fn messenger() -> (Messenger, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checklist.log");
        let messenger = Messenger::new(
            &path,
            Arc::new(HeadlessSink::new()),
            Duration::from_millis(10),
        )
        .unwrap();
        (messenger, dir)
    }

    #[test]
    fn current_task_defaults_to_root_pseudotask() {
        let (messenger, _dir) = messenger();
        assert_eq!(messenger.current_task_name(), ROOT_PSEUDOTASK_NAME);
    }

    #[test]
    fn set_current_task_name_is_thread_local() {
        let (messenger, _dir) = messenger();
        messenger.set_current_task_name("check_mics");
        assert_eq!(messenger.current_task_name(), "check_mics");
    }

    #[test]
    fn request_shutdown_unblocks_a_pending_wait() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(
            Messenger::new(dir.path().join("c.log"), Arc::new(HeadlessSink::new()), Duration::from_millis(5)).unwrap(),
        );
        let worker = {
            let messenger = messenger.clone();
            std::thread::spawn(move || messenger.wait("proceed?", &[Response::Done, Response::Skip]))
        };
        std::thread::sleep(Duration::from_millis(20));
        messenger.request_shutdown();
        assert!(worker.join().unwrap().is_err());
        assert!(messenger.shutdown_requested());
    }

    #[test]
    fn allow_cancel_reuses_token_for_same_task() {
        let (messenger, _dir) = messenger();
        messenger.set_current_task_name("check_mics");
        let a = messenger.allow_cancel(None);
        let b = messenger.allow_cancel(None);
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn disallow_cancel_drops_the_token() {
        let (messenger, _dir) = messenger();
        messenger.set_current_task_name("check_mics");
        let first = messenger.allow_cancel(None);
        messenger.disallow_cancel(None);
        let second = messenger.allow_cancel(None);
        first.cancel();
        assert!(!second.is_cancelled());
    }

    #[test]
    fn log_status_writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checklist.log");
        let messenger = Messenger::new(
            &path,
            Arc::new(HeadlessSink::new()),
            Duration::from_millis(10),
        )
        .unwrap();
        messenger.log_status(TaskStatus::Running, "starting up", Some("check_mics"), false);
        messenger.close(false);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("check_mics"));
        assert!(content.contains("RUNNING"));
    }

    #[test]
    fn run_main_loop_returns_once_shutdown_is_requested() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checklist.log");
        let sink = Arc::new(HeadlessSink::new());
        let messenger = Arc::new(
            Messenger::new(&path, sink.clone(), Duration::from_millis(5)).unwrap(),
        );
        messenger.wait_for_start();
        let loop_handle = {
            let messenger = messenger.clone();
            std::thread::spawn(move || messenger.run_main_loop())
        };
        std::thread::sleep(Duration::from_millis(20));
        sink.request_shutdown();
        loop_handle.join().unwrap();
    }
}
