//! Headless stand-in for a desktop widget tree: the same three-section
//! contract a native GUI would show (action items waiting on a human,
//! problems reported so far, per-thread task statuses) but driven over
//! in-process channels instead of a windowing toolkit. Grounded on
//! `autochecklist/messenger/messenger.py`'s `TkMessenger` three-section
//! layout (description / Action Items / Thread Statuses) — a native
//! GUI toolkit is out of scope (spec.md Non-goals), this models the
//! same contract so a real GUI could be dropped in behind it later.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::cancellation::Cancelled;
use crate::messenger::sink::{InteractiveSink, Parameter, ProblemLevel, ProgressHandle, Response, TaskStatus};

/// A pending human-input request, as surfaced to whatever is standing in
/// for the widget tree (a test harness, a future real GUI).
#[derive(Debug, Clone)]
pub struct ActionItem {
    pub id: u64,
    pub prompt: String,
    pub fields: Vec<Parameter>,
    pub kind: ActionKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Multiple,
    Bool,
    Wait { allowed: Vec<Response> },
}

#[derive(Debug, Clone)]
pub struct ThreadStatus {
    pub index: usize,
    pub status: TaskStatus,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Problem {
    pub index: usize,
    pub task_name: String,
    pub level: ProblemLevel,
    pub message: String,
}

enum Answer {
    Multiple(Result<Vec<String>, Cancelled>),
    Bool(Result<bool, Cancelled>),
    Wait(Result<Response, Cancelled>),
}

struct Pending {
    answer: Mutex<Option<Answer>>,
    ready: Condvar,
}

pub struct HeadlessSink {
    statuses: Mutex<HashMap<String, ThreadStatus>>,
    problems: Mutex<Vec<Problem>>,
    action_items: Mutex<HashMap<u64, ActionItem>>,
    pending: Mutex<HashMap<u64, Arc<Pending>>>,
    next_id: AtomicU64,
    next_handle: AtomicU64,
    shutdown_requested: AtomicBool,
}

impl HeadlessSink {
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(HashMap::new()),
            problems: Mutex::new(Vec::new()),
            action_items: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            next_handle: AtomicU64::new(1),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    pub fn thread_statuses(&self) -> Vec<ThreadStatus> {
        self.statuses.lock().unwrap().values().cloned().collect()
    }

    pub fn problems(&self) -> Vec<Problem> {
        self.problems.lock().unwrap().clone()
    }

    pub fn action_items(&self) -> Vec<ActionItem> {
        self.action_items.lock().unwrap().values().cloned().collect()
    }

    /// Answer pending action item `id` with a text value. No-op if `id`
    /// is unknown or already answered.
    pub fn respond_multiple(&self, id: u64, value: Result<Vec<String>, Cancelled>) {
        self.answer(id, Answer::Multiple(value));
    }

    pub fn respond_bool(&self, id: u64, value: Result<bool, Cancelled>) {
        self.answer(id, Answer::Bool(value));
    }

    pub fn respond_wait(&self, id: u64, value: Result<Response, Cancelled>) {
        self.answer(id, Answer::Wait(value));
    }

    /// Closes the run as if the user closed the window: every pending
    /// action item is cancelled/unblocked.
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        let pending: Vec<Arc<Pending>> = self.pending.lock().unwrap().values().cloned().collect();
        for p in pending {
            let mut slot = p.answer.lock().unwrap();
            if slot.is_none() {
                *slot = Some(Answer::Multiple(Err(Cancelled)));
            }
            p.ready.notify_all();
        }
    }

    fn answer(&self, id: u64, value: Answer) {
        self.action_items.lock().unwrap().remove(&id);
        let pending = self.pending.lock().unwrap().get(&id).cloned();
        if let Some(p) = pending {
            let mut slot = p.answer.lock().unwrap();
            *slot = Some(value);
            p.ready.notify_all();
        }
    }

    fn register(&self, item: ActionItem) -> (u64, Arc<Pending>) {
        let id = item.id;
        let pending = Arc::new(Pending {
            answer: Mutex::new(None),
            ready: Condvar::new(),
        });
        self.action_items.lock().unwrap().insert(id, item);
        self.pending.lock().unwrap().insert(id, pending.clone());
        (id, pending)
    }

    fn wait_for_answer(&self, id: u64, pending: Arc<Pending>) -> Answer {
        let mut slot = pending.answer.lock().unwrap();
        while slot.is_none() {
            slot = pending.ready.wait(slot).unwrap();
        }
        self.pending.lock().unwrap().remove(&id);
        slot.take().unwrap()
    }
}

impl Default for HeadlessSink {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractiveSink for HeadlessSink {
    fn log_status(&self, index: usize, task_name: &str, status: TaskStatus, message: &str) {
        self.statuses.lock().unwrap().insert(
            task_name.to_string(),
            ThreadStatus {
                index,
                status,
                message: message.to_string(),
            },
        );
    }

    fn log_problem(&self, index: usize, task_name: &str, level: ProblemLevel, message: &str) {
        self.problems.lock().unwrap().push(Problem {
            index,
            task_name: task_name.to_string(),
            level,
            message: message.to_string(),
        });
    }

    /// Loops the way `tk_messenger.py::input_multiple` does: a submission
    /// with any field that fails `validate` never resolves the call — it's
    /// logged and a fresh action item is raised for the same fields so the
    /// caller can resubmit, instead of returning the invalid value.
    fn input_multiple(&self, params: &[Parameter], prompt: &str) -> Result<Vec<String>, Cancelled> {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let (id, pending) = self.register(ActionItem {
                id,
                prompt: prompt.to_string(),
                fields: params.to_vec(),
                kind: ActionKind::Multiple,
            });
            let values = match self.wait_for_answer(id, pending) {
                Answer::Multiple(r) => r?,
                _ => return Err(Cancelled),
            };
            if values.len() != params.len() {
                return Err(Cancelled);
            }
            let invalid: Vec<String> = params
                .iter()
                .zip(values.iter())
                .filter_map(|(param, value)| {
                    (param.validate)(value).err().map(|message| format!("{}: {message}", param.display_name))
                })
                .collect();
            if invalid.is_empty() {
                return Ok(values);
            }
            self.log_problem(0, "input", ProblemLevel::Warn, &format!("invalid input, please resubmit — {}", invalid.join("; ")));
        }
    }

    fn input_bool(&self, prompt: &str) -> Result<bool, Cancelled> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (id, pending) = self.register(ActionItem {
            id,
            prompt: prompt.to_string(),
            fields: Vec::new(),
            kind: ActionKind::Bool,
        });
        match self.wait_for_answer(id, pending) {
            Answer::Bool(r) => r,
            _ => Err(Cancelled),
        }
    }

    fn wait(&self, task_name: &str, index: usize, prompt: &str, allowed: &[Response]) -> Result<Response, Cancelled> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (id, pending) = self.register(ActionItem {
            id,
            prompt: format!("[{task_name}] {prompt}"),
            fields: Vec::new(),
            kind: ActionKind::Wait { allowed: allowed.to_vec() },
        });
        let _ = index;
        match self.wait_for_answer(id, pending) {
            Answer::Wait(r) => r,
            _ => Err(Cancelled),
        }
    }

    fn create_progress_bar(&self, task_name: &str, index: usize, total: u64) -> ProgressHandle {
        let handle = ProgressHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.log_status(index, task_name, TaskStatus::Running, &format!("0/{total}"));
        handle
    }

    fn update_progress_bar(&self, _handle: ProgressHandle, _current: u64) {}

    fn delete_progress_bar(&self, _handle: ProgressHandle) {}

    fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    fn request_shutdown(&self) {
        HeadlessSink::request_shutdown(self);
    }

    fn close(&self) {
        self.request_shutdown();
    }
}
