//! Spawns one OS thread per compiled [`chk_core::ThreadPlan`] and runs
//! every task to completion, respecting prerequisite-thread ordering
//! (spec.md §4.4). Grounded on `task.py::TaskThread`/`TaskGraph.run`;
//! unlike the ambient CLI/config layer, this is deliberately
//! `std::thread`-based, not `tokio`, per spec.md §5's "each TaskThread
//! is a real OS thread."

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use chk_core::CompiledGraph;

use crate::log_macros::*;
use crate::messenger::{Messenger, ProblemLevel, ROOT_PSEUDOTASK_NAME};
use crate::task::Task;

/// Outcome of a full graph run, used only to choose the process exit
/// code (spec.md §3 RunOutcome) — distinct from any individual task's
/// status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failed,
}

struct PlannedThread {
    name: String,
    tasks: Vec<Task>,
    prerequisite_threads: Vec<usize>,
}

/// One gate per run: threads block on it (with a timeout, so a missed
/// wakeup can't hang forever) until every prerequisite thread has set
/// its `finished` flag.
struct Gate {
    lock: Mutex<()>,
    condvar: Condvar,
    finished: Vec<AtomicBool>,
}

impl Gate {
    fn wait_for(&self, prerequisite_threads: &[usize]) {
        let mut guard = self.lock.lock().unwrap();
        while !prerequisite_threads.iter().all(|&i| self.finished[i].load(Ordering::SeqCst)) {
            guard = self.condvar.wait_timeout(guard, Duration::from_millis(20)).unwrap().0;
        }
    }

    fn mark_finished(&self, index: usize) {
        self.finished[index].store(true, Ordering::SeqCst);
        let _guard = self.lock.lock().unwrap();
        self.condvar.notify_all();
    }
}

/// The compiled, ready-to-run task graph: every [`chk_core::ResolvedLeaf`]
/// paired with its bound (or absent) implementation, grouped into
/// threads exactly as `chk_core::compile` planned.
pub struct TaskGraph {
    messenger: Arc<Messenger>,
    threads: Vec<PlannedThread>,
}

impl TaskGraph {
    /// `tasks_by_name` must contain one [`Task`] for every leaf named in
    /// `compiled`; building it is the Runner's job (it's where
    /// `FunctionFinder::take` gets called once per task).
    pub fn new(compiled: &CompiledGraph, mut tasks_by_name: HashMap<String, Task>, messenger: Arc<Messenger>) -> Self {
        let threads = compiled
            .threads
            .iter()
            .map(|plan| {
                let tasks = plan
                    .task_names
                    .iter()
                    .map(|name| {
                        tasks_by_name
                            .remove(name)
                            .unwrap_or_else(|| panic!("no Task constructed for planned leaf '{name}'"))
                    })
                    .collect();
                PlannedThread {
                    name: plan.name.clone(),
                    tasks,
                    prerequisite_threads: plan.prerequisite_threads.clone(),
                }
            })
            .collect();
        Self { messenger, threads }
    }

    /// Runs every thread to completion. `Failed` iff some task's
    /// implementation panicked (the only "unexpected exception" case
    /// spec.md §4.4 Step 2 describes); an ordinary task error resolved
    /// through the WAITING_FOR_USER prompt is not itself a failure.
    pub fn run(self) -> RunOutcome {
        let messenger = self.messenger;
        let threads = self.threads;
        let thread_count = threads.len();

        let gate = Arc::new(Gate {
            lock: Mutex::new(()),
            condvar: Condvar::new(),
            finished: (0..thread_count).map(|_| AtomicBool::new(false)).collect(),
        });
        let fatal = Arc::new(AtomicBool::new(false));

        let handles: Vec<std::thread::JoinHandle<()>> = threads
            .into_iter()
            .enumerate()
            .map(|(index, thread)| {
                let messenger = messenger.clone();
                let gate = gate.clone();
                let fatal = fatal.clone();
                std::thread::Builder::new()
                    .name(thread.name.clone())
                    .spawn(move || run_thread(thread, index, &messenger, &gate, &fatal))
                    .expect("failed to spawn task thread")
            })
            .collect();

        let mut shutdown_logged = false;
        loop {
            if handles.iter().all(|h| h.is_finished()) {
                break;
            }
            if messenger.shutdown_requested() && !shutdown_logged {
                wf_warn!(sys, "shutdown requested, waiting for in-flight tasks to reach a safe point");
                shutdown_logged = true;
            }
            std::thread::sleep(messenger.poll_frequency());
        }
        for handle in handles {
            let _ = handle.join();
        }

        if fatal.load(Ordering::SeqCst) {
            RunOutcome::Failed
        } else {
            RunOutcome::Success
        }
    }
}

fn run_thread(thread: PlannedThread, index: usize, messenger: &Messenger, gate: &Gate, fatal: &AtomicBool) {
    gate.wait_for(&thread.prerequisite_threads);

    for task in &thread.tasks {
        messenger.set_current_task_name(&task.name);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.run(messenger)));
        if let Err(payload) = result {
            let detail = panic_message(&payload);
            messenger.log_problem(
                ProblemLevel::Fatal,
                &format!("task panicked: {detail}"),
                None,
                Some(&task.name),
            );
            fatal.store(true, Ordering::SeqCst);
        }
    }

    messenger.set_current_task_name(ROOT_PSEUDOTASK_NAME);
    gate.mark_finished(index);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::headless_sink::HeadlessSink;
    use chk_core::TaskModel;
    use std::sync::atomic::AtomicU32;

    fn graph(messenger: Arc<Messenger>, order: Arc<Mutex<Vec<String>>>) -> TaskGraph {
        let model = TaskModel::inner(
            "root",
            vec![
                TaskModel::leaf("a", "do a"),
                TaskModel::leaf("b", "do b").with_prerequisites(["a"]),
                TaskModel::leaf("c", "do c").with_prerequisites(["a"]),
            ],
        );
        let compiled = chk_core::compile(&model, &|s| Ok(s.to_string())).unwrap();

        let mut tasks = HashMap::new();
        for leaf in &compiled.leaves {
            let name = leaf.name.clone();
            let order = order.clone();
            tasks.insert(
                leaf.name.clone(),
                Task::new(leaf.name.clone(), leaf.description.clone(), leaf.index, leaf.only_auto, Some(Box::new(move || {
                    order.lock().unwrap().push(name.clone());
                    Ok(())
                }))),
            );
        }
        TaskGraph::new(&compiled, tasks, messenger)
    }

    #[test]
    fn runs_every_task_and_respects_prerequisites() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(Messenger::new(dir.path().join("c.log"), Arc::new(HeadlessSink::new()), Duration::from_millis(5)).unwrap());
        let order = Arc::new(Mutex::new(Vec::new()));
        let outcome = graph(messenger, order.clone()).run();
        assert_eq!(outcome, RunOutcome::Success);
        let order = order.lock().unwrap();
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], "a");
    }

    #[test]
    fn panicking_task_is_marked_fatal_but_does_not_deadlock_successors() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(Messenger::new(dir.path().join("c.log"), Arc::new(HeadlessSink::new()), Duration::from_millis(5)).unwrap());

        let model = TaskModel::inner(
            "root",
            vec![
                TaskModel::leaf("a", "do a"),
                TaskModel::leaf("b", "do b").with_prerequisites(["a"]),
            ],
        );
        let compiled = chk_core::compile(&model, &|s| Ok(s.to_string())).unwrap();
        let ran_b = Arc::new(AtomicU32::new(0));
        let ran_b_clone = ran_b.clone();
        let mut tasks = HashMap::new();
        tasks.insert(
            "a".to_string(),
            Task::new("a", "do a", 1, false, Some(Box::new(|| panic!("boom")))),
        );
        tasks.insert(
            "b".to_string(),
            Task::new("b", "do b", 2, false, Some(Box::new(move || {
                ran_b_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))),
        );
        let outcome = TaskGraph::new(&compiled, tasks, messenger).run();
        assert_eq!(outcome, RunOutcome::Failed);
        assert_eq!(ran_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn not_implemented_task_blocks_until_answered() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(HeadlessSink::new());
        let messenger = Arc::new(Messenger::new(dir.path().join("c.log"), sink.clone(), Duration::from_millis(5)).unwrap());

        let model = TaskModel::leaf("a", "do a");
        let compiled = chk_core::compile(&model, &|s| Ok(s.to_string())).unwrap();
        let mut tasks = HashMap::new();
        tasks.insert("a".to_string(), Task::new("a", "do a", 1, false, None));

        let graph = TaskGraph::new(&compiled, tasks, messenger);
        let worker = std::thread::spawn(move || graph.run());
        std::thread::sleep(Duration::from_millis(40));
        let items = sink.action_items();
        assert_eq!(items.len(), 1);
        sink.respond_wait(items[0].id, Ok(crate::messenger::Response::Done));
        assert_eq!(worker.join().unwrap(), RunOutcome::Success);
    }

    #[test]
    fn cancelling_a_long_running_task_lets_downstream_proceed_on_skip() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(HeadlessSink::new());
        let messenger = Arc::new(Messenger::new(dir.path().join("c.log"), sink.clone(), Duration::from_millis(5)).unwrap());

        let model = TaskModel::inner(
            "root",
            vec![
                TaskModel::leaf("long", "runs a while"),
                TaskModel::leaf("after", "runs after").with_prerequisites(["long"]),
            ],
        );
        let compiled = chk_core::compile(&model, &|s| Ok(s.to_string())).unwrap();
        let ran_after = Arc::new(AtomicU32::new(0));
        let ran_after_clone = ran_after.clone();

        let mut tasks = HashMap::new();
        tasks.insert(
            "long".to_string(),
            Task::new("long", "runs a while", 1, false, Some(Box::new({
                let messenger = messenger.clone();
                move || {
                    let token = messenger.allow_cancel(Some("long"));
                    crate::cancellation::sleep_attentively(
                        Duration::from_secs(300),
                        &token,
                        Duration::from_millis(5),
                    )?;
                    Ok(())
                }
            }))),
        );
        tasks.insert(
            "after".to_string(),
            Task::new("after", "runs after", 2, false, Some(Box::new(move || {
                ran_after_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))),
        );

        let graph = TaskGraph::new(&compiled, tasks, messenger.clone());
        let worker = std::thread::spawn(move || graph.run());

        std::thread::sleep(Duration::from_millis(30));
        let token = messenger.allow_cancel(Some("long"));
        token.cancel();

        std::thread::sleep(Duration::from_millis(30));
        let items = sink.action_items();
        assert_eq!(items.len(), 1);
        sink.respond_wait(items[0].id, Ok(crate::messenger::Response::Skip));

        assert_eq!(worker.join().unwrap(), RunOutcome::Success);
        assert_eq!(ran_after.load(Ordering::SeqCst), 1);
    }
}
