//! Top-level lifecycle handle: load config, compile the task graph,
//! bind functions, run it, and pick a process exit status (spec.md §7).
//! Grounded on `wf-runtime::lifecycle::Reactor`'s bootstrap/run/shutdown
//! shape and `autochecklist/startup.py::Script`'s fatal-on-any-step-
//! failure behavior — every error up to and including graph compilation
//! is terminal; once the graph starts running, only a thread panic
//! (caught by the scheduler) can still fail the run.

mod signal;

pub use signal::install_shutdown_signal;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chk_config::{Args, ChecklistConfig, Ui};
use chk_core::{CoreReason, CoreResult, TaskModel};
use orion_error::{StructError, prelude::*};

use crate::error::{RuntimeError, RuntimeReason, RuntimeResult};
use crate::function_finder::{DependencyProvider, FunctionFinder, FunctionNamespace};
use crate::messenger::console_sink::ConsoleSink;
use crate::messenger::headless_sink::HeadlessSink;
use crate::messenger::{InteractiveSink, Messenger, ProblemLevel, ROOT_PSEUDOTASK_NAME, TaskStatus};
use crate::scheduler::{RunOutcome, TaskGraph};
use crate::task::Task;

/// Owns a loaded [`ChecklistConfig`] and the parsed [`Args`] for one run.
pub struct Runner {
    config: ChecklistConfig,
    args: Args,
}

impl Runner {
    /// Loads `args.config`. Any failure here is pre-run and terminal —
    /// nothing has started yet.
    pub fn bootstrap(args: Args) -> RuntimeResult<Self> {
        let config = ChecklistConfig::load(&args.config).map_err(|e| bootstrap_err(e.to_string()))?;
        Ok(Self { config, args })
    }

    /// Compiles the task graph, binds `namespace` against a
    /// [`DependencyProvider`] seeded with the config, args, and
    /// messenger, and runs it end to end. Returns `Ok(RunOutcome)` for
    /// any outcome that reached the graph; returns `Err` only for a
    /// pre-run bootstrap/compile/binding failure.
    pub fn run(self, namespace: FunctionNamespace) -> RuntimeResult<RunOutcome> {
        let base_dir = self
            .config
            .task_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Path::new(".").to_path_buf());
        let mut logging = self.config.logging.clone();
        if self.args.verbose {
            logging.level = "debug".to_string();
        }
        let _tracing_guard = crate::tracing_init::init_tracing(&logging, &base_dir)
            .map_err(|e| bootstrap_err(format!("failed to initialize logging: {e}")))?;

        let interactive: Arc<dyn InteractiveSink> = match self.args.ui {
            Ui::Console => Arc::new(ConsoleSink::new()),
            Ui::Tk => Arc::new(HeadlessSink::new()),
        };
        let log_path = self.config.task_file.with_extension("log");
        let messenger = Arc::new(
            Messenger::new(&log_path, interactive, self.config.poll_frequency.as_duration())
                .map_err(|e| bootstrap_err(format!("failed to open {}: {e}", log_path.display())))?,
        );

        install_shutdown_signal(messenger.clone());

        let outcome = self.run_inner(namespace, &messenger);
        messenger.close(true);
        outcome
    }

    fn run_inner(&self, namespace: FunctionNamespace, messenger: &Arc<Messenger>) -> RuntimeResult<RunOutcome> {
        let model_text = std::fs::read_to_string(&self.config.task_file)
            .map_err(|e| bootstrap_err(format!("failed to read {}: {e}", self.config.task_file.display())))?;
        let model: TaskModel = serde_json::from_str(&model_text)
            .map_err(|e| bootstrap_err(format!("failed to parse {}: {e}", self.config.task_file.display())))?;

        let config = &self.config;
        let resolve = |text: &str| -> CoreResult<String> {
            config
                .fill_placeholders(text)
                .map_err(|e| StructError::from(CoreReason::Schema).with_detail(e.to_string()))
        };
        let compiled = chk_core::compile(&model, &resolve).map_err(|e| bootstrap_err(e.to_string()))?;

        let index_table: HashMap<String, usize> =
            compiled.leaves.iter().map(|l| (l.name.clone(), l.index)).collect();
        messenger.set_task_index_table(index_table);
        for leaf in &compiled.leaves {
            messenger.log_status(TaskStatus::NotStarted, "-", Some(&leaf.name), true);
        }

        if self.args.no_run {
            return Ok(RunOutcome::Success);
        }

        let mut provider = DependencyProvider::new();
        provider.register(self.config.clone())?;
        provider.register(self.args.clone())?;
        provider.register(messenger.clone())?;

        let task_names = compiled.task_names();
        let mut finder = FunctionFinder::bind(namespace, &provider, &task_names)?;
        let auto_whitelist = self.args.auto_tasks().map_err(bootstrap_err)?;

        let mut tasks = HashMap::with_capacity(compiled.leaves.len());
        for leaf in &compiled.leaves {
            let mut implementation = finder.take(&leaf.name);
            if let Some(whitelist) = &auto_whitelist {
                if !whitelist.contains(&leaf.name) {
                    implementation = None;
                }
            }
            tasks.insert(
                leaf.name.clone(),
                Task::new(leaf.name.clone(), leaf.description.clone(), leaf.index, leaf.only_auto, implementation),
            );
        }

        let outcome = TaskGraph::new(&compiled, tasks, messenger.clone()).run();
        match outcome {
            RunOutcome::Success => {
                messenger.log_status(TaskStatus::Done, "All done!", Some(ROOT_PSEUDOTASK_NAME), false)
            }
            RunOutcome::Failed => messenger.log_problem(
                ProblemLevel::Fatal,
                "one or more tasks failed to complete",
                None,
                Some(ROOT_PSEUDOTASK_NAME),
            ),
        }
        Ok(outcome)
    }
}

fn bootstrap_err(msg: impl Into<String>) -> RuntimeError {
    StructError::from(RuntimeReason::Bootstrap).with_detail(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function_finder::FunctionNamespace;
    use crate::task::TaskFn;
    use clap::Parser;
    use std::io::Write;

    fn write_checklist(dir: &std::path::Path, tasks_json: &str) -> std::path::PathBuf {
        let task_file = dir.join("tasks.json");
        std::fs::write(&task_file, tasks_json).unwrap();
        let config_path = dir.join("checklist.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(f, "task_file = \"tasks.json\"").unwrap();
        writeln!(f, "poll_frequency = \"1s\"").unwrap();
        config_path
    }

    #[test]
    fn verbose_flag_overrides_configured_log_level() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_checklist(dir.path(), r#"{"name": "a", "description": "do a"}"#);
        let args = Args::try_parse_from([
            "checklist",
            "--config",
            config_path.to_str().unwrap(),
            "--no-run",
            "--verbose",
        ])
        .unwrap();
        let runner = Runner::bootstrap(args).unwrap();
        assert_eq!(runner.config.logging.level, "info");
        let outcome = runner.run(FunctionNamespace::new()).unwrap();
        assert_eq!(outcome, RunOutcome::Success);
    }

    #[test]
    fn no_run_compiles_without_executing() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_checklist(dir.path(), r#"{"name": "a", "description": "do a"}"#);
        let args = Args::try_parse_from([
            "checklist",
            "--config",
            config_path.to_str().unwrap(),
            "--no-run",
        ])
        .unwrap();
        let runner = Runner::bootstrap(args).unwrap();
        let outcome = runner.run(FunctionNamespace::new()).unwrap();
        assert_eq!(outcome, RunOutcome::Success);
    }

    #[test]
    fn bound_task_runs_automatically() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_checklist(dir.path(), r#"{"name": "a", "description": "do a"}"#);
        let args = Args::try_parse_from(["checklist", "--config", config_path.to_str().unwrap()]).unwrap();
        let runner = Runner::bootstrap(args).unwrap();

        let mut namespace = FunctionNamespace::new();
        namespace.register("a", |_p| Ok(Box::new(|| Ok(())) as TaskFn));

        let outcome = runner.run(namespace).unwrap();
        assert_eq!(outcome, RunOutcome::Success);
    }

    #[test]
    fn auto_whitelist_forces_manual_fallback_outside_it() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_checklist(dir.path(), r#"{"name": "a", "description": "do a"}"#);
        let args = Args::try_parse_from([
            "checklist",
            "--config",
            config_path.to_str().unwrap(),
            "--auto",
            "none",
        ])
        .unwrap();
        let runner = Runner::bootstrap(args).unwrap();

        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran_clone = ran.clone();
        let mut namespace = FunctionNamespace::new();
        namespace.register("a", move |_p| {
            let ran = ran_clone.clone();
            Ok(Box::new(move || {
                ran.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }) as TaskFn)
        });

        let worker = std::thread::spawn(move || runner.run(namespace));
        std::thread::sleep(std::time::Duration::from_millis(60));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
        // The task is now blocked on a WAITING_FOR_USER prompt nobody
        // will answer; this test only needs to prove automation never
        // fired before the whitelist blocked it, not drive it to a
        // terminal status.
        drop(worker);
    }
}
