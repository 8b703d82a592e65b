use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Interactive sink to drive the run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Ui {
    /// Line-oriented terminal sink.
    Console,
    /// Headless, channel-driven sink modeling a desktop widget tree
    /// without a windowing dependency (spec.md §4.5).
    Tk,
}

/// Command-line surface for a checklist run.
#[derive(Debug, Clone, Parser)]
#[command(name = "checklist", about = "Run a checklist of manual and automated tasks")]
pub struct Args {
    /// Path to `checklist.toml`.
    #[arg(short, long, default_value = "checklist.toml")]
    pub config: PathBuf,

    /// Interactive sink to use.
    #[arg(long, value_enum, default_value_t = Ui::Console)]
    pub ui: Ui,

    /// Enable debug-level logging to the console.
    #[arg(short, long)]
    pub verbose: bool,

    /// Compile and validate the task graph but do not run it.
    #[arg(long)]
    pub no_run: bool,

    /// Run only the named task(s) automatically even if they'd normally
    /// prompt; repeatable. Pass `--auto none` (alone) to run nothing
    /// automatically.
    #[arg(long = "auto", value_name = "TASK_NAME")]
    auto_raw: Vec<String>,
}

impl Args {
    /// Names of tasks to run automatically, or `None` if `--auto` was
    /// never given (everything defaults to its own `only_auto` setting).
    /// `--auto none` is normalized to an explicit empty set.
    pub fn auto_tasks(&self) -> Result<Option<BTreeSet<String>>, String> {
        if self.auto_raw.is_empty() {
            return Ok(None);
        }
        if self.auto_raw.iter().any(|n| n == "none") {
            if self.auto_raw.len() > 1 {
                return Err("--auto none must be the only --auto value given".to_string());
            }
            return Ok(Some(BTreeSet::new()));
        }
        Ok(Some(self.auto_raw.iter().cloned().collect()))
    }
}
