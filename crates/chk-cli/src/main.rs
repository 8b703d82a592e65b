use std::process::ExitCode;

use chk_config::Args;
use chk_runtime::function_finder::FunctionNamespace;
use chk_runtime::scheduler::RunOutcome;
use chk_runtime::{Runner, RuntimeError};
use clap::Parser;
use orion_error::ErrorCode;

mod demo;

fn main() -> ExitCode {
    let args = Args::parse();

    let runner = match Runner::bootstrap(args) {
        Ok(runner) => runner,
        Err(e) => return report(e),
    };

    let mut namespace = FunctionNamespace::new();
    demo::register(&mut namespace);

    match runner.run(namespace) {
        Ok(RunOutcome::Success) => ExitCode::SUCCESS,
        Ok(RunOutcome::Failed) => ExitCode::from(1),
        Err(e) => report(e),
    }
}

fn report(err: RuntimeError) -> ExitCode {
    let code = err.error_code();
    tracing::error!(domain = "sys", code, "{err}");
    eprintln!("checklist failed: {err}");
    ExitCode::from(code.clamp(1, 255) as u8)
}
