//! Demo task implementations exercising every Messenger capability —
//! input, errors, progress bars, cancellation. Grounded on
//! `__main__.py`'s `demo_input`/`demo_errors`/`demo_progress1`/
//! `demo_progress2`/`demo_cancel1`/`demo_cancel2`; `demo/tasks.json`
//! mirrors its `TaskModel` tree (minus `demo_manual`, which is left
//! fully unbound to demonstrate the missing-implementation fallback).

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use chk_runtime::cancellation::sleep_attentively;
use chk_runtime::function_finder::{DependencyProvider, FunctionNamespace};
use chk_runtime::messenger::{Messenger, Parameter, ProblemLevel};
use chk_runtime::task::{TaskError, TaskFn, TaskOutcome};

pub fn register(namespace: &mut FunctionNamespace) {
    namespace.register("demo_input", |provider| with_messenger(provider, demo_input));
    namespace.register("demo_errors", |provider| with_messenger(provider, demo_errors));
    namespace.register("demo_progress1", |provider| {
        with_messenger(provider, |m| demo_progress(&m, "Job 1.1", "Job 1.2", 4.0, 2.0, 6.0, 4.0))
    });
    namespace.register("demo_progress2", |provider| {
        with_messenger(provider, |m| demo_progress(&m, "Job 2.1", "Job 2.2", 8.0, 6.0, 10.0, 8.0))
    });
    namespace.register("demo_cancel1", |provider| with_messenger(provider, demo_cancel));
    namespace.register("demo_cancel2", |provider| with_messenger(provider, demo_cancel));
}

fn with_messenger(
    provider: &DependencyProvider,
    f: impl Fn(Arc<Messenger>) -> TaskOutcome + Send + Sync + 'static,
) -> chk_runtime::RuntimeResult<TaskFn> {
    let messenger = provider.get::<Arc<Messenger>>()?.clone();
    Ok(Box::new(move || f(messenger.clone())))
}

fn demo_input(messenger: Arc<Messenger>) -> TaskOutcome {
    let favourite_number: i64 = messenger.input("Favourite Number", false, "Enter your favourite number.", |raw| {
        raw.parse::<i64>().map_err(|_| "must be a whole number".to_string())
    })?;
    messenger.log_debug(&format!("Your favourite number: {favourite_number}"));

    let params = [
        Parameter::new("Pizza topping")
            .with_description("What is your favourite pizza topping? There is exactly one right answer.")
            .with_parser(|raw| {
                if raw.eq_ignore_ascii_case("pineapple") {
                    Ok(())
                } else {
                    Err("wrong choice (hint: the right choice starts with 'p' and ends with 'ineapple')".to_string())
                }
            }),
        Parameter::new("Password")
            .password()
            .with_description("Make up a password. It must contain at least one digit.")
            .with_parser(|raw| {
                if raw.chars().any(|c| c.is_ascii_digit()) {
                    Ok(())
                } else {
                    Err("at least one digit is required".to_string())
                }
            }),
    ];
    let answers = messenger.input_multiple(&params, "This is what it looks like to take multiple inputs at once.")?;
    messenger.log_debug(&format!("You chose {} on pizza.", answers[0]));

    let likes_pineapple = messenger.input_bool("Was pineapple on pizza the right choice?")?;
    messenger.log_debug(&format!("Pineapple verdict: {likes_pineapple}"));
    Ok(())
}

fn demo_errors(messenger: Arc<Messenger>) -> TaskOutcome {
    messenger.log_problem(ProblemLevel::Warn, "This is what a warning looks like.", None, None);
    messenger.log_problem(
        ProblemLevel::Error,
        "This is what an error looks like. See https://xkcd.com/627/ for a troubleshooting page.",
        None,
        None,
    );
    messenger.log_problem(ProblemLevel::Fatal, "This is what a fatal error looks like.", None, None);
    Err(TaskError::other("This is what happens when a task throws an exception."))
}

fn demo_progress(
    messenger: &Arc<Messenger>,
    label_a: &str,
    label_b: &str,
    step_a_min: f64,
    step_a_max: f64,
    step_b_min: f64,
    step_b_max: f64,
) -> TaskOutcome {
    let job_a_max = 42u64;
    let job_b_max = 100u64;
    let mut job_a_progress = 0f64;
    let mut job_b_progress = 0f64;

    let token = messenger.allow_cancel(None);
    let bar_a = messenger.create_progress_bar(job_a_max);
    let bar_b = messenger.create_progress_bar(job_b_max);
    messenger.log_debug(&format!("Showing progress bars for {label_a} / {label_b}."));

    let result = (|| -> TaskOutcome {
        let mut rng = rand::thread_rng();
        while (job_a_progress as u64) < job_a_max || (job_b_progress as u64) < job_b_max {
            sleep_attentively(Duration::from_millis(200), &token, messenger.poll_frequency())?;
            if (job_a_progress as u64) < job_a_max {
                job_a_progress += rng.gen_range(step_a_min..step_a_max);
                messenger.update_progress_bar(bar_a, job_a_progress as u64);
            }
            if (job_b_progress as u64) < job_b_max {
                job_b_progress += rng.gen_range(step_b_min..step_b_max);
                messenger.update_progress_bar(bar_b, job_b_progress as u64);
            }
        }
        Ok(())
    })();

    messenger.delete_progress_bar(bar_a);
    messenger.delete_progress_bar(bar_b);
    result
}

fn demo_cancel(messenger: Arc<Messenger>) -> TaskOutcome {
    messenger.log_debug("This task runs for a long time and cannot be done manually. Try cancelling it.");
    let token = messenger.allow_cancel(None);
    sleep_attentively(Duration::from_secs(300), &token, messenger.poll_frequency())?;
    Ok(())
}
