/// Domain-aware logging macros for the ambient diagnostic stream
/// (distinct from the Messenger's per-task log file — see
/// [`crate::messenger::file_sink`]).
///
/// Each macro injects a `domain` field automatically so callers never need
/// to remember the string literal. The domain value is one of: `sys`
/// (runner lifecycle), `conf` (config/graph-compile loading), `task`
/// (task execution), `ui` (messenger/sink plumbing).
///
/// # Usage
///
/// ```ignore
/// use crate::log_macros::*;
///
/// wf_info!(sys, tasks = graph.leaves.len(), "compiled task graph");
/// wf_warn!(task, name = %task_name, "task raised NotImplementedError");
/// ```
#[doc(hidden)]
macro_rules! wf_log {
    ($level:ident, $domain:ident, $($field:tt)*) => {
        tracing::$level!(domain = stringify!($domain), $($field)*)
    };
}

/// Log at ERROR level with an automatic `domain` field.
macro_rules! wf_error {
    ($domain:ident, $($rest:tt)*) => {
        wf_log!(error, $domain, $($rest)*)
    };
}

/// Log at WARN level with an automatic `domain` field.
macro_rules! wf_warn {
    ($domain:ident, $($rest:tt)*) => {
        wf_log!(warn, $domain, $($rest)*)
    };
}

/// Log at INFO level with an automatic `domain` field.
macro_rules! wf_info {
    ($domain:ident, $($rest:tt)*) => {
        wf_log!(info, $domain, $($rest)*)
    };
}

/// Log at DEBUG level with an automatic `domain` field.
macro_rules! wf_debug {
    ($domain:ident, $($rest:tt)*) => {
        wf_log!(debug, $domain, $($rest)*)
    };
}

/// Log at TRACE level with an automatic `domain` field.
#[allow(unused_macros)]
macro_rules! wf_trace {
    ($domain:ident, $($rest:tt)*) => {
        wf_log!(trace, $domain, $($rest)*)
    };
}
