use std::sync::Arc;

use crate::messenger::Messenger;
use crate::log_macros::*;

/// Installs a handler for Ctrl-C (SIGINT) and SIGTERM that requests a
/// global shutdown on `messenger` — releasing any task blocked in
/// `input*`/`wait` and telling the scheduler's poll loop to stop
/// waiting patiently (spec.md §8 invariant 7). `ctrlc`'s handler is
/// itself callback-based, so this registers a closure rather than
/// blocking a dedicated thread.
pub fn install_shutdown_signal(messenger: Arc<Messenger>) {
    let result = ctrlc::set_handler(move || {
        wf_info!(sys, "received shutdown signal, initiating graceful shutdown");
        messenger.request_shutdown();
    });
    if let Err(e) = result {
        wf_warn!(sys, error = %e, "failed to install signal handler");
    }
}
