use nix::sys::signal::{self, SigHandler, Signal};
use std::sync::Once;
use tracing::warn;

static IGNORE_SIGPIPE: Once = Once::new();

/// Ignore SIGPIPE for the whole process
///
/// Writes to a peer that has gone away then fail with `EPIPE` instead of
/// killing the process. Runs at most once; later calls are no-ops. Binaries
/// built by rustc already start this way, embedders may not.
pub fn ignore_sigpipe() {
    IGNORE_SIGPIPE.call_once(|| {
        // SAFETY: SIG_IGN installs no handler code, so no async-signal-safety
        // requirements apply.
        if let Err(e) = unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigIgn) } {
            warn!("Failed to ignore SIGPIPE: {}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_calls_are_harmless() {
        ignore_sigpipe();
        ignore_sigpipe();
        assert!(IGNORE_SIGPIPE.is_completed());
    }
}
