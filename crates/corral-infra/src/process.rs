//! Child-process liveness and Unix signal plumbing.

use tracing::debug;

/// Probe liveness with a null signal.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    false
}

/// Deliver a signal to a child. SIGUSR1 asks the agent loop to pause,
/// SIGUSR2 to stop; SIGTERM/SIGKILL tear it down.
#[cfg(unix)]
pub fn send_signal(pid: u32, signal: i32) -> bool {
    let ok = unsafe { libc::kill(pid as i32, signal) == 0 };
    debug!(pid, signal, ok, "sent signal to child");
    ok
}

#[cfg(not(unix))]
pub fn send_signal(_pid: u32, _signal: i32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn absurd_pid_is_dead() {
        assert!(!is_process_alive(u32::MAX - 1));
    }
}
