//! Registry of running job processes, used to stop them on interruption.
//!
//! # Process Groups
//!
//! On Unix every job is spawned as the leader of its own process group, so
//! signalling `-pid` reaches the script and everything it started.
//! Elsewhere the registry only tracks processes; workers kill their own
//! child once the grace period ends.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Running job processes, by PID.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    /// PID to workspace name, for logging.
    pids: Mutex<HashMap<u32, String>>,
}

impl ProcessRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly spawned process.
    pub async fn register(&self, pid: u32, workspace: String) {
        let mut pids = self.pids.lock().await;
        debug!(pid, workspace = %workspace, "Registering process");
        pids.insert(pid, workspace);
    }

    /// Forgets a process that has been waited for.
    pub async fn unregister(&self, pid: u32) {
        let mut pids = self.pids.lock().await;
        if let Some(workspace) = pids.remove(&pid) {
            debug!(pid, workspace = %workspace, "Unregistering process");
        }
    }

    /// Number of tracked processes.
    pub async fn count(&self) -> usize {
        self.pids.lock().await.len()
    }

    /// Stops every tracked process.
    ///
    /// 1. SIGTERM to every process group
    /// 2. wait up to `grace` for the leaders to exit
    /// 3. SIGKILL to the groups still alive
    pub async fn terminate_all(&self, grace: Duration) {
        let mut remaining: HashMap<u32, String> = self.pids.lock().await.clone();
        if remaining.is_empty() {
            return;
        }

        info!(count = remaining.len(), "Terminating running jobs");
        for (pid, workspace) in &remaining {
            debug!(pid, workspace = %workspace, "Sending SIGTERM");
            send_term_signal(*pid);
        }

        let deadline = Instant::now() + grace;
        while !remaining.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let tracked = self.pids.lock().await;
            remaining.retain(|pid, _| tracked.contains_key(pid) && is_process_alive(*pid));
        }

        for (pid, workspace) in remaining {
            warn!(pid, workspace = %workspace, "Force killing process after grace period");
            send_kill_signal(pid);
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) with a negative pid signals that process group; the pid
    // comes from a child we spawned as a group leader.
    #[expect(unsafe_code, reason = "Required for POSIX signal handling")]
    unsafe {
        libc::kill(-pid, signal);
    }
}

#[cfg(unix)]
fn send_term_signal(pid: u32) {
    signal_group(pid, libc::SIGTERM);
}

#[cfg(unix)]
fn send_kill_signal(pid: u32) {
    signal_group(pid, libc::SIGKILL);
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 only checks that the process exists.
    #[expect(unsafe_code, reason = "Required for POSIX process existence check")]
    let status = unsafe { libc::kill(pid, 0) };
    status == 0
}

#[cfg(not(unix))]
const fn send_term_signal(_pid: u32) {}

#[cfg(not(unix))]
const fn send_kill_signal(_pid: u32) {}

#[cfg(not(unix))]
const fn is_process_alive(_pid: u32) -> bool {
    true
}
