// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Signalling of registered processes at broker shutdown.

use std::io;

/// Delivers termination signals to processes.
pub trait ProcessSignaler: Send + Sync {
    /// Ask the process to terminate (SIGTERM).
    fn terminate(&self, pid: u32) -> bool;

    /// Terminate the process forcibly (SIGKILL).
    fn kill(&self, pid: u32) -> bool;

    fn is_alive(&self, pid: u32) -> bool;
}

/// `kill(2)` based signaler.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixSignaler;

impl PosixSignaler {
    fn signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
        let pid = libc::pid_t::try_from(pid)
            .ok()
            .filter(|pid| *pid > 0)
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;

        // SAFETY:
        // - kill has no memory-safety preconditions
        // - pid is strictly positive, so the signal targets exactly one process
        //   and never a process group
        let ret = unsafe { libc::kill(pid, signal) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl ProcessSignaler for PosixSignaler {
    fn terminate(&self, pid: u32) -> bool {
        match Self::signal(pid, libc::SIGTERM) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[ProcessManager] SIGTERM to pid {} failed: {}", pid, e);
                false
            }
        }
    }

    fn kill(&self, pid: u32) -> bool {
        match Self::signal(pid, libc::SIGKILL) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[ProcessManager] SIGKILL to pid {} failed: {}", pid, e);
                false
            }
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        match Self::signal(pid, 0) {
            Ok(()) => true,
            // Exists but belongs to another user.
            Err(e) => e.raw_os_error() == Some(libc::EPERM),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_alive() {
        assert!(PosixSignaler.is_alive(std::process::id()));
    }

    #[test]
    fn test_invalid_pids_are_refused() {
        assert!(!PosixSignaler.is_alive(0));
        assert!(!PosixSignaler.terminate(0));
        assert!(!PosixSignaler.kill(u32::MAX));
    }
}
