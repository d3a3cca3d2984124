//! Signal a process tree, wait for it to exit, escalate to a forced kill.

use crate::{ProcessError, ProcessResult};

use std::future::Future;
use std::panic::Location;
use std::time::Duration;

use error_location::ErrorLocation;
use log::{debug, info, warn};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for the exit after a forced kill was sent.
const FORCE_KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminationSignal {
    /// SIGTERM
    #[default]
    Terminate,
    /// SIGINT
    Interrupt,
    /// SIGKILL; skips the grace period
    Kill,
}

/// Terminate `pid` and its process group, polling for the exit.
///
/// Prefer [`terminate_until`] for own children: an unreaped child still
/// looks alive to a pid check.
pub async fn terminate(pid: u32, timeout: Duration, signal: TerminationSignal) -> ProcessResult<()> {
    terminate_until(pid, timeout, signal, poll_until_gone(pid)).await
}

/// Terminate `pid`, treating completion of `exited` as proof of exit.
///
/// A process that is already gone counts as terminated. After `timeout`
/// the process tree is killed outright.
pub async fn terminate_until<F>(
    pid: u32,
    timeout: Duration,
    signal: TerminationSignal,
    exited: F,
) -> ProcessResult<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(exited);

    info!("Sending {signal:?} to pid {pid}");
    if !send_signal(pid, signal).await? {
        debug!("Process {pid} already exited");
        return Ok(());
    }

    if tokio::time::timeout(timeout, &mut exited).await.is_ok() {
        return Ok(());
    }

    warn!("Process {pid} still running after {timeout:?}, force killing");
    if !send_signal(pid, TerminationSignal::Kill).await? {
        return Ok(());
    }

    if tokio::time::timeout(FORCE_KILL_GRACE, &mut exited).await.is_err() {
        return Err(ProcessError::Termination {
            pid,
            source: std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "process survived a forced kill",
            ),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    Ok(())
}

async fn poll_until_gone(pid: u32) {
    while is_process_running(pid) {
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
}

/// Whether `owner` is `child` itself or a member of the group `child` leads.
#[cfg(unix)]
pub(crate) fn belongs_to(owner: u32, child: u32) -> bool {
    use nix::unistd::{Pid, getpgid};

    if owner == child {
        return true;
    }

    matches!(
        getpgid(Some(Pid::from_raw(owner as i32))),
        Ok(group) if group.as_raw() == child as i32
    )
}

#[cfg(not(unix))]
pub(crate) fn belongs_to(owner: u32, child: u32) -> bool {
    owner == child
}

/// Send `signal`; `Ok(false)` when the process no longer exists.
#[cfg(unix)]
async fn send_signal(pid: u32, signal: TerminationSignal) -> ProcessResult<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill, killpg};
    use nix::unistd::{Pid, getpgid};

    let target = Pid::from_raw(pid as i32);
    let signal = match signal {
        TerminationSignal::Terminate => Signal::SIGTERM,
        TerminationSignal::Interrupt => Signal::SIGINT,
        TerminationSignal::Kill => Signal::SIGKILL,
    };

    // Group leaders take their whole tree with them
    let leads_group = matches!(getpgid(Some(target)), Ok(group) if group == target);
    let result = if leads_group {
        killpg(target, signal)
    } else {
        kill(target, signal)
    };

    match result {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(errno) => Err(ProcessError::Termination {
            pid,
            source: std::io::Error::from(errno),
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}

#[cfg(windows)]
async fn send_signal(pid: u32, signal: TerminationSignal) -> ProcessResult<bool> {
    if !is_process_running(pid) {
        return Ok(false);
    }

    let pid_arg = pid.to_string();
    let mut args = vec!["/T"];
    if signal == TerminationSignal::Kill {
        args.push("/F");
    }
    args.extend(["/PID", pid_arg.as_str()]);

    let output = tokio::process::Command::new("taskkill")
        .args(&args)
        .output()
        .await
        .map_err(|source| ProcessError::Termination {
            pid,
            source,
            location: ErrorLocation::from(Location::caller()),
        })?;

    if output.status.success() {
        return Ok(true);
    }
    if !is_process_running(pid) {
        return Ok(false);
    }

    Err(ProcessError::Termination {
        pid,
        source: std::io::Error::other(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        location: ErrorLocation::from(Location::caller()),
    })
}

/// Synchronous best-effort kill of a whole tree, for drop paths.
#[cfg(unix)]
pub(crate) fn kill_tree_now(pid: u32) {
    use nix::sys::signal::{Signal, kill, killpg};
    use nix::unistd::Pid;

    let target = Pid::from_raw(pid as i32);
    if killpg(target, Signal::SIGKILL).is_err() {
        kill(target, Signal::SIGKILL).ok();
    }
}

#[cfg(windows)]
pub(crate) fn kill_tree_now(pid: u32) {
    std::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .output()
        .ok();
}

/// Check if a process with given PID is running.
#[cfg(unix)]
pub fn is_process_running(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // Signal 0 checks existence; EPERM means it exists but is not ours
    matches!(
        kill(Pid::from_raw(pid as i32), None),
        Ok(()) | Err(Errno::EPERM)
    )
}

/// Check if a process with given PID is running (Windows).
#[cfg(windows)]
pub fn is_process_running(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::{CloseHandle, STILL_ACTIVE};
    use windows_sys::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };

    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            return false;
        }

        let mut exit_code: u32 = 0;
        let result = GetExitCodeProcess(handle, &mut exit_code);
        CloseHandle(handle);

        result != 0 && exit_code == STILL_ACTIVE as u32
    }
}
