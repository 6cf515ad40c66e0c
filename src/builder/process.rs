//! Running toolchain subprocesses against a deadline

use std::process::Stdio;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::debug;

/// Max number of output lines kept for build diagnostics.
const BUILD_ERROR_TAIL_LINES: usize = 50;

/// Resource limits applied inside the child before exec
#[derive(Debug, Clone, Copy, Default)]
pub struct Limits {
    /// RLIMIT_CPU in seconds (0 = inherit)
    pub cpu_secs: u64,
    /// RLIMIT_FSIZE in bytes (0 = inherit)
    pub file_bytes: u64,
}

/// Why a step did not succeed
#[derive(Debug)]
pub enum StepFailure {
    /// The program could not be started or waited on
    Spawn(std::io::Error),
    /// Non-zero exit; carries the tail of the combined output
    Exit { code: Option<i32>, output: String },
    /// Deadline reached; the process group was killed
    TimedOut,
}

impl StepFailure {
    /// One-line description plus output, for error payloads
    pub fn describe(&self, step: &str) -> String {
        match self {
            Self::Spawn(e) => format!("{}: {}", step, e),
            Self::Exit { code, output } => match code {
                Some(code) => format!("{} exited with status {}\n{}", step, code, output),
                None => format!("{} killed by signal\n{}", step, output),
            },
            Self::TimedOut => format!("{}: timed out", step),
        }
    }
}

/// Extract the useful tail of build output for error diagnostics.
///
/// Combines stdout and stderr, then returns the last `BUILD_ERROR_TAIL_LINES`
/// lines so error messages are actionable without being overwhelming.
pub(crate) fn build_error_output(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let total = lines.len();
    let tail: Vec<&str> = if total > BUILD_ERROR_TAIL_LINES {
        lines[total - BUILD_ERROR_TAIL_LINES..].to_vec()
    } else {
        lines
    };
    tail.join("\n")
}

/// Run `cmd` to completion or until `deadline`.
///
/// The child gets its own process group so a timeout takes down every
/// process the toolchain spawned, not just the top-level one.
pub async fn run_step(
    mut cmd: Command,
    deadline: Instant,
    limits: Limits,
) -> Result<String, StepFailure> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    {
        cmd.process_group(0);
        apply_limits(&mut cmd, limits);
    }
    #[cfg(not(unix))]
    {
        let _ = limits;
    }

    debug!(command = ?cmd.as_std(), "running build step");
    let child = cmd.spawn().map_err(StepFailure::Spawn)?;
    let pid = child.id();

    match tokio::time::timeout_at(deadline, child.wait_with_output()).await {
        Err(_) => {
            kill_group(pid);
            Err(StepFailure::TimedOut)
        }
        Ok(Err(e)) => Err(StepFailure::Spawn(e)),
        Ok(Ok(output)) => {
            let combined = build_error_output(
                &String::from_utf8_lossy(&output.stdout),
                &String::from_utf8_lossy(&output.stderr),
            );
            if output.status.success() {
                Ok(combined)
            } else {
                Err(StepFailure::Exit {
                    code: output.status.code(),
                    output: combined,
                })
            }
        }
    }
}

#[cfg(unix)]
fn apply_limits(cmd: &mut Command, limits: Limits) {
    if limits.cpu_secs == 0 && limits.file_bytes == 0 {
        return;
    }

    // SAFETY: only async-signal-safe libc calls between fork and exec
    unsafe {
        cmd.pre_exec(move || {
            if limits.cpu_secs > 0 {
                let cpu = libc::rlimit {
                    rlim_cur: limits.cpu_secs as libc::rlim_t,
                    rlim_max: limits.cpu_secs as libc::rlim_t,
                };
                if libc::setrlimit(libc::RLIMIT_CPU, &cpu) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            if limits.file_bytes > 0 {
                let fsize = libc::rlimit {
                    rlim_cur: limits.file_bytes as libc::rlim_t,
                    rlim_max: limits.file_bytes as libc::rlim_t,
                };
                if libc::setrlimit(libc::RLIMIT_FSIZE, &fsize) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            Ok(())
        });
    }
}

/// SIGKILL the whole process group led by `pid`
fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            // SAFETY: plain syscall; a stale group id just yields ESRCH
            unsafe {
                libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}
