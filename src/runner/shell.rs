//! Shell command execution with cooperative cancellation
//!
//! Commands run through `sh -c` in the solutions root, each in its own
//! process group so that cancelling a command also reaches whatever it
//! spawned (compilers, interpreters, build tools).

use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ShellError;

/// Captured output of a successful command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executes external commands.
///
/// `should_terminate` is checked before the command starts and periodically
/// while it runs. Once it returns `true` the command is stopped and
/// [`ShellError::Terminated`] is returned.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(
        &self,
        command: &str,
        should_terminate: &mut (dyn FnMut() -> bool + Send),
    ) -> Result<CommandOutput, ShellError>;
}

/// Executor that runs commands through `sh -c`
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    work_dir: PathBuf,
    poll_interval: Duration,
    kill_grace: Duration,
}

impl ShellExecutor {
    pub fn new(work_dir: impl AsRef<Path>) -> Self {
        Self {
            work_dir: work_dir.as_ref().to_path_buf(),
            poll_interval: Duration::from_millis(10),
            kill_grace: Duration::from_millis(500),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// SIGTERM the command's process group, then SIGKILL if it lingers
    async fn stop(&self, child: &mut Child, group: &mut ProcessGroup) {
        group.signal(Signal::SIGTERM);
        if tokio::time::timeout(self.kill_grace, child.wait()).await.is_err() {
            warn!("Command ignored SIGTERM, killing process group");
            group.signal(Signal::SIGKILL);
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        group.release();
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn run(
        &self,
        command: &str,
        should_terminate: &mut (dyn FnMut() -> bool + Send),
    ) -> Result<CommandOutput, ShellError> {
        if should_terminate() {
            return Err(ShellError::Terminated {
                command: command.to_string(),
            });
        }

        debug!("Running shell command: {}", command);

        let mut shell = Command::new("sh");
        shell
            .arg("-c")
            .arg(command)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        die_with_parent(&mut shell);

        let mut child = shell.spawn().map_err(|source| ShellError::Spawn {
            command: command.to_string(),
            source,
        })?;

        // The child leads its own group, so its pid is the group id
        let mut group = ProcessGroup::new(child.id());
        let stdout = collect(child.stdout.take());
        let stderr = collect(child.stderr.take());

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let status = loop {
            tokio::select! {
                status = child.wait() => {
                    break status.map_err(|source| ShellError::Spawn {
                        command: command.to_string(),
                        source,
                    })?;
                }
                _ = ticker.tick() => {
                    if should_terminate() {
                        debug!("Terminating shell command: {}", command);
                        self.stop(&mut child, &mut group).await;
                        stdout.abort();
                        stderr.abort();
                        return Err(ShellError::Terminated {
                            command: command.to_string(),
                        });
                    }
                }
            }
        };
        // Leftover background processes of a finished command are not ours to keep
        group.signal(Signal::SIGKILL);
        group.release();

        let stdout = stdout.await.unwrap_or_default();
        let stderr = stderr.await.unwrap_or_default();

        if status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(ShellError::Failed {
                command: command.to_string(),
                exit_code: status.code(),
                stdout,
                stderr,
            })
        }
    }
}

/// Have the kernel SIGKILL the shell if the solver dies without cleaning up.
///
/// The shell runs outside the terminal's process group, so it would not
/// see a hangup or a kill aimed at the solver. The death signal follows the
/// spawning thread, which is a runtime worker living as long as the process.
#[cfg(target_os = "linux")]
fn die_with_parent(command: &mut Command) {
    use nix::sys::prctl;

    // SAFETY: prctl is async-signal-safe and touches no state of the parent
    unsafe {
        command.pre_exec(|| prctl::set_pdeathsig(Signal::SIGKILL).map_err(std::io::Error::from));
    }
}

#[cfg(not(target_os = "linux"))]
fn die_with_parent(_command: &mut Command) {}

fn collect<R>(stream: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).to_string()
    })
}

/// Kills a command's process group if the owning future is dropped mid-run
struct ProcessGroup {
    pgid: Option<Pid>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|pid| i32::try_from(pid).ok()).map(Pid::from_raw),
        }
    }

    fn signal(&self, signal: Signal) {
        if let Some(pgid) = self.pgid {
            // ESRCH just means the group is already gone
            let _ = killpg(pgid, signal);
        }
    }

    fn release(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.signal(Signal::SIGKILL);
    }
}
