//! Process supervision: wires the runner and display together and owns shutdown
//!
//! The runner is a tokio task and the display a dedicated thread. The
//! supervisor watches both plus OS signals, and every exit path goes through
//! a single [`Supervisor::shutdown`] routine.

use nix::sys::signal::Signal;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::thread::JoinHandle as ThreadHandle;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::channel::{pipe, Sender};
use crate::config::Settings;
use crate::core::event::Event;
use crate::display::{run_display, Display};
use crate::error::{ExitCode, SolverError};
use crate::languages::LanguageTable;
use crate::runner::{Executor, Plan, Runner, ShellExecutor};

/// Why the supervisor stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// Runner went through the whole plan (or stopped on request)
    Completed,
    /// SIGINT / Ctrl-C
    Interrupted,
    /// SIGTERM, SIGQUIT or SIGHUP
    Signal(i32),
    /// Display thread exited while the runner was still going
    DisplayDied,
    /// Runner returned an error or panicked
    Failed,
}

impl ShutdownCause {
    pub fn exit_code(self) -> u8 {
        match self {
            ShutdownCause::Completed => ExitCode::SUCCESS,
            ShutdownCause::Interrupted => ExitCode::SIGINT,
            ShutdownCause::Signal(signal) => ExitCode::for_signal(signal),
            ShutdownCause::DisplayDied | ShutdownCause::Failed => ExitCode::UNKNOWN_ERROR,
        }
    }
}

pub struct Supervisor {
    settings: Arc<Settings>,
    languages: Arc<LanguageTable>,
}

impl Supervisor {
    pub fn new(settings: Arc<Settings>, languages: Arc<LanguageTable>) -> Self {
        Self {
            settings,
            languages,
        }
    }

    /// Run the plan with real shell commands, rendering to stdout
    pub async fn run(&self, plan: Plan) -> ShutdownCause {
        let executor = ShellExecutor::new(&self.settings.solutions_root)
            .with_poll_interval(self.settings.poll_interval)
            .with_kill_grace(self.settings.kill_grace);
        self.run_with(plan, std::io::stdout(), executor, shutdown_signal())
            .await
    }

    /// Run the plan until it completes, the display dies or `shutdown` resolves
    pub async fn run_with<W, E, S>(
        &self,
        plan: Plan,
        out: W,
        executor: E,
        shutdown: S,
    ) -> ShutdownCause
    where
        W: Write + Send + 'static,
        E: Executor + 'static,
        S: Future<Output = ShutdownCause>,
    {
        let (runner_end, display_end) = pipe();
        let terminate = display_end.sender();

        let display = Display::new(out, self.languages.name_width());
        let tick = self.settings.tick_interval;
        let display_handle = match std::thread::Builder::new()
            .name("solver-display".to_string())
            .spawn(move || run_display(display, display_end, tick))
        {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to start display thread: {}", e);
                return ShutdownCause::DisplayDied;
            }
        };

        let runner = Runner::new(
            runner_end,
            Arc::clone(&self.languages),
            &self.settings.solutions_root,
            executor,
        );
        let mut runner_handle = tokio::spawn(runner.run(plan));
        info!("Solver started");

        let mut liveness = tokio::time::interval(self.settings.tick_interval);
        tokio::pin!(shutdown);

        let mut runner_done = false;
        let cause = loop {
            tokio::select! {
                biased;

                result = &mut runner_handle => {
                    runner_done = true;
                    break runner_outcome(result);
                }
                cause = &mut shutdown => {
                    info!("Received {:?}, shutting down", cause);
                    break cause;
                }
                _ = liveness.tick() => {
                    // A finished runner closes the channel, which ends the display too
                    if display_handle.is_finished() && !runner_handle.is_finished() {
                        warn!("Display exited while the runner was still running");
                        break ShutdownCause::DisplayDied;
                    }
                }
            }
        };

        let runner = (!runner_done).then_some(runner_handle);
        self.shutdown(cause, terminate, runner, display_handle).await
    }

    /// Stop the runner (politely, then by force) and wait for the display to drain
    async fn shutdown(
        &self,
        cause: ShutdownCause,
        terminate: Sender,
        runner: Option<JoinHandle<Result<(), SolverError>>>,
        display: ThreadHandle<std::io::Result<()>>,
    ) -> ShutdownCause {
        let grace = self.settings.shutdown_grace;
        let mut cause = cause;

        if let Some(mut runner) = runner {
            if let Err(e) = terminate.send(&Event::Terminate) {
                debug!("Runner inbox already closed: {}", e);
            }
            match tokio::time::timeout(grace, &mut runner).await {
                Ok(result) => {
                    debug!("Runner stopped: {:?}", runner_outcome(result));
                }
                Err(_) => {
                    warn!("Runner did not stop within {:?}, aborting", grace);
                    runner.abort();
                    let _ = tokio::time::timeout(grace, runner).await;
                }
            }
        }
        drop(terminate);

        let deadline = Instant::now() + grace;
        while !display.is_finished() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        if !display.is_finished() {
            warn!("Display did not finish within {:?}", grace);
            return cause;
        }
        match display.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Display failed: {}", e);
                if cause == ShutdownCause::Completed {
                    cause = ShutdownCause::DisplayDied;
                }
            }
            Err(_) => {
                error!("Display thread panicked");
                if cause == ShutdownCause::Completed {
                    cause = ShutdownCause::DisplayDied;
                }
            }
        }

        info!("Solver stopped: {:?}", cause);
        cause
    }
}

fn runner_outcome(
    result: Result<Result<(), SolverError>, tokio::task::JoinError>,
) -> ShutdownCause {
    match result {
        Ok(Ok(())) => ShutdownCause::Completed,
        Ok(Err(e)) => {
            error!("Runner failed: {:?}", e);
            ShutdownCause::Failed
        }
        Err(e) => {
            error!("Runner task did not complete: {}", e);
            ShutdownCause::Failed
        }
    }
}

/// Resolve on the first SIGINT, SIGTERM, SIGQUIT or SIGHUP
pub async fn shutdown_signal() -> ShutdownCause {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigquit, mut sighup) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::quit()),
        signal(SignalKind::hangup()),
    ) {
        (Ok(sigterm), Ok(sigquit), Ok(sighup)) => (sigterm, sigquit, sighup),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
            warn!("Failed to install signal handlers: {}", e);
            return interrupted().await;
        }
    };

    tokio::select! {
        cause = interrupted() => cause,
        _ = sigterm.recv() => ShutdownCause::Signal(Signal::SIGTERM as i32),
        _ = sigquit.recv() => ShutdownCause::Signal(Signal::SIGQUIT as i32),
        _ = sighup.recv() => ShutdownCause::Signal(Signal::SIGHUP as i32),
    }
}

async fn interrupted() -> ShutdownCause {
    match tokio::signal::ctrl_c().await {
        Ok(()) => ShutdownCause::Interrupted,
        Err(e) => {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending().await
        }
    }
}
