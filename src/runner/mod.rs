//! Runner module - solution orchestration
//!
//! Drives every (year, day, language) unit through
//! build → execute → verify/save → time, reporting each transition to the
//! display as an [`Event`].
//!
//! The runner does NOT:
//! - Render anything (that's the display's job)
//! - Cache builds or run languages in parallel
//! - Decide how the process exits (that's the supervisor's job)

pub mod plan;
pub mod shell;

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::channel::Endpoint;
use crate::core::event::{Event, Incoming, TimingInfo, UnitRef};
use crate::error::SolverError;
use crate::languages::{CommandStep, LanguageConfig, LanguageTable};

pub use plan::{Day, Plan};
pub use shell::{CommandOutput, Executor, ShellExecutor};

/// Solution orchestrator, one per supervisor run
pub struct Runner<E: Executor> {
    endpoint: Endpoint,
    languages: Arc<LanguageTable>,
    /// Solutions root; commands run here and paths are relative to it
    root: PathBuf,
    executor: E,
}

impl<E: Executor> Runner<E> {
    pub fn new(
        endpoint: Endpoint,
        languages: Arc<LanguageTable>,
        root: impl AsRef<Path>,
        executor: E,
    ) -> Self {
        Self {
            endpoint,
            languages,
            root: root.as_ref().to_path_buf(),
            executor,
        }
    }

    /// Run every day of the plan.
    ///
    /// Returns `Ok(())` when all units ran or a termination request stopped
    /// the iteration early. The endpoint is closed on return, which tells the
    /// display there is nothing more to come.
    pub async fn run(mut self, plan: Plan) -> Result<(), SolverError> {
        let languages = if plan.languages.is_empty() {
            self.languages.names()
        } else {
            plan.languages.clone()
        };

        let result = self.solve_days(&plan, &languages).await;
        self.endpoint.close();
        result
    }

    async fn solve_days(&mut self, plan: &Plan, languages: &[String]) -> Result<(), SolverError> {
        for day in &plan.days {
            info!(
                "Solving {}/{:02} in {} language(s)",
                day.year,
                day.day,
                languages.len()
            );
            match self.solve_day(day, languages, plan.save).await {
                Ok(()) => {}
                Err(e) if e.is_termination() => {
                    info!("Solver stopped: {}", e);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    async fn solve_day(
        &mut self,
        day: &Day,
        languages: &[String],
        save: bool,
    ) -> Result<(), SolverError> {
        let table = Arc::clone(&self.languages);

        let mut units = Vec::new();
        for language in languages {
            let Some(config) = table.get(language) else {
                warn!("Skipping unknown language {}", language);
                continue;
            };
            let source = day.source(&config.extension);
            if self.root.join(&source).is_file() {
                units.push((
                    UnitRef::new(config.name.clone(), day.year, day.day),
                    config,
                    source,
                ));
            }
        }

        if units.is_empty() {
            for language in languages {
                self.dispatch(Event::MissingSource(UnitRef::new(
                    language.clone(),
                    day.year,
                    day.day,
                )))?;
            }
            return Ok(());
        }

        let outfile = save.then(|| day.outfile());
        for (unit, config, source) in units {
            let result = self
                .solve_unit(
                    &unit,
                    config,
                    &source,
                    day.expected.as_deref(),
                    outfile.as_deref(),
                )
                .await;

            match result {
                Ok(()) => {}
                Err(e) if e.is_termination() => return Err(e),
                Err(SolverError::Shell(e)) => warn!("{} failed: {}", unit, e),
                Err(e) => error!("Unexpected error while solving {}: {:?}", unit, e),
            }
        }

        Ok(())
    }

    async fn solve_unit(
        &mut self,
        unit: &UnitRef,
        config: &LanguageConfig,
        source: &Path,
        expected: Option<&str>,
        outfile: Option<&Path>,
    ) -> Result<(), SolverError> {
        let commands = config.commands(&self.root, source);

        if !commands.compile.is_empty() {
            self.build(unit, &commands.compile).await?;
        }
        let actual = self.solve(unit, &commands.execute).await?;

        match expected {
            None => {
                self.dispatch(Event::SolveAttempted {
                    unit: unit.clone(),
                    actual: actual.clone(),
                })?;
                if let Some(outfile) = outfile {
                    self.save_output(unit, outfile, &actual).await?;
                }
            }
            Some(expected) if actual != expected => {
                self.dispatch(Event::SolveIncorrect {
                    unit: unit.clone(),
                    expected: expected.to_string(),
                    actual,
                })?;
            }
            Some(_) => {
                self.dispatch(Event::SolveSucceeded(unit.clone()))?;
                if config.timing {
                    self.time(unit, &commands.timing).await?;
                } else {
                    self.dispatch(Event::TimingSkipped(unit.clone()))?;
                }
            }
        }

        Ok(())
    }

    async fn build(&mut self, unit: &UnitRef, steps: &[CommandStep]) -> Result<(), SolverError> {
        self.dispatch(Event::BuildStarted(unit.clone()))?;

        for step in steps {
            if let Err(e) = self.shell_out(step).await {
                let (stdout, stderr) = match &e {
                    SolverError::Shell(shell) => (
                        shell.stdout().map(str::to_string),
                        shell.stderr().map(str::to_string),
                    ),
                    _ => (None, None),
                };
                self.dispatch_failure(Event::BuildFailed {
                    unit: unit.clone(),
                    stdout,
                    stderr,
                });
                return Err(e);
            }
        }

        self.dispatch(Event::BuildFinished(unit.clone()))
    }

    async fn solve(&mut self, unit: &UnitRef, step: &CommandStep) -> Result<String, SolverError> {
        self.dispatch(Event::SolveStarted(unit.clone()))?;

        match self.shell_out(step).await {
            Ok(actual) => {
                self.dispatch(Event::SolveFinished(unit.clone()))?;
                Ok(actual)
            }
            Err(e) => {
                self.dispatch_failure(Event::SolveFailed {
                    unit: unit.clone(),
                    stderr: failure_stderr(&e),
                });
                Err(e)
            }
        }
    }

    async fn time(&mut self, unit: &UnitRef, step: &CommandStep) -> Result<(), SolverError> {
        self.dispatch(Event::TimingStarted(unit.clone()))?;

        let started = Instant::now();
        let timed = match self.shell_out(step).await {
            Ok(output) => serde_json::from_str::<TimingInfo>(output.trim())
                .with_context(|| format!("Invalid timing output from {}: {:?}", unit, output))
                .map_err(SolverError::from),
            Err(e) => Err(e),
        };
        let duration = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

        match timed {
            Ok(info) => self.dispatch(Event::TimingFinished {
                unit: unit.clone(),
                info,
                duration,
            }),
            Err(e) => {
                self.dispatch_failure(Event::TimingFailed {
                    unit: unit.clone(),
                    stderr: failure_stderr(&e),
                });
                Err(e)
            }
        }
    }

    async fn save_output(
        &mut self,
        unit: &UnitRef,
        outfile: &Path,
        actual: &str,
    ) -> Result<(), SolverError> {
        let path = self.root.join(outfile);
        if let Err(e) = tokio::fs::write(&path, actual)
            .await
            .with_context(|| format!("Failed to save output to {}", path.display()))
        {
            self.dispatch_failure(Event::SolveFailed {
                unit: unit.clone(),
                stderr: Some(format!("{:#}\n", e)),
            });
            return Err(e.into());
        }
        info!("Saved output of {} to {}", unit, path.display());

        self.dispatch(Event::OutputSaved {
            unit: unit.clone(),
            file: outfile.to_path_buf(),
        })
    }

    /// Run one command, watching the channel for a termination request
    async fn shell_out(&mut self, step: &CommandStep) -> Result<String, SolverError> {
        let command = step.resolve()?;
        let endpoint = &mut self.endpoint;
        let mut should_terminate = || termination_requested(endpoint);

        let output = self.executor.run(&command, &mut should_terminate).await?;
        if !output.stderr.is_empty() {
            debug!("`{}` wrote to stderr: {}", command, output.stderr.trim_end());
        }
        Ok(output.stdout)
    }

    fn dispatch(&self, event: Event) -> Result<(), SolverError> {
        debug!("Dispatching {} for {:?}", event.kind(), event.unit());
        self.endpoint.send(&event)?;
        Ok(())
    }

    /// Report a failed stage; a send failure here is only logged
    fn dispatch_failure(&self, event: Event) {
        if let Err(e) = self.dispatch(event) {
            debug!("Could not report failure: {}", e);
        }
    }
}

fn failure_stderr(err: &SolverError) -> Option<String> {
    match err {
        SolverError::Shell(shell) => shell.stderr().map(str::to_string),
        _ => None,
    }
}

/// Drain pending control messages; true on `terminate` or a closed inbox
fn termination_requested(endpoint: &mut Endpoint) -> bool {
    while endpoint.poll() {
        match endpoint.recv() {
            Ok(Incoming::Event(Event::Terminate)) => return true,
            Ok(other) => debug!("Ignoring message while a command runs: {:?}", other),
            Err(_) => return true,
        }
    }
    endpoint.is_closed()
}
