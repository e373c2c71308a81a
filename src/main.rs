mod channel;
mod config;
mod core;
mod display;
mod error;
mod languages;
mod runner;
mod supervisor;

use clap::Parser;
use std::path::Path;
use std::process;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{ExitCode, SolverError};
use crate::languages::LanguageTable;
use crate::runner::plan::{has_saved_output, Plan};
use crate::supervisor::Supervisor;

#[derive(Parser, Debug)]
#[command(name = "solver")]
#[command(about = "Build, run, verify and time puzzle solutions", long_about = None)]
struct Args {
    /// Puzzle year
    year: u32,

    /// Puzzle day (every day of the year when omitted)
    day: Option<u32>,

    /// Languages to run, by name or alias (default: all)
    #[arg(short = 'l', long = "language", num_args = 1..)]
    languages: Vec<String>,

    /// Record the output as the expected answer for the day
    #[arg(long)]
    save: bool,
}

#[tokio::main]
async fn main() -> process::ExitCode {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "solver=warn".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = Settings::from_env();
    debug!("Settings: {:?}", settings);

    let languages = match LanguageTable::load_or_builtin(settings.languages_config.as_ref()) {
        Ok(languages) => languages,
        Err(e) => {
            eprintln!("Error loading language configuration: {:#}", e);
            return process::ExitCode::from(ExitCode::INVALID_ARGS);
        }
    };

    let requested = match validate(&args, &languages, &settings.solutions_root) {
        Ok(requested) => requested,
        Err(message) => {
            eprintln!("Error: {}", message);
            return process::ExitCode::from(ExitCode::INVALID_ARGS);
        }
    };

    let plan = match Plan::discover(
        &settings.solutions_root,
        args.year,
        args.day,
        requested,
        args.save,
    ) {
        Ok(plan) => plan,
        Err(SolverError::Discovery(message)) => {
            eprintln!("Error: {}", message);
            return process::ExitCode::from(ExitCode::INVALID_ARGS);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return process::ExitCode::from(ExitCode::UNKNOWN_ERROR);
        }
    };
    info!(
        "Running {} day(s) of {} in {} language(s)",
        plan.days.len(),
        args.year,
        plan.languages.len()
    );

    let supervisor = Supervisor::new(Arc::new(settings), Arc::new(languages));
    let cause = supervisor.run(plan).await;
    process::ExitCode::from(cause.exit_code())
}

/// Check the arguments against the language table and the solutions tree.
///
/// Returns the canonical names of the languages to run.
fn validate(args: &Args, languages: &LanguageTable, root: &Path) -> Result<Vec<String>, String> {
    let unknown: Vec<&str> = args
        .languages
        .iter()
        .filter(|language| !languages.contains(language))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(format!(
            "Unknown language(s): {} (available: {})",
            unknown.join(", "),
            languages.names().join(", ")
        ));
    }

    if args.save {
        let Some(day) = args.day else {
            return Err("Must use `--save` with a specific day".to_string());
        };
        if has_saved_output(root, args.year, day) {
            return Err(
                "Cannot save results when output already saved, please delete existing file"
                    .to_string(),
            );
        }
    }

    let mut requested: Vec<String> = Vec::new();
    for language in &args.languages {
        if let Some(name) = languages.canonical(language) {
            if !requested.iter().any(|r| r == name) {
                requested.push(name.to_string());
            }
        }
    }
    if requested.is_empty() {
        requested = languages.names();
    }

    Ok(requested)
}
