//! Solver configuration
//!
//! Settings are read once from the environment (after `.env` is loaded) and
//! passed explicitly to the components that need them.

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Cadence of the display tick and the runner's cancellation poll
pub const TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Solver configuration
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory containing `<year>/<dd>/main.<ext>` solutions (default: ".")
    pub solutions_root: PathBuf,
    /// Language table override (default: the table built into the binary)
    pub languages_config: Option<PathBuf>,
    /// Display tick interval (default: 10ms)
    pub tick_interval: Duration,
    /// Runner cancellation poll interval while a command runs (default: 10ms)
    pub poll_interval: Duration,
    /// How long shutdown waits for each actor before forcing it (default: 2s)
    pub shutdown_grace: Duration,
    /// How long a cancelled command gets after SIGTERM before SIGKILL (default: 500ms)
    pub kill_grace: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            solutions_root: PathBuf::from("."),
            languages_config: None,
            tick_interval: TICK_INTERVAL,
            poll_interval: TICK_INTERVAL,
            shutdown_grace: Duration::from_millis(2_000),
            kill_grace: Duration::from_millis(500),
        }
    }
}

impl Settings {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(root) = lookup("AOC_SOLUTIONS_PATH").filter(|v| !v.is_empty()) {
            settings.solutions_root = PathBuf::from(root);
        }
        if let Some(path) = lookup("LANGUAGES_CONFIG").filter(|v| !v.is_empty()) {
            settings.languages_config = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup("SOLVER_SHUTDOWN_GRACE_MS") {
            match raw.parse::<u64>() {
                Ok(ms) => settings.shutdown_grace = Duration::from_millis(ms),
                Err(e) => warn!(
                    "Invalid SOLVER_SHUTDOWN_GRACE_MS={:?} ({}), using {:?}",
                    raw, e, settings.shutdown_grace
                ),
            }
        }

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[]));

        assert_eq!(settings.solutions_root, PathBuf::from("."));
        assert!(settings.languages_config.is_none());
        assert_eq!(settings.tick_interval, Duration::from_millis(10));
        assert_eq!(settings.shutdown_grace, Duration::from_secs(2));
    }

    #[test]
    fn test_env_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("AOC_SOLUTIONS_PATH", "/srv/aoc"),
            ("LANGUAGES_CONFIG", "/etc/solver/languages.toml"),
            ("SOLVER_SHUTDOWN_GRACE_MS", "250"),
        ]));

        assert_eq!(settings.solutions_root, PathBuf::from("/srv/aoc"));
        assert_eq!(
            settings.languages_config,
            Some(PathBuf::from("/etc/solver/languages.toml"))
        );
        assert_eq!(settings.shutdown_grace, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_grace_falls_back() {
        let settings = Settings::from_lookup(lookup(&[("SOLVER_SHUTDOWN_GRACE_MS", "soon")]));
        assert_eq!(settings.shutdown_grace, Duration::from_secs(2));
    }
}
