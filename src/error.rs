//! Error types and process exit codes

use thiserror::Error;

use crate::channel::ChannelError;

/// Failure of a single external command
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {}", exit_code.map(|c| c.to_string()).unwrap_or_else(|| "a signal".into()))]
    Failed {
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("`{command}` was terminated")]
    Terminated { command: String },
}

impl ShellError {
    pub fn stdout(&self) -> Option<&str> {
        match self {
            ShellError::Failed { stdout, .. } => Some(stdout),
            _ => None,
        }
    }

    pub fn stderr(&self) -> Option<&str> {
        match self {
            ShellError::Failed { stderr, .. } => Some(stderr),
            ShellError::Spawn { .. } | ShellError::Terminated { .. } => None,
        }
    }
}

/// Errors raised while running solutions
#[derive(Error, Debug)]
pub enum SolverError {
    /// Year or day directory does not exist
    #[error("{0}")]
    Discovery(String),

    /// An external command ran and failed; aborts the current language only
    #[error(transparent)]
    Shell(ShellError),

    /// Cancellation was requested; aborts every remaining unit
    #[error("solver terminated")]
    Terminated,

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SolverError {
    /// Whether this error must stop the whole run rather than one unit
    pub fn is_termination(&self) -> bool {
        matches!(self, SolverError::Terminated | SolverError::Channel(_))
    }
}

impl From<ShellError> for SolverError {
    fn from(err: ShellError) -> Self {
        match err {
            ShellError::Terminated { .. } => SolverError::Terminated,
            other => SolverError::Shell(other),
        }
    }
}

/// Process exit codes
pub struct ExitCode;

impl ExitCode {
    pub const SUCCESS: u8 = 0;
    pub const INVALID_ARGS: u8 = 2;
    pub const SIGNAL_BASE: u8 = 128;
    pub const SIGINT: u8 = Self::SIGNAL_BASE + 2;
    pub const UNKNOWN_ERROR: u8 = 255;

    pub fn for_signal(signal: i32) -> u8 {
        u8::try_from(i32::from(Self::SIGNAL_BASE) + signal).unwrap_or(Self::UNKNOWN_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminated_shell_error_becomes_termination() {
        let err: SolverError = ShellError::Terminated {
            command: "sleep 10".into(),
        }
        .into();
        assert!(err.is_termination());

        let err: SolverError = ShellError::Failed {
            command: "false".into(),
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "boom".into(),
        }
        .into();
        assert!(!err.is_termination());
        assert_eq!(err.to_string(), "`false` exited with 1");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitCode::SIGINT, 130);
        assert_eq!(ExitCode::for_signal(3), 131);
        assert_eq!(ExitCode::for_signal(15), 143);
        assert_eq!(ExitCode::for_signal(500), ExitCode::UNKNOWN_ERROR);
    }
}
