//! Solver events exchanged between the runner and the display
//!
//! Every event travels as a single JSON frame: `{"kind": "...", ...payload}`.
//! Keeping kind and payload in one frame means the two can never be split or
//! interleaved with another event on the channel.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifies the (language, year, day) a solver event belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRef {
    pub language: String,
    pub year: u32,
    pub day: u32,
}

impl UnitRef {
    pub fn new(language: impl Into<String>, year: u32, day: u32) -> Self {
        Self {
            language: language.into(),
            year,
            day,
        }
    }
}

impl fmt::Display for UnitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:02} {}", self.year, self.day, self.language)
    }
}

/// Timing figures reported by a solution for one part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartTiming {
    /// Total time spent over all iterations, in microseconds
    pub duration: f64,
    pub iterations: u64,
}

impl PartTiming {
    /// Average time of a single iteration in microseconds
    pub fn average(&self) -> f64 {
        if self.iterations == 0 {
            self.duration
        } else {
            self.duration / self.iterations as f64
        }
    }
}

/// Output of a solution's timing command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingInfo {
    pub part1: PartTiming,
    pub part2: PartTiming,
}

/// Solver lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Event {
    MissingSource(UnitRef),
    BuildStarted(UnitRef),
    BuildFinished(UnitRef),
    BuildFailed {
        #[serde(flatten)]
        unit: UnitRef,
        /// Some toolchains (node) report compile errors on stdout
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stdout: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stderr: Option<String>,
    },
    SolveStarted(UnitRef),
    SolveFinished(UnitRef),
    SolveFailed {
        #[serde(flatten)]
        unit: UnitRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stderr: Option<String>,
    },
    #[serde(rename = "solved-attempted")]
    SolveAttempted {
        #[serde(flatten)]
        unit: UnitRef,
        actual: String,
    },
    SolveSucceeded(UnitRef),
    SolveIncorrect {
        #[serde(flatten)]
        unit: UnitRef,
        expected: String,
        actual: String,
    },
    OutputSaved {
        #[serde(flatten)]
        unit: UnitRef,
        file: PathBuf,
    },
    TimingStarted(UnitRef),
    TimingSkipped(UnitRef),
    TimingFinished {
        #[serde(flatten)]
        unit: UnitRef,
        info: TimingInfo,
        /// Wall clock time of the timing command in microseconds
        duration: u64,
    },
    TimingFailed {
        #[serde(flatten)]
        unit: UnitRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stderr: Option<String>,
    },
    Terminate,
}

impl Event {
    /// Wire name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Event::MissingSource(_) => "missing-source",
            Event::BuildStarted(_) => "build-started",
            Event::BuildFinished(_) => "build-finished",
            Event::BuildFailed { .. } => "build-failed",
            Event::SolveStarted(_) => "solve-started",
            Event::SolveFinished(_) => "solve-finished",
            Event::SolveFailed { .. } => "solve-failed",
            Event::SolveAttempted { .. } => "solved-attempted",
            Event::SolveSucceeded(_) => "solve-succeeded",
            Event::SolveIncorrect { .. } => "solve-incorrect",
            Event::OutputSaved { .. } => "output-saved",
            Event::TimingStarted(_) => "timing-started",
            Event::TimingSkipped(_) => "timing-skipped",
            Event::TimingFinished { .. } => "timing-finished",
            Event::TimingFailed { .. } => "timing-failed",
            Event::Terminate => "terminate",
        }
    }

    /// The unit the event refers to (`None` for control messages)
    pub fn unit(&self) -> Option<&UnitRef> {
        match self {
            Event::MissingSource(unit)
            | Event::BuildStarted(unit)
            | Event::BuildFinished(unit)
            | Event::SolveStarted(unit)
            | Event::SolveFinished(unit)
            | Event::SolveSucceeded(unit)
            | Event::TimingStarted(unit)
            | Event::TimingSkipped(unit) => Some(unit),
            Event::BuildFailed { unit, .. }
            | Event::SolveFailed { unit, .. }
            | Event::SolveAttempted { unit, .. }
            | Event::SolveIncorrect { unit, .. }
            | Event::OutputSaved { unit, .. }
            | Event::TimingFinished { unit, .. }
            | Event::TimingFailed { unit, .. } => Some(unit),
            Event::Terminate => None,
        }
    }

    /// Encode the event as a single wire frame
    pub fn encode(&self) -> String {
        // Serializing plain data with string keys cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| format!(r#"{{"kind":"{}"}}"#, self.kind()))
    }
}

/// A decoded wire frame
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Event(Event),
    /// Frame whose kind is unknown or whose payload does not fit its kind
    Invalid { kind: String, payload: String },
}

impl Incoming {
    pub fn decode(frame: &str) -> Self {
        match serde_json::from_str::<Event>(frame) {
            Ok(event) => Incoming::Event(event),
            Err(_) => match serde_json::from_str::<serde_json::Value>(frame) {
                Ok(serde_json::Value::Object(mut fields)) => {
                    let kind = match fields.remove("kind") {
                        Some(serde_json::Value::String(kind)) => kind,
                        Some(other) => other.to_string(),
                        None => "<missing>".to_string(),
                    };
                    Incoming::Invalid {
                        kind,
                        payload: serde_json::Value::Object(fields).to_string(),
                    }
                }
                _ => Incoming::Invalid {
                    kind: "<malformed>".to_string(),
                    payload: frame.to_string(),
                },
            },
        }
    }
}

impl From<Event> for Incoming {
    fn from(event: Event) -> Self {
        Incoming::Event(event)
    }
}
