//! Display module - terminal rendering of solver events
//!
//! The display is a reducer over [`Incoming`] frames plus a fixed-rate tick.
//! Handling an event only queues render items; `tick()` animates the spinner
//! and writes the queue out in `(priority, sequence)` order.

pub mod format;
pub mod term;

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::{self, Write};
use std::time::Duration;
use tracing::debug;

use crate::channel::Endpoint;
use crate::core::event::{Event, Incoming, UnitRef};

use term::{paint, Color, Spinner, CURSOR_RETURN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Priority {
    High,
    Medium,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct QueuedItem {
    priority: Priority,
    seq: u64,
    output: String,
}

/// Terminal display state, owned by the display thread
pub struct Display<W: Write> {
    out: W,
    language_width: usize,
    /// A build, solve or timing step is in flight
    busy: bool,
    /// The spinner is drawn, or will be once the queue drains
    was_busy: bool,
    /// A spinner restart is queued but not yet written; stopping it must
    /// come after it rather than ahead of the queue
    restarted: bool,
    spinner: Spinner,
    queue: BinaryHeap<Reverse<QueuedItem>>,
    seq: u64,
}

impl<W: Write> Display<W> {
    pub fn new(out: W, language_width: usize) -> Self {
        Self {
            out,
            language_width,
            busy: false,
            was_busy: false,
            restarted: false,
            spinner: Spinner::default(),
            queue: BinaryHeap::new(),
            seq: 0,
        }
    }

    #[cfg(test)]
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Queue the output for one incoming frame
    pub fn handle(&mut self, incoming: &Incoming) {
        let items = match incoming {
            Incoming::Event(event) => self.render(event),
            Incoming::Invalid { kind, payload } => invalid(kind, payload),
        };
        for item in items {
            self.enqueue(item, Priority::Medium);
        }
    }

    /// Advance the spinner and write out everything queued
    pub fn tick(&mut self) -> io::Result<()> {
        if self.busy && !self.was_busy {
            let start = self.spinner.start();
            self.enqueue(start, Priority::Medium);
            self.was_busy = true;
        }
        if self.busy {
            let frame = self.spinner.tick();
            self.enqueue(frame, Priority::Medium);
        } else if self.was_busy {
            self.stop_spinner();
        }
        self.restarted = false;
        self.drain()
    }

    /// Stop a running spinner and write out what is left
    pub fn finish(&mut self) -> io::Result<()> {
        if self.was_busy {
            self.stop_spinner();
        }
        self.busy = false;
        self.restarted = false;
        self.drain()
    }

    fn stop_spinner(&mut self) {
        let stop = self.spinner.stop();
        let priority = if self.restarted {
            Priority::Medium
        } else {
            Priority::High
        };
        self.enqueue(stop, priority);
        self.was_busy = false;
    }

    fn drain(&mut self) -> io::Result<()> {
        while let Some(Reverse(item)) = self.queue.pop() {
            self.out.write_all(item.output.as_bytes())?;
            if self.queue.is_empty() {
                self.out.flush()?;
            }
        }
        Ok(())
    }

    fn enqueue(&mut self, output: String, priority: Priority) {
        self.queue.push(Reverse(QueuedItem {
            priority,
            seq: self.seq,
            output,
        }));
        self.seq += 1;
    }

    fn render(&mut self, event: &Event) -> Vec<String> {
        match event {
            Event::MissingSource(unit) => vec![
                format!("{} (no source code found)\n", self.failure(unit)),
                "\n".to_string(),
            ],
            Event::BuildStarted(unit) => {
                let line = self.status("COMP", Color::Grey, unit);
                self.started(vec![line])
            }
            Event::BuildFinished(_) | Event::SolveFinished(_) => self.finished(),
            Event::BuildFailed {
                unit,
                stdout,
                stderr,
            } => {
                let mut items = self.finished();
                items.extend([self.failure(unit), "\n".to_string()]);
                items.extend(stdout.iter().cloned());
                items.extend(stderr.iter().cloned());
                items
            }
            Event::SolveStarted(unit) => {
                let line = self.status("EXEC", Color::Cyan, unit);
                self.started(vec![line])
            }
            Event::SolveFailed { unit, stderr } | Event::TimingFailed { unit, stderr } => {
                let mut items = self.finished();
                items.extend([self.failure(unit), "\n".to_string()]);
                items.extend(stderr.iter().cloned());
                items
            }
            Event::SolveAttempted { unit, actual } => vec![
                self.status("TRY", Color::Yellow, unit),
                "\n".to_string(),
                actual.trim_end().to_string(),
                "\n".to_string(),
            ],
            Event::SolveSucceeded(unit) => vec![self.success(unit)],
            Event::SolveIncorrect {
                unit,
                expected,
                actual,
            } => vec![
                self.failure(unit),
                "\n".to_string(),
                format::diff(expected, actual),
                "\n".to_string(),
            ],
            Event::OutputSaved { file, .. } => vec![
                format!("Saved result to {}", file.display()),
                "\n".to_string(),
            ],
            Event::TimingStarted(_) => {
                self.started(vec![" ".to_string(), paint("timing", Some(Color::Grey))])
            }
            Event::TimingSkipped(_) => vec!["\n".to_string()],
            Event::TimingFinished {
                unit,
                info,
                duration,
            } => {
                let mut items = self.finished();
                items.extend([
                    format!(
                        "{} {}",
                        self.success(unit),
                        format::timing_summary(info, *duration)
                    ),
                    "\n".to_string(),
                ]);
                items
            }
            Event::Terminate => invalid(event.kind(), "{}"),
        }
    }

    /// Mark the display busy after a `*-started` line.
    ///
    /// If the spinner was still drawn, the finished event before this one
    /// wiped its line within the same tick, so it restarts on the new line.
    fn started(&mut self, mut items: Vec<String>) -> Vec<String> {
        if self.was_busy {
            items.push(self.spinner.start());
            self.restarted = true;
        }
        self.busy = true;
        items
    }

    /// Clear the busy state and return to the start of the status line.
    ///
    /// A restart queued in this same tick has not been drawn over yet, so
    /// it is stopped in place before the line is overwritten.
    fn finished(&mut self) -> Vec<String> {
        self.busy = false;
        let mut items = Vec::new();
        if self.restarted {
            items.push(self.spinner.stop());
            self.restarted = false;
            self.was_busy = false;
        }
        items.push(CURSOR_RETURN.to_string());
        items
    }

    fn status(&self, label: &str, color: Color, unit: &UnitRef) -> String {
        format::status(label, color, unit, self.language_width)
    }

    fn success(&self, unit: &UnitRef) -> String {
        self.status("PASS", Color::Green, unit)
    }

    fn failure(&self, unit: &UnitRef) -> String {
        self.status("FAIL", Color::Red, unit)
    }
}

fn invalid(kind: &str, payload: &str) -> Vec<String> {
    vec![
        paint(
            &format!("Invalid command {} with arguments {}", kind, payload),
            Some(Color::Red),
        ),
        "\n".to_string(),
    ]
}

/// Display loop; runs on its own thread until the runner closes the channel.
///
/// Each tick drains every ready frame without blocking, then renders. A write
/// error ends the loop.
pub fn run_display<W: Write>(
    mut display: Display<W>,
    mut endpoint: Endpoint,
    tick: Duration,
) -> io::Result<()> {
    loop {
        while endpoint.poll() {
            match endpoint.recv() {
                Ok(incoming) => display.handle(&incoming),
                Err(_) => break,
            }
        }
        display.tick()?;

        if endpoint.is_closed() {
            debug!("Runner channel closed, stopping display");
            return display.finish();
        }
        std::thread::sleep(tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::pipe;
    use crate::core::event::{PartTiming, TimingInfo};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    const SPINNER_STOP: &str = "\x08\x08\x1b[K\x1b[?25h";

    fn unit() -> UnitRef {
        UnitRef::new("c", 2000, 2)
    }

    fn display() -> Display<Vec<u8>> {
        Display::new(Vec::new(), 4)
    }

    fn written(display: &Display<Vec<u8>>) -> String {
        String::from_utf8(display.get_ref().clone()).unwrap()
    }

    fn plain(text: &str) -> String {
        console::strip_ansi_codes(text).to_string()
    }

    /// Feed each event followed by one tick, then finish
    fn replay(events: &[Event]) -> String {
        let mut display = display();
        for event in events {
            display.handle(&event.clone().into());
            display.tick().unwrap();
        }
        display.finish().unwrap();
        written(&display)
    }

    fn verify_session() -> Vec<Event> {
        vec![
            Event::BuildStarted(unit()),
            Event::BuildFinished(unit()),
            Event::SolveStarted(unit()),
            Event::SolveFinished(unit()),
            Event::SolveSucceeded(unit()),
            Event::TimingStarted(unit()),
            Event::TimingFinished {
                unit: unit(),
                info: TimingInfo {
                    part1: PartTiming {
                        duration: 500.0,
                        iterations: 10,
                    },
                    part2: PartTiming {
                        duration: 1_500.0,
                        iterations: 5,
                    },
                },
                duration: 2_500,
            },
        ]
    }

    #[test]
    fn test_verify_session_output() {
        let output = plain(&replay(&verify_session()));

        assert!(output.starts_with("COMP [2000/02 c   ]"));
        assert!(output.contains("EXEC [2000/02 c   ]"));
        assert!(output.contains("PASS [2000/02 c   ] timing"));
        assert!(output.ends_with(
            "\rPASS [2000/02 c   ] (part1:  50.00 μs, part2: 300.00 μs, overhead: 500.00 μs)\n"
        ));
    }

    #[test]
    fn test_replay_is_deterministic() {
        let events = verify_session();
        assert_eq!(replay(&events), replay(&events));
    }

    #[test]
    fn test_attempt_and_save_output() {
        let output = plain(&replay(&[
            Event::SolveAttempted {
                unit: unit(),
                actual: "42\n7\n".into(),
            },
            Event::OutputSaved {
                unit: unit(),
                file: PathBuf::from("2000/02/output.txt"),
            },
        ]));

        assert_eq!(
            output,
            "TRY  [2000/02 c   ]\n42\n7\nSaved result to 2000/02/output.txt\n"
        );
    }

    #[test]
    fn test_missing_source() {
        let output = plain(&replay(&[Event::MissingSource(unit())]));
        assert_eq!(output, "FAIL [2000/02 c   ] (no source code found)\n\n");
    }

    #[test]
    fn test_build_failure_prints_both_streams() {
        let output = plain(&replay(&[
            Event::BuildStarted(unit()),
            Event::BuildFailed {
                unit: unit(),
                stdout: Some("src.ts(1,1): error TS2322\n".into()),
                stderr: Some("exit 2\n".into()),
            },
        ]));

        assert!(output.ends_with("\rFAIL [2000/02 c   ]\nsrc.ts(1,1): error TS2322\nexit 2\n"));
    }

    #[test]
    fn test_incorrect_shows_diff() {
        let output = plain(&replay(&[Event::SolveIncorrect {
            unit: unit(),
            expected: "42\n7".into(),
            actual: "42\n8".into(),
        }]));

        assert!(output.starts_with("FAIL [2000/02 c   ]\n┌"));
        assert!(output.contains("Part 2"));
        assert!(!output.contains("Part 1"));
        assert!(output.ends_with("┘\n"));
    }

    #[test]
    fn test_invalid_frame_is_reported() {
        let mut display = display();
        display.handle(&Incoming::decode(r#"{"kind":"solve-exploded","language":"c"}"#));
        display.tick().unwrap();

        assert_eq!(
            plain(&written(&display)),
            "Invalid command solve-exploded with arguments {\"language\":\"c\"}\n"
        );
    }

    #[test]
    fn test_terminate_is_a_protocol_error_for_the_display() {
        let output = plain(&replay(&[Event::Terminate]));
        assert!(output.starts_with("Invalid command terminate"));
    }

    #[test]
    fn test_spinner_runs_while_busy() {
        let mut display = display();
        display.handle(&Event::SolveStarted(unit()).into());
        display.tick().unwrap();
        display.tick().unwrap();

        let output = written(&display);
        assert!(output.contains("\x1b[?25l ⠋"));
        assert!(output.ends_with("\x08⠹"));
    }

    #[test]
    fn test_spinner_stop_renders_before_queued_output() {
        let mut display = display();
        display.handle(&Event::SolveStarted(unit()).into());
        display.tick().unwrap();
        let before = written(&display).len();

        display.handle(&Event::SolveFinished(unit()).into());
        display.tick().unwrap();

        let output = written(&display);
        assert_eq!(&output[before..], format!("{}{}", SPINNER_STOP, CURSOR_RETURN));
    }

    #[test]
    fn test_spinner_restarts_on_new_status_line() {
        let mut display = display();
        display.handle(&Event::BuildStarted(unit()).into());
        display.tick().unwrap();
        let before = written(&display).len();

        display.handle(&Event::BuildFinished(unit()).into());
        display.handle(&Event::SolveStarted(unit()).into());
        display.tick().unwrap();

        let output = written(&display);
        let tick_output = plain(&output[before..]);
        assert!(tick_output.starts_with("\rEXEC [2000/02 c   ] ⠋\x08⠙"));
    }

    #[test]
    fn test_unit_finishing_within_one_tick_restores_cursor() {
        let mut display = display();
        display.handle(&Event::BuildStarted(unit()).into());
        display.tick().unwrap();
        let before = written(&display).len();

        display.handle(&Event::BuildFinished(unit()).into());
        display.handle(&Event::SolveStarted(unit()).into());
        display.handle(&Event::SolveFinished(unit()).into());
        display.handle(&Event::SolveAttempted {
            unit: unit(),
            actual: "42\n7".into(),
        }
        .into());
        display.tick().unwrap();
        display.finish().unwrap();

        let output = written(&display);
        let last_hide = output.rfind("\x1b[?25l").unwrap();
        let last_show = output.rfind("\x1b[?25h").unwrap();
        assert!(last_show > last_hide, "cursor left hidden");
        assert!(plain(&output[before..]).ends_with("TRY  [2000/02 c   ]\n42\n7\n"));
    }

    #[test]
    fn test_restart_then_finish_without_tick_restores_cursor() {
        let mut display = display();
        display.handle(&Event::BuildStarted(unit()).into());
        display.tick().unwrap();

        display.handle(&Event::BuildFinished(unit()).into());
        display.handle(&Event::SolveStarted(unit()).into());
        display.finish().unwrap();

        assert!(written(&display).ends_with(SPINNER_STOP));
    }

    #[test]
    fn test_finish_stops_running_spinner() {
        let mut display = display();
        display.handle(&Event::TimingStarted(unit()).into());
        display.tick().unwrap();
        display.finish().unwrap();

        assert!(written(&display).ends_with(SPINNER_STOP));
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_run_display_drains_until_closed() {
        let (runner, display_end) = pipe();
        let buf = SharedBuf::default();
        let display = Display::new(buf.clone(), 4);

        let handle = std::thread::spawn(move || {
            run_display(display, display_end, Duration::from_millis(1))
        });

        runner.send(&Event::MissingSource(unit())).unwrap();
        runner
            .send(&Event::MissingSource(UnitRef::new("ruby", 2000, 2)))
            .unwrap();
        runner.close();

        handle.join().unwrap().unwrap();
        let output = plain(&String::from_utf8(buf.0.lock().unwrap().clone()).unwrap());
        assert_eq!(
            output,
            "FAIL [2000/02 c   ] (no source code found)\n\n\
             FAIL [2000/02 ruby] (no source code found)\n\n"
        );
    }

    #[test]
    fn test_run_display_fails_on_write_error() {
        let (runner, display_end) = pipe();
        runner.send(&Event::SolveStarted(unit())).unwrap();

        let result = run_display(Display::new(BrokenPipe, 4), display_end, Duration::from_millis(1));

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::BrokenPipe);
        drop(runner);
    }
}
