//! Formatting of status lines, durations, timing summaries and output diffs

use crate::core::event::{TimingInfo, UnitRef};

use super::term::{boxed, paint, table, Align, Color};

/// Pick the unit that keeps a microsecond value in `1 <= n < 1000`
pub fn scale(micros: f64) -> (f64, &'static str, Option<Color>) {
    if micros < 1.0 {
        (micros * 1000.0, "ns", Some(Color::Green))
    } else if micros < 1_000.0 {
        (micros, "μs", None)
    } else if micros < 1_000_000.0 {
        (micros / 1_000.0, "ms", Some(Color::Yellow))
    } else {
        (micros / 1_000_000.0, "s", Some(Color::Red))
    }
}

/// Render a microsecond duration right-aligned in a fixed-width box
pub fn duration(micros: f64) -> String {
    let (value, unit, color) = scale(micros);
    let width = format!("NNN.NN {}", unit).chars().count();
    boxed(&format!("{:.2} {}", value, unit), width, Align::Right, color)
}

/// `LABEL [YYYY/DD language]` with fixed-width label and language columns
pub fn status(label: &str, color: Color, unit: &UnitRef, language_width: usize) -> String {
    let text = format!(
        "{:<4} [{}/{:02} {:<width$}]",
        label,
        unit.year,
        unit.day,
        unit.language,
        width = language_width
    );
    paint(&text, Some(color))
}

/// `(part1: X, part2: Y, overhead: Z)` for a finished timing run
pub fn timing_summary(info: &TimingInfo, total_micros: u64) -> String {
    let part1 = info.part1.average();
    let part2 = info.part2.average();
    let overhead = (total_micros as f64 - info.part1.duration - info.part2.duration).max(0.0);

    // Seconds render one character narrower than the other units
    let spacer = |micros: f64| if micros >= 1_000_000.0 { " " } else { "" };

    format!(
        "(part1: {}, {}part2: {}, {}overhead: {}{})",
        duration(part1),
        spacer(part1),
        duration(part2),
        spacer(part2),
        duration(overhead),
        spacer(overhead)
    )
}

/// Table of the answer parts that differ between expected and actual output
pub fn diff(expected: &str, actual: &str) -> String {
    let expected: Vec<&str> = expected.split('\n').collect();
    let actual: Vec<&str> = actual.split('\n').collect();

    let mut rows = vec![
        vec![String::new()],
        vec!["Expected".to_string()],
        vec!["Actual".to_string()],
    ];
    for part in 0..2 {
        let want = expected.get(part).copied().unwrap_or("");
        let got = actual.get(part).copied();
        if got != Some(want) {
            rows[0].push(format!("Part {}", part + 1));
            rows[1].push(want.to_string());
            rows[2].push(got.unwrap_or("").to_string());
        }
    }

    table(&rows, &[(1, Color::Cyan), (2, Color::Yellow)])
}
