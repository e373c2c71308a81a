//! Terminal primitives: colours, cursor control, spinner, padded boxes, tables

use console::Style;

/// Move to the start of the line and clear it
pub const CURSOR_RETURN: &str = "\r\x1b[K";

const HIDE_CURSOR: &str = "\x1b[?25l";
const SHOW_CURSOR: &str = "\x1b[?25h";
const BACKSPACE: char = '\x08';

/// Colours used by the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Grey,
    Cyan,
    Yellow,
    Green,
    Red,
}

impl Color {
    fn style(self) -> Style {
        match self {
            Color::Grey => Style::new().black().bright(),
            Color::Cyan => Style::new().cyan(),
            Color::Yellow => Style::new().yellow(),
            Color::Green => Style::new().green(),
            Color::Red => Style::new().red(),
        }
    }
}

/// Apply an optional colour to a piece of text
pub fn paint(text: &str, color: Option<Color>) -> String {
    match color {
        Some(color) => color.style().apply_to(text).to_string(),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// Pad plain text to `width` characters, then colour it
pub fn boxed(text: &str, width: usize, align: Align, color: Option<Color>) -> String {
    let padded = match align {
        Align::Left => format!("{:<width$}", text, width = width),
        Align::Right => format!("{:>width$}", text, width = width),
    };
    paint(&padded, color)
}

const FRAMES: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Single-character spinner drawn at the end of the current line
#[derive(Debug, Default)]
pub struct Spinner {
    frame: usize,
}

impl Spinner {
    /// Hide the cursor and draw the first frame after a space
    pub fn start(&mut self) -> String {
        self.frame = 0;
        format!("{} {}", HIDE_CURSOR, FRAMES[0])
    }

    /// Replace the current frame with the next one
    pub fn tick(&mut self) -> String {
        self.frame = (self.frame + 1) % FRAMES.len();
        format!("{}{}", BACKSPACE, FRAMES[self.frame])
    }

    /// Erase the spinner and its leading space, then show the cursor again
    pub fn stop(&mut self) -> String {
        format!("{0}{0}\x1b[K{1}", BACKSPACE, SHOW_CURSOR)
    }
}

/// Box-drawn table; `row_colors` colours whole rows by index
pub fn table(rows: &[Vec<String>], row_colors: &[(usize, Color)]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|col| {
            rows.iter()
                .filter_map(|row| row.get(col))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let rule = |left: &str, mid: &str, right: &str| {
        let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        format!("{}{}{}\n", left, segments.join(mid), right)
    };

    let mut out = rule("┌", "┬", "┐");
    for (index, row) in rows.iter().enumerate() {
        let color = row_colors
            .iter()
            .find(|(row_index, _)| *row_index == index)
            .map(|(_, color)| *color);
        let cells: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(col, width)| {
                let cell = row.get(col).map(String::as_str).unwrap_or("");
                format!(" {} ", boxed(cell, *width, Align::Left, color))
            })
            .collect();
        out.push_str(&format!("│{}│\n", cells.join("│")));
        if index == 0 && rows.len() > 1 {
            out.push_str(&rule("├", "┼", "┤"));
        }
    }
    out.push_str(rule("└", "┴", "┘").trim_end_matches('\n'));
    out
}
