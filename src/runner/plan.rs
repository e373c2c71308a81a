//! Locating puzzle days and their saved output
//!
//! Solutions live under `<root>/<year>/<dd>/main.<ext>`; a day's recorded
//! answer lives next to them in `output.txt`.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::SolverError;

/// Name of the saved expected-output file inside a day directory
pub const OUTPUT_FILE: &str = "output.txt";

/// A puzzle day ready to be solved
#[derive(Debug, Clone, PartialEq)]
pub struct Day {
    pub year: u32,
    pub day: u32,
    /// Day directory relative to the solutions root
    pub dir: PathBuf,
    /// Previously recorded output, if any
    pub expected: Option<String>,
}

impl Day {
    /// Open a day directory and read its saved output
    pub fn open(root: &Path, year: u32, day: u32) -> Result<Self, SolverError> {
        if !root.join(year.to_string()).is_dir() {
            return Err(SolverError::Discovery(format!(
                "No source code exists for year {}",
                year
            )));
        }
        let dir = day_dir(year, day);
        if !root.join(&dir).is_dir() {
            return Err(SolverError::Discovery(format!(
                "No source code exists for day {} in {}",
                day, year
            )));
        }

        let outfile = root.join(&dir).join(OUTPUT_FILE);
        let expected = if outfile.is_file() {
            let content = fs::read_to_string(&outfile).map_err(|e| {
                SolverError::Other(anyhow::anyhow!(
                    "Failed to read {}: {}",
                    outfile.display(),
                    e
                ))
            })?;
            Some(content)
        } else {
            None
        };

        Ok(Self {
            year,
            day,
            dir,
            expected,
        })
    }

    /// Saved-output file relative to the solutions root
    pub fn outfile(&self) -> PathBuf {
        self.dir.join(OUTPUT_FILE)
    }

    /// Source file for a language extension, relative to the solutions root
    pub fn source(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("main.{}", extension))
    }
}

fn day_dir(year: u32, day: u32) -> PathBuf {
    PathBuf::from(year.to_string()).join(format!("{:02}", day))
}

/// Whether a day already has recorded output
pub fn has_saved_output(root: &Path, year: u32, day: u32) -> bool {
    root.join(day_dir(year, day)).join(OUTPUT_FILE).is_file()
}

/// All days of a year that have a `<dd>` directory, in ascending order
pub fn discover_days(root: &Path, year: u32) -> Result<Vec<u32>, SolverError> {
    let year_dir = root.join(year.to_string());
    let mut days: Vec<u32> = WalkDir::new(&year_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?;
            if name.len() == 2 && name.chars().all(|c| c.is_ascii_digit()) {
                name.parse().ok()
            } else {
                None
            }
        })
        .collect();

    if days.is_empty() {
        return Err(SolverError::Discovery(format!(
            "No solutions found for {}",
            year
        )));
    }
    days.sort_unstable();
    debug!("Discovered {} days for {}", days.len(), year);
    Ok(days)
}

/// Everything the runner needs for one invocation
#[derive(Debug, Clone)]
pub struct Plan {
    pub days: Vec<Day>,
    /// Canonical language names, in the order they should run
    pub languages: Vec<String>,
    /// Record the output of days without saved output
    pub save: bool,
}

impl Plan {
    /// Resolve the days to run; fails before any unit runs if a directory is missing
    pub fn discover(
        root: &Path,
        year: u32,
        day: Option<u32>,
        languages: Vec<String>,
        save: bool,
    ) -> Result<Self, SolverError> {
        let day_numbers = match day {
            Some(day) => vec![day],
            None => {
                if !root.join(year.to_string()).is_dir() {
                    return Err(SolverError::Discovery(format!(
                        "No source code exists for year {}",
                        year
                    )));
                }
                discover_days(root, year)?
            }
        };

        let days = day_numbers
            .into_iter()
            .map(|day| Day::open(root, year, day))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            days,
            languages,
            save,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(dirs: &[&str]) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        for dir in dirs {
            fs::create_dir_all(root.path().join(dir)).unwrap();
        }
        root
    }

    #[test]
    fn test_open_day_without_saved_output() {
        let root = layout(&["2000/02"]);
        let day = Day::open(root.path(), 2000, 2).unwrap();

        assert_eq!(day.dir, PathBuf::from("2000/02"));
        assert_eq!(day.expected, None);
        assert_eq!(day.outfile(), PathBuf::from("2000/02/output.txt"));
        assert_eq!(day.source("rb"), PathBuf::from("2000/02/main.rb"));
        assert!(!has_saved_output(root.path(), 2000, 2));
    }

    #[test]
    fn test_open_day_with_saved_output() {
        let root = layout(&["2000/02"]);
        fs::write(root.path().join("2000/02/output.txt"), "42\n7").unwrap();

        let day = Day::open(root.path(), 2000, 2).unwrap();
        assert_eq!(day.expected.as_deref(), Some("42\n7"));
        assert!(has_saved_output(root.path(), 2000, 2));
    }

    #[test]
    fn test_missing_directories_are_discovery_errors() {
        let root = layout(&["2000/02"]);

        let err = Day::open(root.path(), 1999, 1).unwrap_err();
        assert_eq!(err.to_string(), "No source code exists for year 1999");

        let err = Day::open(root.path(), 2000, 3).unwrap_err();
        assert_eq!(err.to_string(), "No source code exists for day 3 in 2000");
    }

    #[test]
    fn test_discover_days_sorted_and_filtered() {
        let root = layout(&["2000/10", "2000/02", "2000/01", "2000/lib", "2000/123"]);
        fs::write(root.path().join("2000/03"), "not a directory").unwrap();

        assert_eq!(discover_days(root.path(), 2000).unwrap(), vec![1, 2, 10]);
    }

    #[test]
    fn test_discover_empty_year() {
        let root = layout(&["2000/lib"]);
        assert!(matches!(
            discover_days(root.path(), 2000),
            Err(SolverError::Discovery(_))
        ));
    }

    #[test]
    fn test_plan_for_whole_year() {
        let root = layout(&["2000/01", "2000/02"]);
        let plan = Plan::discover(root.path(), 2000, None, vec!["ruby".into()], false).unwrap();

        let days: Vec<u32> = plan.days.iter().map(|d| d.day).collect();
        assert_eq!(days, vec![1, 2]);
        assert_eq!(plan.languages, vec!["ruby"]);
    }

    #[test]
    fn test_plan_missing_year() {
        let root = layout(&[]);
        let err = Plan::discover(root.path(), 2000, None, vec![], false).unwrap_err();
        assert_eq!(err.to_string(), "No source code exists for year 2000");
    }
}
