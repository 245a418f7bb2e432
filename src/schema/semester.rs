//! Semester labels and academic terms.
//!
//! `Semester::of` is the single definition of how a calendar date maps to a
//! semester: months 1 through 6 belong to `{year}_spring`, every other month to
//! `{year}_fall`. The fact store registers it as the `semester_of` SQL function,
//! so schedule triggers, attendance inserts and partition names all agree.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{MirrorError, MirrorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Season {
    Spring,
    Fall,
}

impl Season {
    pub const fn as_str(self) -> &'static str {
        match self {
            Season::Spring => "spring",
            Season::Fall => "fall",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Semester {
    pub year: i32,
    pub season: Season,
}

impl Semester {
    pub fn of(date: NaiveDate) -> Self {
        let season = if (1..=6).contains(&date.month()) {
            Season::Spring
        } else {
            Season::Fall
        };

        Self {
            year: date.year(),
            season,
        }
    }

    /// The `{year}_{season}` label
    pub fn label(&self) -> String {
        self.to_string()
    }

    /// Physical table holding this semester's attendance rows
    pub fn partition_table(&self) -> String {
        format!("attendance_{}", self)
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.year, self.season.as_str())
    }
}

impl FromStr for Semester {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MirrorError::InvalidSemester(s.to_string());
        let (year, season) = s.split_once('_').ok_or_else(invalid)?;

        if year.is_empty() || !year.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let season = match season {
            "spring" => Season::Spring,
            "fall" => Season::Fall,
            _ => return Err(invalid()),
        };

        Ok(Self { year, season })
    }
}

/// Parse the date part of a stored timestamp (`YYYY-MM-DD[ HH:MM:SS]`)
pub fn parse_stored_date(value: &str) -> Option<NaiveDate> {
    let date_part = value.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// A named academic term: a closed date interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Term {
    pub fn new(name: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    /// Every Monday-to-Friday date in `[start, end]`
    pub fn working_days(&self) -> Vec<NaiveDate> {
        self.start
            .iter_days()
            .take_while(|d| *d <= self.end)
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .collect()
    }

    /// The semester every date of this term falls in
    pub fn semester(&self) -> MirrorResult<Semester> {
        if self.end < self.start {
            return Err(MirrorError::InvalidTerm {
                name: self.name.clone(),
                reason: format!("ends ({}) before it starts ({})", self.end, self.start),
            });
        }

        let first = Semester::of(self.start);
        let last = Semester::of(self.end);
        if first != last {
            return Err(MirrorError::InvalidTerm {
                name: self.name.clone(),
                reason: format!("spans two semesters ({} and {})", first, last),
            });
        }

        Ok(first)
    }
}

/// The six terms the dataset covers by default
pub fn default_terms() -> Vec<Term> {
    let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).expect("valid calendar date");

    vec![
        Term::new("2022_fall", d(2022, 9, 1), d(2022, 12, 20)),
        Term::new("2023_spring", d(2023, 2, 1), d(2023, 5, 31)),
        Term::new("2023_fall", d(2023, 9, 1), d(2023, 12, 20)),
        Term::new("2024_spring", d(2024, 2, 1), d(2024, 5, 31)),
        Term::new("2024_fall", d(2024, 9, 1), d(2024, 12, 20)),
        Term::new("2025_spring", d(2025, 2, 1), d(2025, 5, 31)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_boundaries() {
        assert_eq!(Semester::of(date(2024, 1, 1)).label(), "2024_spring");
        assert_eq!(Semester::of(date(2024, 6, 30)).label(), "2024_spring");
        assert_eq!(Semester::of(date(2024, 7, 1)).label(), "2024_fall");
        assert_eq!(Semester::of(date(2024, 12, 31)).label(), "2024_fall");
    }

    #[test]
    fn test_every_month_maps_to_one_label() {
        for month in 1..=12 {
            let expected = if month <= 6 { "2023_spring" } else { "2023_fall" };
            assert_eq!(Semester::of(date(2023, month, 15)).label(), expected);
        }
    }

    #[test]
    fn test_parse_label() {
        let s: Semester = "2025_spring".parse().unwrap();
        assert_eq!(s, Semester { year: 2025, season: Season::Spring });
        assert_eq!(s.partition_table(), "attendance_2025_spring");

        assert!("2025-spring".parse::<Semester>().is_err());
        assert!("2025_winter".parse::<Semester>().is_err());
        assert!("x1_fall".parse::<Semester>().is_err());
        assert!("_fall".parse::<Semester>().is_err());
    }

    #[test]
    fn test_parse_stored_date() {
        assert_eq!(
            parse_stored_date("2023-02-01 09:30:00"),
            Some(date(2023, 2, 1))
        );
        assert_eq!(parse_stored_date("2023-02-01"), Some(date(2023, 2, 1)));
        assert_eq!(parse_stored_date("tomorrow"), None);
        assert_eq!(parse_stored_date("2023-13-01"), None);
    }

    #[test]
    fn test_working_days_skip_weekends() {
        // 2024-03-01 is a Friday
        let term = Term::new("t", date(2024, 3, 1), date(2024, 3, 10));
        let days = term.working_days();
        assert_eq!(days.len(), 6);
        assert!(days
            .iter()
            .all(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)));
    }

    #[test]
    fn test_term_semester() {
        for term in default_terms() {
            assert_eq!(term.semester().unwrap().label(), term.name);
        }

        let straddling = Term::new("bad", date(2024, 5, 1), date(2024, 9, 1));
        assert!(straddling.semester().is_err());

        let backwards = Term::new("bad", date(2024, 5, 1), date(2024, 4, 1));
        assert!(backwards.semester().is_err());
    }
}
