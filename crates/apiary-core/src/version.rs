//! Version identifiers and the resolution algebra.
//!
//! A version is a calendar date plus a stability class. Clients pin to a
//! date-floor and a minimum stability; resolution returns the newest
//! available version that is at least as stable and no newer than the query.

use std::fmt;
use std::str::FromStr;

use time::format_description::BorrowedFormatItem;
use time::macros::{date, format_description};
use time::{Date, OffsetDateTime};

use crate::errors::VersionError;

/// Date at which stability suffixes stop mattering. Versions dated at or
/// after the pivot are treated as GA regardless of their suffix, and their
/// canonical strings drop the suffix.
pub const PIVOT_DATE: Date = date!(2024 - 10 - 15);

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Stability class of a version. The derive order gives the total order
/// WIP < Experimental < Beta < GA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stability {
    Wip,
    Experimental,
    Beta,
    Ga,
}

impl Stability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stability::Wip => "wip",
            Stability::Experimental => "experimental",
            Stability::Beta => "beta",
            Stability::Ga => "ga",
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stability {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wip" => Ok(Stability::Wip),
            "experimental" => Ok(Stability::Experimental),
            "beta" => Ok(Stability::Beta),
            "ga" => Ok(Stability::Ga),
            _ => Err(VersionError::Parse(s.to_string())),
        }
    }
}

/// A version identifier: `(date, stability)`, compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub date: Date,
    pub stability: Stability,
}

impl Version {
    pub fn new(date: Date, stability: Stability) -> Self {
        Self { date, stability }
    }

    /// Parse the textual form: strictly a 10-character `YYYY-MM-DD` (GA) or
    /// `YYYY-MM-DD~<stability>` with a known stability label.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let (date_part, stability) = if s.len() == 10 {
            (s, Stability::Ga)
        } else {
            match s.split_once('~') {
                Some((d, label)) if d.len() == 10 => {
                    let stability = label
                        .parse::<Stability>()
                        .map_err(|_| VersionError::Parse(s.to_string()))?;
                    (d, stability)
                }
                _ => return Err(VersionError::Parse(s.to_string())),
            }
        };
        let date =
            Date::parse(date_part, DATE_FORMAT).map_err(|_| VersionError::Parse(s.to_string()))?;
        Ok(Self { date, stability })
    }

    /// Stability under the pivot-date regime: versions at or after
    /// [`PIVOT_DATE`] are GA regardless of suffix.
    pub fn effective_stability(&self) -> Stability {
        if self.date >= PIVOT_DATE {
            Stability::Ga
        } else {
            self.stability
        }
    }

    /// The version with the pivot-date regime applied. Canonical strings
    /// (storage keys, collated version lists) are formed from this.
    pub fn canonical(&self) -> Self {
        Self {
            date: self.date,
            stability: self.effective_stability(),
        }
    }

    /// Same date, different stability. Used when echoing the stability a
    /// client asked for on a resolved version.
    pub fn with_stability(&self, stability: Stability) -> Self {
        Self {
            date: self.date,
            stability,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let date = self.date.format(DATE_FORMAT).map_err(|_| fmt::Error)?;
        match self.stability {
            Stability::Ga => f.write_str(&date),
            other => write!(f, "{date}~{other}"),
        }
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

/// Today's UTC date, day-granular. Substituted for stability-only queries.
pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}

/// An ordered, de-duplicated set of versions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSet(Vec<Version>);

impl VersionSet {
    pub fn new(mut versions: Vec<Version>) -> Self {
        versions.sort();
        versions.dedup();
        Self(versions)
    }

    pub fn insert(&mut self, version: Version) {
        if let Err(idx) = self.0.binary_search(&version) {
            self.0.insert(idx, version);
        }
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.0.binary_search(version).is_ok()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Version> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Version] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolve a query against the set: among versions no newer than the
    /// query date and at least as stable (under the pivot regime), pick the
    /// newest, breaking date ties by highest stability.
    pub fn resolve(&self, query: Version) -> Result<Version, VersionError> {
        self.0
            .iter()
            .copied()
            .filter(|v| {
                v.effective_stability() >= query.effective_stability() && v.date <= query.date
            })
            .max_by_key(|v| (v.date, v.effective_stability()))
            .ok_or(VersionError::NoMatchingVersion)
    }
}

impl FromIterator<Version> for VersionSet {
    fn from_iter<I: IntoIterator<Item = Version>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a VersionSet {
    type Item = &'a Version;
    type IntoIter = std::slice::Iter<'a, Version>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
