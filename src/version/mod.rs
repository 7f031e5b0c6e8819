// src/version/mod.rs

//! RPM version handling and capability range matching
//!
//! Implements the canonical RPM version comparison: epochs compare
//! numerically, then version and release are tokenized into alternating
//! alphabetic and numeric segments. Tilde (`~`) sorts before everything,
//! caret (`^`) sorts after the version but before the next segment,
//! numeric segments always beat alphabetic ones.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A parsed RPM version with epoch, version, and release components
///
/// Format: `[epoch:]version[-release]`. A missing epoch equals 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RpmVersion {
    pub epoch: u64,
    pub version: String,
    pub release: Option<String>,
}

impl RpmVersion {
    pub fn new(epoch: u64, version: impl Into<String>, release: Option<String>) -> Self {
        Self {
            epoch,
            version: version.into(),
            release,
        }
    }

    /// Parse an RPM version string
    ///
    /// Examples:
    /// - "1.2.3" → epoch=0, version="1.2.3", release=None
    /// - "2:1.2.3" → epoch=2, version="1.2.3", release=None
    /// - "1:2.3.4-5.el8" → epoch=1, version="2.3.4", release=Some("5.el8")
    pub fn parse(s: &str) -> Self {
        let (epoch_str, rest) = match s.find(':') {
            Some(pos) => (&s[..pos], &s[pos + 1..]),
            None => ("", s),
        };

        // empty or malformed epoch defaults to 0
        let epoch = epoch_str.parse::<u64>().unwrap_or(0);

        let (version, release) = match rest.find('-') {
            Some(pos) => (rest[..pos].to_string(), Some(rest[pos + 1..].to_string())),
            None => (rest.to_string(), None),
        };

        Self {
            epoch,
            version,
            release,
        }
    }

    /// Compare two RPM versions: epoch, then version, then release
    pub fn compare(&self, other: &RpmVersion) -> Ordering {
        match self.epoch.cmp(&other.epoch) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match rpmvercmp(&self.version, &other.version) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match (&self.release, &other.release) {
            (Some(a), Some(b)) => rpmvercmp(a, b),
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
        }
    }

    /// Range comparison: the release is consulted only when both sides
    /// carry one, so a bound of `1.2` matches any release of 1.2.
    pub fn compare_partial(&self, other: &RpmVersion) -> Ordering {
        match self.epoch.cmp(&other.epoch) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match rpmvercmp(&self.version, &other.version) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match (&self.release, &other.release) {
            (Some(a), Some(b)) => rpmvercmp(a, b),
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Display for RpmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl Ord for RpmVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for RpmVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Comparison sense of a capability entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryFlags {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl EntryFlags {
    /// Parse the `flags` attribute of an `<rpm:entry>` element
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EQ" => Some(Self::Eq),
            "LT" => Some(Self::Lt),
            "LE" => Some(Self::Le),
            "GT" => Some(Self::Gt),
            "GE" => Some(Self::Ge),
            _ => None,
        }
    }

    fn admits_less(self) -> bool {
        matches!(self, Self::Lt | Self::Le)
    }

    fn admits_greater(self) -> bool {
        matches!(self, Self::Gt | Self::Ge)
    }

    fn admits_equal(self) -> bool {
        matches!(self, Self::Eq | Self::Le | Self::Ge)
    }

    /// True when `version <flags> bound` holds
    pub fn satisfied_by(self, version: &RpmVersion, bound: &RpmVersion) -> bool {
        match version.compare_partial(bound) {
            Ordering::Less => self.admits_less(),
            Ordering::Equal => self.admits_equal(),
            Ordering::Greater => self.admits_greater(),
        }
    }
}

impl fmt::Display for EntryFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// Do two version ranges overlap?
///
/// `a` is the provider side, `b` the requestor side. The sense is the
/// comparison of a's bound against b's bound; either side admitting the
/// observed direction makes the ranges intersect.
pub fn ranges_overlap(
    a_flags: EntryFlags,
    a: &RpmVersion,
    b_flags: EntryFlags,
    b: &RpmVersion,
) -> bool {
    match a.compare_partial(b) {
        Ordering::Less => a_flags.admits_greater() || b_flags.admits_less(),
        Ordering::Greater => a_flags.admits_less() || b_flags.admits_greater(),
        Ordering::Equal => {
            (a_flags.admits_equal() && b_flags.admits_equal())
                || (a_flags.admits_less() && b_flags.admits_less())
                || (a_flags.admits_greater() && b_flags.admits_greater())
        }
    }
}

/// Canonical rpmvercmp over a single version or release string
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut i = 0;
    let mut j = 0;

    loop {
        // skip separators, but stop on segment starts and on ~ / ^
        while i < a.len() && !a[i].is_ascii_alphanumeric() && a[i] != b'~' && a[i] != b'^' {
            i += 1;
        }
        while j < b.len() && !b[j].is_ascii_alphanumeric() && b[j] != b'~' && b[j] != b'^' {
            j += 1;
        }

        let a_tilde = i < a.len() && a[i] == b'~';
        let b_tilde = j < b.len() && b[j] == b'~';
        if a_tilde || b_tilde {
            if a_tilde && b_tilde {
                i += 1;
                j += 1;
                continue;
            }
            return if a_tilde {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }

        let a_caret = i < a.len() && a[i] == b'^';
        let b_caret = j < b.len() && b[j] == b'^';
        if a_caret || b_caret {
            if a_caret && b_caret {
                i += 1;
                j += 1;
                continue;
            }
            // caret beats end of string but loses to any further segment
            if a_caret {
                return if j == b.len() {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
            }
            return if i == a.len() {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }

        if i == a.len() || j == b.len() {
            break;
        }

        let numeric = a[i].is_ascii_digit();
        let seg_a = take_segment(a, &mut i, numeric);
        let seg_b = take_segment(b, &mut j, numeric);

        // b had a segment of the other type; numeric always wins
        if seg_b.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if numeric {
            compare_numeric(seg_a, seg_b)
        } else {
            seg_a.cmp(seg_b)
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    // the string with segments left over is newer
    match (i == a.len(), j == b.len()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn take_segment<'a>(s: &'a [u8], pos: &mut usize, numeric: bool) -> &'a [u8] {
    let start = *pos;
    while *pos < s.len() {
        let c = s[*pos];
        let matches = if numeric {
            c.is_ascii_digit()
        } else {
            c.is_ascii_alphabetic()
        };
        if !matches {
            break;
        }
        *pos += 1;
    }
    &s[start..*pos]
}

fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    let a = strip_leading_zeros(a);
    let b = strip_leading_zeros(b);
    match a.len().cmp(&b.len()) {
        Ordering::Equal => a.cmp(b),
        ord => ord,
    }
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let mut i = 0;
    while i + 1 < s.len() && s[i] == b'0' {
        i += 1;
    }
    &s[i..]
}
