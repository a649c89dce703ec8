//! Human-readable byte sizes ("64MB", "16KB").

use std::fmt;
use thiserror::Error;

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const GB: usize = 1024 * MB;

/// Suffixes, longest first so "KB" is tried before "B".
const UNITS: &[(&str, usize)] = &[
    ("GB", GB),
    ("MB", MB),
    ("KB", KB),
    ("G", GB),
    ("M", MB),
    ("K", KB),
    ("B", 1),
];

/// Error parsing a size string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid size '{input}' - expected format like '4MB', '128KB', or '16384'")]
pub struct SizeParseError {
    input: String,
}

/// Parses a size string into bytes.
///
/// Accepts bare byte counts and the binary suffixes `K`/`KB`, `M`/`MB` and
/// `G`/`GB`, case-insensitively, with optional whitespace before the
/// suffix.
///
/// ```
/// use imagepipe::config::parse_size;
///
/// assert_eq!(parse_size("16384").unwrap(), 16384);
/// assert_eq!(parse_size("16 KB").unwrap(), 16 * 1024);
/// assert_eq!(parse_size("4mb").unwrap(), 4 * 1024 * 1024);
/// ```
pub fn parse_size(s: &str) -> Result<usize, SizeParseError> {
    let err = || SizeParseError {
        input: s.to_string(),
    };
    let trimmed = s.trim();
    let upper = trimmed.to_ascii_uppercase();

    let (digits, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, mult)| upper.strip_suffix(suffix).map(|rest| (rest, *mult)))
        .unwrap_or((upper.as_str(), 1));

    let digits = digits.trim_end();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }
    digits
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(err)
}

/// Formats bytes with the largest suffix that divides them exactly.
///
/// ```
/// use imagepipe::config::format_size;
///
/// assert_eq!(format_size(4 * 1024 * 1024), "4MB");
/// assert_eq!(format_size(1000), "1000");
/// ```
pub fn format_size(bytes: usize) -> String {
    [(GB, "GB"), (MB, "MB"), (KB, "KB")]
        .iter()
        .find(|(unit, _)| bytes >= *unit && bytes.is_multiple_of(*unit))
        .map(|(unit, suffix)| format!("{}{}", bytes / unit, suffix))
        .unwrap_or_else(|| bytes.to_string())
}

/// Byte count that parses from and displays as a human-readable size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Size(pub usize);

impl Size {
    pub fn bytes(self) -> usize {
        self.0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_size(self.0))
    }
}

impl std::str::FromStr for Size {
    type Err = SizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_size(s).map(Size)
    }
}
