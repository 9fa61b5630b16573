// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// Rich error type for buffer and layer operations.
///
/// Carries a non-exhaustive [`ErrorKind`] plus the offending index or range
/// and the bound it was checked against, so callers can produce a useful
/// diagnostic without re-deriving context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    /// The non-exhaustive category describing this error.
    kind: ErrorKind,

    /// The start index (or the single index) provided by the caller.
    start: usize,

    /// The end index (exclusive) provided by the caller. Equal to `start`
    /// for single-index failures.
    end: usize,

    /// The valid bound (paragraph count or byte length) at the time of
    /// failure.
    bound: usize,
}

impl Error {
    /// The machine-readable category for this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The start index of the range provided by the caller.
    pub fn start(&self) -> usize {
        self.start
    }

    /// The end index of the range provided by the caller.
    pub fn end(&self) -> usize {
        self.end
    }

    /// The bound the failing index or range was checked against.
    pub fn bound(&self) -> usize {
        self.bound
    }

    pub(crate) fn out_of_range(index: usize, bound: usize) -> Self {
        Self {
            kind: ErrorKind::OutOfRange,
            start: index,
            end: index,
            bound,
        }
    }

    pub(crate) fn invalid_range(start: usize, end: usize, bound: usize) -> Self {
        Self {
            kind: ErrorKind::InvalidRange,
            start,
            end,
            bound,
        }
    }

    pub(crate) fn invariant_violation(bound: usize) -> Self {
        Self {
            kind: ErrorKind::InvariantViolation,
            start: 0,
            end: bound,
            bound,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind {
            ErrorKind::OutOfRange => write!(
                f,
                "index {} out of range for bound {}",
                self.start, self.bound
            ),
            ErrorKind::InvalidRange => {
                write!(
                    f,
                    "invalid range {}..{} for bound {}",
                    self.start, self.end, self.bound
                )
            }
            ErrorKind::InvariantViolation => {
                write!(
                    f,
                    "cumulative index out of sync over {} paragraphs; rebuilt",
                    self.bound
                )
            }
        }
    }
}

impl core::error::Error for Error {}

/// The non-exhaustive category of an error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An index or offset was outside the valid bounds.
    OutOfRange,

    /// A provided range had `start > end` or extended past the valid bound.
    InvalidRange,

    /// A cumulative index disagreed with the data it summarizes. The
    /// reporter has already rebuilt the index; this error exists so the
    /// recovery can be logged upstream.
    InvariantViolation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn display_out_of_range() {
        let e = Error::out_of_range(7, 3);
        assert_eq!(e.kind(), ErrorKind::OutOfRange);
        let msg = format!("{}", e);
        assert!(msg.contains("index 7"));
        assert!(msg.contains("bound 3"));
    }

    #[test]
    fn display_invalid_range() {
        let e = Error::invalid_range(5, 2, 10);
        assert_eq!(e.kind(), ErrorKind::InvalidRange);
        assert_eq!(e.start(), 5);
        assert_eq!(e.end(), 2);
        let msg = format!("{}", e);
        assert!(msg.contains("5..2"));
    }

    #[test]
    fn display_invariant_violation() {
        let e = Error::invariant_violation(42);
        assert_eq!(e.kind(), ErrorKind::InvariantViolation);
        let msg = format!("{}", e);
        assert!(msg.contains("42 paragraphs"));
    }
}
