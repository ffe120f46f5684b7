//! SPF results and their dominance order.

use std::cmp::Ordering;
use std::fmt;

use super::mechanism::Qualifier;

/// SPF evaluation result (RFC 7208 Section 2.6).
///
/// Variants are declared in dominance order, so `Ord` ranks them
/// `Pass < Neutral < SoftFail < Fail < PermError < TempError < None`.
/// That order only matters when aggregating independent results; a record
/// walk stops at its first matching term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpfResult {
    /// Sender is authorized.
    Pass,
    /// No assertion made.
    Neutral,
    /// Weak authorization failure.
    SoftFail,
    /// Sender is NOT authorized.
    Fail,
    /// Permanent error (syntax, loop, too many lookups, ...).
    PermError,
    /// Transient DNS error.
    TempError,
    /// No SPF record found.
    None,
}

impl SpfResult {
    /// Fold results with `dominance_compare`. An empty input yields `None`.
    pub fn aggregate<I>(results: I) -> SpfResult
    where
        I: IntoIterator<Item = SpfResult>,
    {
        results
            .into_iter()
            .fold(SpfResult::None, dominance_compare)
    }

    /// True for the two error results.
    pub fn is_error(self) -> bool {
        matches!(self, SpfResult::PermError | SpfResult::TempError)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SpfResult::Pass => "pass",
            SpfResult::Neutral => "neutral",
            SpfResult::SoftFail => "softfail",
            SpfResult::Fail => "fail",
            SpfResult::PermError => "permerror",
            SpfResult::TempError => "temperror",
            SpfResult::None => "none",
        }
    }
}

impl fmt::Display for SpfResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Qualifier> for SpfResult {
    fn from(q: Qualifier) -> Self {
        qualifier_to_result(q)
    }
}

pub fn qualifier_to_result(q: Qualifier) -> SpfResult {
    match q {
        Qualifier::Pass => SpfResult::Pass,
        Qualifier::Fail => SpfResult::Fail,
        Qualifier::SoftFail => SpfResult::SoftFail,
        Qualifier::Neutral => SpfResult::Neutral,
    }
}

/// Returns whichever of `a` and `b` comes first in the dominance order.
pub fn dominance_compare(a: SpfResult, b: SpfResult) -> SpfResult {
    match a.cmp(&b) {
        Ordering::Greater => b,
        Ordering::Less | Ordering::Equal => a,
    }
}
