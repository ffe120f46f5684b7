//! Sender Policy Framework, RFC 7208 `check_host()`.

mod config;
mod context;
mod eval;
pub mod macro_exp;
mod mechanism;
mod record;
mod result;

pub use config::{SpfConfig, DEFAULT_DEPTH_LIMIT, DEFAULT_LOOKUP_LIMIT};
pub use eval::{check_host, SpfVerifier};
pub use mechanism::{parse_term, Directive, DualCidr, Mechanism, Qualifier, TermError};
pub use record::{is_spf_record, lookup_spf, select_record, SpfRecord};
pub use result::{dominance_compare, qualifier_to_result, SpfResult};

use thiserror::Error;

use crate::common::dns::DnsError;

use macro_exp::MacroError;

/// Why a check ended in TempError or PermError.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpfError {
    #[error("invalid sender '{0}', expected local@domain")]
    InvalidSender(String),
    #[error("DNS lookup of SPF record for {domain} failed: {source}")]
    Dns {
        domain: String,
        #[source]
        source: DnsError,
    },
    #[error("more than one SPF record published for {0}")]
    MultipleRecords(String),
    #[error(transparent)]
    Term(#[from] TermError),
    #[error("macro expansion failed: {0}")]
    Macro(#[from] MacroError),
    #[error("DNS lookup limit of {0} exceeded")]
    LookupLimitExceeded(u8),
    #[error("SPF record loop detected at {0}")]
    LoopDetected(String),
    #[error("include/redirect depth limit reached at {0}")]
    DepthLimitExceeded(String),
    #[error("more than one redirect modifier")]
    DuplicateRedirect,
}

impl SpfError {
    /// The result this error produces. Only a failed record fetch is
    /// temporary.
    pub fn result(&self) -> SpfResult {
        match self {
            SpfError::Dns { .. } => SpfResult::TempError,
            _ => SpfResult::PermError,
        }
    }
}

/// Outcome of one `check_host()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpfVerdict {
    pub result: SpfResult,
    /// Set when `result` is TempError or PermError.
    pub error: Option<SpfError>,
    /// The directive that decided the result, when one matched.
    pub mechanism: Option<Directive>,
}

impl SpfVerdict {
    pub(crate) fn new(result: SpfResult) -> Self {
        Self {
            result,
            error: None,
            mechanism: None,
        }
    }

    pub(crate) fn from_error(error: SpfError) -> Self {
        Self {
            result: error.result(),
            error: Some(error),
            mechanism: None,
        }
    }

    /// Split into the `(result, error)` pair.
    pub fn into_parts(self) -> (SpfResult, Option<SpfError>) {
        (self.result, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn only_dns_failure_is_temporary() {
        let dns = SpfError::Dns {
            domain: "example.com".into(),
            source: DnsError::Timeout,
        };
        assert_eq!(dns.result(), SpfResult::TempError);
        assert_eq!(SpfError::LookupLimitExceeded(10).result(), SpfResult::PermError);
        assert_eq!(
            SpfError::Macro(MacroError::UnknownLetter('z')).result(),
            SpfResult::PermError
        );
    }

    #[test]
    fn verdict_from_error() {
        let verdict = SpfVerdict::from_error(SpfError::DuplicateRedirect);
        assert_eq!(
            verdict.into_parts(),
            (SpfResult::PermError, Some(SpfError::DuplicateRedirect))
        );
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            SpfError::MultipleRecords("example.com".into()).to_string(),
            "more than one SPF record published for example.com"
        );
        assert_eq!(
            SpfError::Term(TermError::Unrecognized("foo".into())).to_string(),
            TermError::Unrecognized("foo".into()).to_string()
        );
    }
}
