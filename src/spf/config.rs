//! Tunables for SPF evaluation.

use serde::{Deserialize, Serialize};

/// RFC 7208 Section 4.6.4: at most 10 DNS-querying terms per check.
pub const DEFAULT_LOOKUP_LIMIT: u8 = 10;
/// Upper bound on the include/redirect path length.
pub const DEFAULT_DEPTH_LIMIT: usize = 100;

/// Evaluation limits, deserializable from the embedding application's own
/// configuration. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpfConfig {
    /// Budget shared by `include`, `a`, `mx`, `ptr`, `exists`, `redirect`,
    /// each MX host resolution and each `%{p}` reverse lookup.
    pub lookup_limit: u8,
    /// Maximum number of include/redirect hops below the checked domain.
    pub depth_limit: usize,
}

impl Default for SpfConfig {
    fn default() -> Self {
        Self {
            lookup_limit: DEFAULT_LOOKUP_LIMIT,
            depth_limit: DEFAULT_DEPTH_LIMIT,
        }
    }
}
