//! Per-check evaluation state.

use std::net::IpAddr;

use crate::common::domain;

use super::config::SpfConfig;
use super::macro_exp::MacroContext;
use super::SpfError;

/// Shared count of DNS-querying operations still allowed in one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LookupBudget {
    limit: u8,
    remaining: u8,
}

impl LookupBudget {
    pub(crate) fn new(limit: u8) -> Self {
        Self {
            limit,
            remaining: limit,
        }
    }

    pub(crate) fn remaining(&self) -> u8 {
        self.remaining
    }

    /// Spend one lookup, failing the check if none is left.
    pub(crate) fn consume(&mut self) -> Result<(), SpfError> {
        if self.try_consume() {
            Ok(())
        } else {
            Err(SpfError::LookupLimitExceeded(self.limit))
        }
    }

    /// Spend one lookup if any is left.
    pub(crate) fn try_consume(&mut self) -> bool {
        match self.remaining.checked_sub(1) {
            Some(left) => {
                self.remaining = left;
                true
            }
            None => false,
        }
    }
}

/// The `<sender>` identity split into its macro-visible parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Sender {
    pub full: String,
    pub local_part: String,
    pub domain: String,
}

impl Sender {
    /// Split `local@domain`. An empty local part becomes `postmaster`
    /// (RFC 7208 Section 4.3). A sender without exactly one `@`, or with an
    /// empty domain, is rejected.
    pub(crate) fn parse(sender: &str) -> Result<Self, SpfError> {
        let (local, domain) = domain::split_email(sender)
            .filter(|(local, domain)| !domain.is_empty() && !local.contains('@'))
            .ok_or_else(|| SpfError::InvalidSender(sender.to_string()))?;

        let local_part = if local.is_empty() { "postmaster" } else { local };
        Ok(Self {
            full: format!("{local_part}@{domain}"),
            local_part: local_part.to_string(),
            domain: domain.to_string(),
        })
    }
}

/// State threaded through one top-level check and all of its include and
/// redirect steps. The current domain is not stored here; each evaluation
/// frame carries its own.
#[derive(Debug)]
pub(crate) struct EvalContext {
    pub client_ip: IpAddr,
    pub sender: Sender,
    pub lookups: LookupBudget,
    visited: Vec<String>,
    depth_limit: usize,
}

impl EvalContext {
    pub(crate) fn new(client_ip: IpAddr, domain: &str, sender: &str, config: &SpfConfig) -> Result<Self, SpfError> {
        Ok(Self {
            client_ip: client_ip.to_canonical(),
            sender: Sender::parse(sender)?,
            lookups: LookupBudget::new(config.lookup_limit),
            visited: vec![domain::normalize(domain)],
            depth_limit: config.depth_limit,
        })
    }

    /// Record that evaluation is moving into `domain` via include or
    /// redirect. Returns a mark for [`EvalContext::leave`].
    pub(crate) fn enter(&mut self, target: &str) -> Result<usize, SpfError> {
        let target = domain::normalize(target);
        if self.visited.contains(&target) {
            return Err(SpfError::LoopDetected(target));
        }
        // visited[0] is the checked domain itself
        if self.visited.len() > self.depth_limit {
            return Err(SpfError::DepthLimitExceeded(target));
        }
        let mark = self.visited.len();
        self.visited.push(target);
        Ok(mark)
    }

    /// Forget every domain entered since `mark`, so sibling branches do not
    /// see each other's path.
    pub(crate) fn leave(&mut self, mark: usize) {
        self.visited.truncate(mark);
    }

    pub(crate) fn visited(&self) -> &[String] {
        &self.visited
    }

    pub(crate) fn macro_context<'a>(
        &'a self,
        domain: &'a str,
        validated_names: Option<&'a [String]>,
    ) -> MacroContext<'a> {
        MacroContext {
            sender: &self.sender.full,
            local_part: &self.sender.local_part,
            sender_domain: &self.sender.domain,
            domain,
            client_ip: self.client_ip,
            validated_names,
        }
    }
}
