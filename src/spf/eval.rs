use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::pin::Pin;

use tracing::{debug, instrument, trace};

use crate::common::cidr;
use crate::common::dns::DnsResolver;
use crate::common::domain;

use super::config::SpfConfig;
use super::context::EvalContext;
use super::macro_exp;
use super::mechanism::{parse_term, Directive, DualCidr, Mechanism};
use super::record::lookup_spf;
use super::{SpfError, SpfResult, SpfVerdict};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of evaluating one domain's record chain.
struct Evaluation {
    result: SpfResult,
    mechanism: Option<Directive>,
}

impl Evaluation {
    fn unmatched(result: SpfResult) -> Self {
        Self {
            result,
            mechanism: None,
        }
    }
}

/// SPF verifier
#[derive(Clone)]
pub struct SpfVerifier<R: DnsResolver> {
    resolver: R,
    config: SpfConfig,
}

impl<R: DnsResolver> SpfVerifier<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            config: SpfConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SpfConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the DNS lookup budget shared across one check.
    pub fn lookup_limit(mut self, limit: u8) -> Self {
        self.config.lookup_limit = limit;
        self
    }

    /// Set the maximum include/redirect depth.
    pub fn depth_limit(mut self, limit: usize) -> Self {
        self.config.depth_limit = limit;
        self
    }

    pub fn config(&self) -> &SpfConfig {
        &self.config
    }

    /// Evaluate SPF for the given parameters (RFC 7208 check_host()).
    ///
    /// `domain` that is not a plausible hostname yields `None` without any
    /// DNS traffic. `sender` must be `local@domain`; an empty local part is
    /// read as `postmaster`.
    #[instrument(level = "debug", skip(self, ip), fields(ip = %ip))]
    pub async fn check_host(&self, ip: IpAddr, domain: &str, sender: &str) -> SpfVerdict {
        if !domain::is_valid_hostname(domain) {
            debug!("not a valid hostname, no SPF check");
            return SpfVerdict::new(SpfResult::None);
        }

        let mut ctx = match EvalContext::new(ip, domain, sender, &self.config) {
            Ok(ctx) => ctx,
            Err(e) => {
                debug!(error = %e, "rejecting sender");
                return SpfVerdict::from_error(e);
            }
        };

        match self.evaluate(domain::normalize(domain), &mut ctx).await {
            Ok(evaluation) => {
                debug!(
                    result = %evaluation.result,
                    lookups_left = ctx.lookups.remaining(),
                    "SPF check complete"
                );
                SpfVerdict {
                    result: evaluation.result,
                    error: None,
                    mechanism: evaluation.mechanism,
                }
            }
            Err(e) => {
                debug!(error = %e, result = %e.result(), "SPF check failed");
                SpfVerdict::from_error(e)
            }
        }
    }

    /// Walk `domain`'s record, following redirects in place. Boxed because
    /// `include` recurses back into it.
    fn evaluate<'a>(
        &'a self,
        domain: String,
        ctx: &'a mut EvalContext,
    ) -> BoxFuture<'a, Result<Evaluation, SpfError>> {
        Box::pin(async move {
            let mut domain = domain;
            loop {
                let Some(record) = lookup_spf(&self.resolver, &domain).await? else {
                    debug!(%domain, "no SPF record");
                    return Ok(Evaluation::unmatched(SpfResult::None));
                };
                trace!(%domain, record = record.as_str(), "evaluating SPF record");

                let mut redirect: Option<String> = None;
                for term in record.terms() {
                    let directive = parse_term(term)?;
                    if directive.mechanism.consumes_lookup() {
                        ctx.lookups.consume()?;
                    }

                    let hit = match &directive.mechanism {
                        Mechanism::Redirect(spec) => {
                            if redirect.replace(spec.clone()).is_some() {
                                return Err(SpfError::DuplicateRedirect);
                            }
                            false
                        }
                        Mechanism::Include(spec) => self.include(spec, &domain, ctx).await?,
                        mechanism => self.matches(mechanism, &domain, ctx).await?,
                    };
                    trace!(%domain, %directive, hit, "evaluated term");

                    if hit {
                        let result = SpfResult::from(directive.qualifier);
                        debug!(%domain, %directive, %result, "directive matched");
                        return Ok(Evaluation {
                            result,
                            mechanism: Some(directive),
                        });
                    }
                }

                let Some(spec) = redirect else {
                    return Ok(Evaluation::unmatched(SpfResult::Neutral));
                };
                let target = self.expand_target(&spec, &domain, ctx).await?;
                ctx.enter(&target)?;
                debug!(from = %domain, to = %target, "following redirect");
                domain = domain::normalize(&target);
            }
        })
    }

    /// `include:` hits only when the included record evaluates to Pass.
    async fn include(&self, spec: &str, domain: &str, ctx: &mut EvalContext) -> Result<bool, SpfError> {
        let target = self.expand_target(spec, domain, ctx).await?;
        let mark = ctx.enter(&target)?;
        debug!(from = %domain, to = %target, depth = ctx.visited().len() - 1, "entering include");

        let inner = self.evaluate(domain::normalize(&target), ctx).await?;
        ctx.leave(mark);

        debug!(include = %target, result = %inner.result, "include evaluated");
        Ok(inner.result == SpfResult::Pass)
    }

    async fn matches(&self, mechanism: &Mechanism, domain: &str, ctx: &mut EvalContext) -> Result<bool, SpfError> {
        let ip = ctx.client_ip;
        match mechanism {
            Mechanism::All => Ok(true),

            Mechanism::Ip4 { addr, prefix_len } => Ok(match (ip, addr.parse::<Ipv4Addr>()) {
                (IpAddr::V4(client), Ok(network)) => {
                    cidr::ip4_in_network(client, network, prefix_len.unwrap_or(32))
                }
                _ => false,
            }),

            Mechanism::Ip6 { addr, prefix_len } => Ok(match (ip, addr.parse::<Ipv6Addr>()) {
                (IpAddr::V6(client), Ok(network)) => {
                    cidr::ip6_in_network(client, network, prefix_len.unwrap_or(128))
                }
                _ => false,
            }),

            Mechanism::A { domain: spec, cidr } => {
                let target = self.target_or_current(spec.as_deref(), domain, ctx).await?;
                Ok(self.any_address_matches(&target, ip, cidr).await)
            }

            Mechanism::Mx { domain: spec, cidr } => {
                let target = self.target_or_current(spec.as_deref(), domain, ctx).await?;
                let hosts = match self.resolver.query_mx(&target).await {
                    Ok(hosts) => hosts,
                    Err(e) => {
                        debug!(domain = %target, error = %e, "MX lookup failed, no match");
                        return Ok(false);
                    }
                };
                for mx in hosts {
                    if !ctx.lookups.try_consume() {
                        debug!(domain = %target, "lookup budget exhausted resolving MX hosts");
                        return Ok(false);
                    }
                    if self.any_address_matches(&mx.host, ip, cidr).await {
                        return Ok(true);
                    }
                }
                Ok(false)
            }

            Mechanism::Ptr(spec) => {
                let target = self.target_or_current(spec.as_deref(), domain, ctx).await?;
                match self.resolver.query_ptr(ip).await {
                    Ok(names) => Ok(names
                        .iter()
                        .any(|name| domain::is_same_or_subdomain_of(name, &target))),
                    Err(e) => {
                        debug!(%ip, error = %e, "PTR lookup failed, no match");
                        Ok(false)
                    }
                }
            }

            Mechanism::Exists(spec) => {
                let target = self.expand_target(spec, domain, ctx).await?;
                match self.resolver.query_addrs(&target).await {
                    Ok(addrs) => Ok(!addrs.is_empty()),
                    Err(e) => {
                        trace!(domain = %target, error = %e, "exists lookup found nothing");
                        Ok(false)
                    }
                }
            }

            // Handled by the record walk.
            Mechanism::Include(_) | Mechanism::Redirect(_) => Ok(false),

            Mechanism::Exp(_) | Mechanism::Unknown(_) => Ok(false),
        }
    }

    async fn target_or_current(
        &self,
        spec: Option<&str>,
        domain: &str,
        ctx: &mut EvalContext,
    ) -> Result<String, SpfError> {
        match spec {
            Some(spec) => self.expand_target(spec, domain, ctx).await,
            None => Ok(domain.to_string()),
        }
    }

    /// Macro-expand a domain-spec in the context of `domain`. A `%{p}`
    /// reference costs one lookup for the reverse query.
    async fn expand_target(&self, spec: &str, domain: &str, ctx: &mut EvalContext) -> Result<String, SpfError> {
        let validated_names = if macro_exp::references_validated_name(spec) {
            ctx.lookups.consume()?;
            let names = match self.resolver.query_ptr(ctx.client_ip).await {
                Ok(names) => names,
                Err(e) => {
                    debug!(ip = %ctx.client_ip, error = %e, "PTR lookup for %{{p}} failed");
                    Vec::new()
                }
            };
            Some(names)
        } else {
            None
        };

        let macro_ctx = ctx.macro_context(domain, validated_names.as_deref());
        Ok(macro_exp::expand(spec, &macro_ctx)?)
    }

    async fn any_address_matches(&self, host: &str, ip: IpAddr, cidr: &DualCidr) -> bool {
        match self.resolver.query_addrs(host).await {
            Ok(addrs) => addrs
                .into_iter()
                .any(|addr| cidr::ip_in_network(ip, addr.to_canonical(), cidr.v4, cidr.v6)),
            Err(e) => {
                debug!(domain = host, error = %e, "address lookup failed, no match");
                false
            }
        }
    }
}

/// Convenience function for a one-off check with the default limits.
pub async fn check_host<R: DnsResolver>(resolver: &R, ip: IpAddr, domain: &str, sender: &str) -> SpfVerdict {
    SpfVerifier::new(resolver.clone())
        .check_host(ip, domain, sender)
        .await
}
