//! SPF mechanism and directive types (RFC 7208 Section 5), and the
//! per-term grammar.

use std::fmt;

/// Qualifier prefix on a directive. Defaults to Pass if omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    Pass,     // +
    Fail,     // -
    SoftFail, // ~
    Neutral,  // ?
}

impl Qualifier {
    /// Parse a single-char qualifier prefix. Returns (Qualifier, remaining str).
    /// If no qualifier prefix, defaults to Pass.
    pub fn parse_prefix(s: &str) -> (Qualifier, &str) {
        match s.as_bytes().first() {
            Some(b'+') => (Qualifier::Pass, &s[1..]),
            Some(b'-') => (Qualifier::Fail, &s[1..]),
            Some(b'~') => (Qualifier::SoftFail, &s[1..]),
            Some(b'?') => (Qualifier::Neutral, &s[1..]),
            _ => (Qualifier::Pass, s),
        }
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qualifier::Pass => write!(f, "+"),
            Qualifier::Fail => write!(f, "-"),
            Qualifier::SoftFail => write!(f, "~"),
            Qualifier::Neutral => write!(f, "?"),
        }
    }
}

/// CIDR prefix lengths for A and MX mechanisms: `/n` applies to IPv4
/// answers, `//n` to IPv6 answers. An absent length means exact match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DualCidr {
    pub v4: Option<u32>,
    pub v6: Option<u32>,
}

/// SPF mechanism or modifier (RFC 7208 Sections 5 and 6).
///
/// Domain arguments are domain-specs and may still contain macros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mechanism {
    /// `all`
    All,
    /// `include:<domain-spec>`
    Include(String),
    /// `a[:<domain-spec>][/cidr4][//cidr6]`
    A {
        domain: Option<String>,
        cidr: DualCidr,
    },
    /// `mx[:<domain-spec>][/cidr4][//cidr6]`
    Mx {
        domain: Option<String>,
        cidr: DualCidr,
    },
    /// `ptr[:<domain-spec>]`
    Ptr(Option<String>),
    /// `ip4:<ip4-network>[/cidr]`. The address is kept as written; a
    /// malformed one simply never matches.
    Ip4 {
        addr: String,
        prefix_len: Option<u32>,
    },
    /// `ip6:<ip6-network>[/cidr]`
    Ip6 {
        addr: String,
        prefix_len: Option<u32>,
    },
    /// `exists:<domain-spec>`
    Exists(String),
    /// `redirect=<domain-spec>`
    Redirect(String),
    /// `exp=<domain-spec>`
    Exp(String),
    /// Any other `name=value` term, kept verbatim and ignored.
    Unknown(String),
}

impl Mechanism {
    /// Whether evaluating this term costs one unit of the DNS lookup budget.
    pub fn consumes_lookup(&self) -> bool {
        matches!(
            self,
            Mechanism::Include(_)
                | Mechanism::A { .. }
                | Mechanism::Mx { .. }
                | Mechanism::Ptr(_)
                | Mechanism::Exists(_)
                | Mechanism::Redirect(_)
        )
    }
}

/// A directive = qualifier + mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub qualifier: Qualifier,
    pub mechanism: Mechanism,
}

/// Error type for term parsing. Every variant names the offending term and
/// maps to PermError in evaluation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TermError {
    #[error("unrecognized term '{0}'")]
    Unrecognized(String),
    #[error("missing required argument in term '{0}'")]
    MissingArgument(String),
    #[error("unexpected argument in term '{0}'")]
    UnexpectedArgument(String),
    #[error("invalid CIDR prefix length in term '{0}'")]
    InvalidCidr(String),
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&s[prefix.len()..]),
        _ => None,
    }
}

/// Parse an unsigned decimal prefix length. Values too large for `u32` are
/// clamped; they are out of range for both families anyway.
fn parse_prefix_len(digits: &str, term: &str) -> Result<u32, TermError> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TermError::InvalidCidr(term.to_string()));
    }
    Ok(digits.parse::<u32>().unwrap_or(u32::MAX))
}

/// Parse a dual CIDR suffix like "/24", "//64", "/24//64" (or "").
fn parse_dual_cidr(s: &str, term: &str) -> Result<DualCidr, TermError> {
    let (v4_part, v6_part) = match s.find("//") {
        Some(pos) => (&s[..pos], Some(&s[pos + 2..])),
        None => (s, None),
    };

    let v4 = if v4_part.is_empty() {
        None
    } else {
        let digits = v4_part
            .strip_prefix('/')
            .ok_or_else(|| TermError::InvalidCidr(term.to_string()))?;
        Some(parse_prefix_len(digits, term)?)
    };
    let v6 = v6_part.map(|d| parse_prefix_len(d, term)).transpose()?;

    Ok(DualCidr { v4, v6 })
}

/// Split "domain-spec/cidr" at the first '/' that follows the last macro,
/// so delimiters like `%{l/}` stay in the domain part.
fn split_cidr(s: &str) -> (&str, &str) {
    let search_from = s.rfind('}').map_or(0, |i| i + 1);
    match s[search_from..].find('/') {
        Some(i) => s.split_at(search_from + i),
        None => (s, ""),
    }
}

/// `rest` is whatever follows the mechanism name: "", ":arg" or "/cidr".
fn parse_domain_and_cidr(rest: &str, term: &str) -> Result<(Option<String>, DualCidr), TermError> {
    match rest.strip_prefix(':') {
        Some(arg) => {
            let (domain, cidr) = split_cidr(arg);
            if domain.is_empty() {
                return Err(TermError::MissingArgument(term.to_string()));
            }
            Ok((Some(domain.to_string()), parse_dual_cidr(cidr, term)?))
        }
        None => Ok((None, parse_dual_cidr(rest, term)?)),
    }
}

fn required_domain(rest: &str, term: &str) -> Result<String, TermError> {
    match rest.strip_prefix(':') {
        Some(domain) if !domain.is_empty() => Ok(domain.to_string()),
        Some(_) => Err(TermError::MissingArgument(term.to_string())),
        None if rest.is_empty() => Err(TermError::MissingArgument(term.to_string())),
        None => Err(TermError::UnexpectedArgument(term.to_string())),
    }
}

fn parse_ip_network(rest: &str, term: &str) -> Result<(String, Option<u32>), TermError> {
    let network = required_domain(rest, term)?;
    match network.rsplit_once('/') {
        Some((addr, prefix)) => Ok((addr.to_string(), Some(parse_prefix_len(prefix, term)?))),
        None => Ok((network, None)),
    }
}

/// Parse one whitespace-delimited record term into a directive.
///
/// Mechanism and modifier names are case-insensitive. Unrecognized
/// `name=value` modifiers parse as [`Mechanism::Unknown`]; anything else that
/// is not a known mechanism is an error.
pub fn parse_term(term: &str) -> Result<Directive, TermError> {
    let (qualifier, body) = Qualifier::parse_prefix(term);

    let modifier = |value: &str, build: fn(String) -> Mechanism| {
        if value.is_empty() {
            Err(TermError::MissingArgument(term.to_string()))
        } else {
            Ok(build(value.to_string()))
        }
    };

    let mechanism = if let Some(value) = strip_prefix_ignore_case(body, "redirect=") {
        modifier(value, Mechanism::Redirect)?
    } else if let Some(value) = strip_prefix_ignore_case(body, "exp=") {
        modifier(value, Mechanism::Exp)?
    } else {
        let split = body.find(|c: char| c == ':' || c == '/').unwrap_or(body.len());
        let (name, rest) = body.split_at(split);

        match name.to_ascii_lowercase().as_str() {
            "all" if rest.is_empty() => Mechanism::All,
            "all" => return Err(TermError::UnexpectedArgument(term.to_string())),
            "include" => Mechanism::Include(required_domain(rest, term)?),
            "exists" => Mechanism::Exists(required_domain(rest, term)?),
            "a" => {
                let (domain, cidr) = parse_domain_and_cidr(rest, term)?;
                Mechanism::A { domain, cidr }
            }
            "mx" => {
                let (domain, cidr) = parse_domain_and_cidr(rest, term)?;
                Mechanism::Mx { domain, cidr }
            }
            "ptr" if rest.is_empty() => Mechanism::Ptr(None),
            "ptr" => Mechanism::Ptr(Some(required_domain(rest, term)?)),
            "ip4" => {
                let (addr, prefix_len) = parse_ip_network(rest, term)?;
                Mechanism::Ip4 { addr, prefix_len }
            }
            "ip6" => {
                let (addr, prefix_len) = parse_ip_network(rest, term)?;
                Mechanism::Ip6 { addr, prefix_len }
            }
            _ if body.contains('=') => Mechanism::Unknown(body.to_string()),
            _ => return Err(TermError::Unrecognized(term.to_string())),
        }
    };

    Ok(Directive {
        qualifier,
        mechanism,
    })
}

impl fmt::Display for DualCidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(v4) = self.v4 {
            write!(f, "/{v4}")?;
        }
        if let Some(v6) = self.v6 {
            write!(f, "//{v6}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mechanism::All => write!(f, "all"),
            Mechanism::Include(d) => write!(f, "include:{d}"),
            Mechanism::A { domain, cidr } => {
                write!(f, "a")?;
                if let Some(d) = domain {
                    write!(f, ":{d}")?;
                }
                write!(f, "{cidr}")
            }
            Mechanism::Mx { domain, cidr } => {
                write!(f, "mx")?;
                if let Some(d) = domain {
                    write!(f, ":{d}")?;
                }
                write!(f, "{cidr}")
            }
            Mechanism::Ptr(d) => {
                write!(f, "ptr")?;
                if let Some(d) = d {
                    write!(f, ":{d}")?;
                }
                Ok(())
            }
            Mechanism::Ip4 { addr, prefix_len } => {
                write!(f, "ip4:{addr}")?;
                if let Some(p) = prefix_len {
                    write!(f, "/{p}")?;
                }
                Ok(())
            }
            Mechanism::Ip6 { addr, prefix_len } => {
                write!(f, "ip6:{addr}")?;
                if let Some(p) = prefix_len {
                    write!(f, "/{p}")?;
                }
                Ok(())
            }
            Mechanism::Exists(d) => write!(f, "exists:{d}"),
            Mechanism::Redirect(d) => write!(f, "redirect={d}"),
            Mechanism::Exp(d) => write!(f, "exp={d}"),
            Mechanism::Unknown(raw) => write!(f, "{raw}"),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only print qualifier if not Pass (the default)
        if self.qualifier != Qualifier::Pass {
            write!(f, "{}", self.qualifier)?;
        }
        write!(f, "{}", self.mechanism)
    }
}
