//! SPF macro expansion (RFC 7208 Section 7)
//!
//! Expansion is a pure string transformation. The one macro that needs DNS,
//! `%{p}`, reads reverse names the caller looked up beforehand (see
//! [`references_validated_name`]).

use std::net::IpAddr;

use thiserror::Error;

/// Letters accepted as the first character of a macro body.
const MACRO_LETTERS: &str = "slodipvh";
/// Characters accepted as delimiters after the optional digits and `r`.
const MACRO_DELIMITERS: &str = ".-+,/_=";
const MAX_RIGHT_TRIM: u32 = 127;

/// Context for macro expansion
#[derive(Debug, Clone, Copy)]
pub struct MacroContext<'a> {
    pub sender: &'a str,        // local-part@domain (s)
    pub local_part: &'a str,    // (l)
    pub sender_domain: &'a str, // (o)
    pub domain: &'a str,        // current domain being evaluated (d, h)
    pub client_ip: IpAddr,      // connecting IP (i, v)
    /// Reverse names of `client_ip`, when the caller resolved them (p).
    pub validated_names: Option<&'a [String]>,
}

impl<'a> MacroContext<'a> {
    fn validated_name(&self) -> Result<String, MacroError> {
        match self.validated_names {
            Some([name]) => Ok(name.strip_suffix('.').unwrap_or(name).to_string()),
            Some(names) => Err(MacroError::ValidatedName(names.len())),
            None => Err(MacroError::ValidatedName(0)),
        }
    }

    fn ip_version(&self) -> &'static str {
        match self.client_ip {
            IpAddr::V4(_) => "in-addr",
            IpAddr::V6(_) => "ip6",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacroError {
    #[error("empty macro '%{{}}'")]
    Empty,
    #[error("unknown macro letter '{0}'")]
    UnknownLetter(char),
    #[error("macro right-trim count {0} exceeds 127")]
    TrimTooLarge(String),
    #[error("invalid delimiter '{1}' in macro '%{{{0}}}'")]
    InvalidDelimiter(String, char),
    #[error("%{{p}} needs exactly one reverse name for the client, found {0}")]
    ValidatedName(usize),
}

/// A parsed macro body: `<letter>[<digits>][r][<delimiters>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MacroSpec {
    letter: char,
    right_trim: Option<u32>,
    reverse: bool,
    delimiters: Vec<char>,
}

impl MacroSpec {
    fn parse(body: &str) -> Result<Self, MacroError> {
        let body = body.to_ascii_lowercase();
        let mut chars = body.chars().peekable();

        let letter = chars.next().ok_or(MacroError::Empty)?;
        if !MACRO_LETTERS.contains(letter) {
            return Err(MacroError::UnknownLetter(letter));
        }

        let mut digits = String::new();
        while let Some(c) = chars.next_if(char::is_ascii_digit) {
            digits.push(c);
        }
        let right_trim = if digits.is_empty() {
            None
        } else {
            let n = digits
                .parse::<u32>()
                .ok()
                .filter(|n| *n <= MAX_RIGHT_TRIM)
                .ok_or_else(|| MacroError::TrimTooLarge(digits.clone()))?;
            Some(n)
        };

        let reverse = chars.next_if_eq(&'r').is_some();

        let delimiters = chars
            .map(|c| {
                if MACRO_DELIMITERS.contains(c) {
                    Ok(c)
                } else {
                    Err(MacroError::InvalidDelimiter(body.clone(), c))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            letter,
            right_trim,
            reverse,
            delimiters,
        })
    }

    fn expand(&self, ctx: &MacroContext<'_>) -> Result<String, MacroError> {
        let raw = match self.letter {
            's' => ctx.sender.to_string(),
            'l' => ctx.local_part.to_string(),
            'o' => ctx.sender_domain.to_string(),
            'd' => ctx.domain.to_string(),
            'i' => ctx.client_ip.to_string(),
            'p' => ctx.validated_name()?,
            'v' => ctx.ip_version().to_string(),
            // RFC 7208 defines h as the HELO identity, which this engine does not
            // carry; it expands to the current domain instead.
            'h' => ctx.domain.to_string(),
            other => return Err(MacroError::UnknownLetter(other)),
        };

        let mut value = raw;
        for delim in self.delimiters.iter().filter(|d| **d != '.') {
            value = value.replace(*delim, ".");
        }
        if self.reverse {
            value = reverse_labels(&value);
        }
        if let Some(n) = self.right_trim {
            value = keep_right_labels(&value, n as usize);
        }
        Ok(value)
    }
}

/// Reverse the order of `.`-separated labels. Empty edge labels survive:
/// "one.two." becomes ".two.one".
fn reverse_labels(value: &str) -> String {
    value.split('.').rev().collect::<Vec<_>>().join(".")
}

/// Keep the rightmost `n` labels. Zero, or a value with `n` labels or fewer,
/// is left unchanged.
fn keep_right_labels(value: &str, n: usize) -> String {
    let labels: Vec<&str> = value.split('.').collect();
    if n == 0 || labels.len() <= n {
        return value.to_string();
    }
    labels[labels.len() - n..].join(".")
}

/// `%%`, `%_` and `%-` are rewritten before any macro is looked at, one
/// escape kind after the other.
fn apply_escapes(template: &str) -> String {
    template
        .replace("%%", "%")
        .replace("%_", " ")
        .replace("%-", "%20")
}

/// Length of a macro body starting right after `%{`, if it is closed before
/// any space, `%` or `{`.
fn body_len(s: &str) -> Option<usize> {
    for (i, c) in s.char_indices() {
        match c {
            '}' => return Some(i),
            ' ' | '%' | '{' => return None,
            _ => {}
        }
    }
    None
}

/// Yields (text before the macro, macro body) pairs, then the trailing text
/// with no body.
fn tokens(template: &str) -> Vec<(&str, Option<&str>)> {
    let mut out = Vec::new();
    let mut literal_start = 0;
    let mut cursor = 0;

    while let Some(offset) = template[cursor..].find("%{") {
        let open = cursor + offset;
        let body_start = open + 2;
        match body_len(&template[body_start..]) {
            Some(len) => {
                let body = &template[body_start..body_start + len];
                out.push((&template[literal_start..open], Some(body)));
                cursor = body_start + len + 1;
                literal_start = cursor;
            }
            // Not a macro; keep the "%{" as text and look further on.
            None => cursor = body_start,
        }
    }
    out.push((&template[literal_start..], None));
    out
}

/// Expand every macro in `template`. A single malformed macro fails the
/// whole expansion.
pub fn expand(template: &str, ctx: &MacroContext<'_>) -> Result<String, MacroError> {
    let escaped = apply_escapes(template);
    let mut result = String::with_capacity(escaped.len());

    for (literal, body) in tokens(&escaped) {
        result.push_str(literal);
        if let Some(body) = body {
            result.push_str(&MacroSpec::parse(body)?.expand(ctx)?);
        }
    }

    Ok(result)
}

/// Whether expanding `template` will read `%{p}`, so the caller knows to
/// perform the reverse lookup first.
pub fn references_validated_name(template: &str) -> bool {
    let escaped = apply_escapes(template);
    tokens(&escaped)
        .iter()
        .filter_map(|(_, body)| *body)
        .any(|body| body.starts_with(['p', 'P']))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn test_ctx() -> MacroContext<'static> {
        MacroContext {
            sender: "strong-bad@email.example.com",
            local_part: "strong-bad",
            sender_domain: "email.example.com",
            domain: "email.example.com",
            client_ip: IpAddr::V4(Ipv4Addr::new(192, 0, 2, 3)),
            validated_names: None,
        }
    }

    fn expand_ok(template: &str) -> String {
        expand(template, &test_ctx()).unwrap()
    }

    #[test]
    fn test_expand_letters() {
        assert_eq!(expand_ok("%{s}"), "strong-bad@email.example.com");
        assert_eq!(expand_ok("%{l}"), "strong-bad");
        assert_eq!(expand_ok("%{o}"), "email.example.com");
        assert_eq!(expand_ok("%{d}"), "email.example.com");
        assert_eq!(expand_ok("%{i}"), "192.0.2.3");
        assert_eq!(expand_ok("%{v}"), "in-addr");
    }

    #[test]
    fn test_h_is_current_domain() {
        assert_eq!(expand_ok("%{h}"), "email.example.com");
    }

    #[test]
    fn test_right_trim() {
        assert_eq!(expand_ok("%{d4}"), "email.example.com");
        assert_eq!(expand_ok("%{d3}"), "email.example.com");
        assert_eq!(expand_ok("%{d2}"), "example.com");
        assert_eq!(expand_ok("%{d1}"), "com");
        assert_eq!(expand_ok("%{d0}"), "email.example.com");
    }

    #[test]
    fn test_reverse() {
        assert_eq!(expand_ok("%{dr}"), "com.example.email");
        assert_eq!(expand_ok("%{d2r}"), "example.email");
        assert_eq!(expand_ok("%{ir}"), "3.2.0.192");
    }

    #[test]
    fn test_delimiters() {
        assert_eq!(expand_ok("%{l-}"), "strong.bad");
        assert_eq!(expand_ok("%{lr}"), "strong-bad");
        assert_eq!(expand_ok("%{lr-}"), "bad.strong");
        assert_eq!(expand_ok("%{l1r-}"), "strong");
        assert_eq!(expand_ok("%{o2.}"), "example.com");
    }

    #[test]
    fn test_composite_templates() {
        assert_eq!(
            expand_ok("%{ir}.%{v}._spf.%{d2}"),
            "3.2.0.192.in-addr._spf.example.com"
        );
        assert_eq!(expand_ok("%{lr-}.lp._spf.%{d2}"), "bad.strong.lp._spf.example.com");
        assert_eq!(
            expand_ok("%{lr-}.lp.%{ir}.%{v}._spf.%{d2}"),
            "bad.strong.lp.3.2.0.192.in-addr._spf.example.com"
        );
        assert_eq!(
            expand_ok("%{ir}.%{v}.%{l1r-}.lp._spf.%{d2}"),
            "3.2.0.192.in-addr.strong.lp._spf.example.com"
        );
        assert_eq!(
            expand_ok("%{d2}.trusted-domains.example.net"),
            "example.com.trusted-domains.example.net"
        );
    }

    #[test]
    fn test_uppercase_letter_is_accepted() {
        assert_eq!(expand_ok("%{D2}"), "example.com");
    }

    #[test]
    fn test_literals() {
        assert_eq!(expand_ok("%%"), "%");
        assert_eq!(expand_ok("%_"), " ");
        assert_eq!(expand_ok("%-"), "%20");
        assert_eq!(expand_ok("hello%_world%%foo%-bar"), "hello world%foo%20bar");
    }

    #[test]
    fn test_no_macros() {
        assert_eq!(expand_ok("plain.example.com"), "plain.example.com");
    }

    #[test]
    fn test_unterminated_macro_is_literal() {
        assert_eq!(expand_ok("%{d"), "%{d");
        assert_eq!(expand_ok("%{d x}.%{d1}"), "%{d x}.com");
    }

    #[test]
    fn test_invalid_macros() {
        let ctx = test_ctx();
        assert_eq!(expand("%{x}", &ctx), Err(MacroError::UnknownLetter('x')));
        assert_eq!(expand("%{}", &ctx), Err(MacroError::Empty));
        assert_eq!(
            expand("%{d128}", &ctx),
            Err(MacroError::TrimTooLarge("128".into()))
        );
        assert_eq!(
            expand("ok.%{d2r!}", &ctx),
            Err(MacroError::InvalidDelimiter("d2r!".into(), '!'))
        );
        assert!(expand("%{d127}", &ctx).is_ok());
    }

    #[test]
    fn test_ipv6_macros() {
        let mut ctx = test_ctx();
        ctx.client_ip = IpAddr::V6(Ipv6Addr::new(0x2001, 0x0db8, 0, 0, 0, 0, 0, 1));
        assert_eq!(expand("%{i}", &ctx).unwrap(), "2001:db8::1");
        assert_eq!(expand("%{v}", &ctx).unwrap(), "ip6");
    }

    #[test]
    fn test_validated_name() {
        let mut ctx = test_ctx();
        assert_eq!(expand("%{p}", &ctx), Err(MacroError::ValidatedName(0)));

        let one = vec!["mx.example.org.".to_string()];
        ctx.validated_names = Some(&one);
        assert_eq!(expand("%{p}", &ctx).unwrap(), "mx.example.org");
        assert_eq!(expand("%{p2}", &ctx).unwrap(), "example.org");

        let two = vec!["a.example.org".to_string(), "b.example.org".to_string()];
        ctx.validated_names = Some(&two);
        assert_eq!(expand("%{p}", &ctx), Err(MacroError::ValidatedName(2)));
    }

    #[test]
    fn test_references_validated_name() {
        assert!(references_validated_name("%{p}.example.com"));
        assert!(references_validated_name("%{d}.%{P2}"));
        assert!(!references_validated_name("%{d}.example.com"));
        assert!(!references_validated_name("%%{p"));
    }

    #[test]
    fn test_reverse_labels() {
        assert_eq!(reverse_labels(""), "");
        assert_eq!(reverse_labels("word."), ".word");
        assert_eq!(reverse_labels("one.two"), "two.one");
        assert_eq!(reverse_labels("one.two.three."), ".three.two.one");
        assert_eq!(reverse_labels("one.two.three.."), "..three.two.one");
    }

    #[test]
    fn test_keep_right_labels() {
        assert_eq!(keep_right_labels("", 1), "");
        assert_eq!(keep_right_labels("one.two.three", 4), "one.two.three");
        assert_eq!(keep_right_labels("one.two.three", 3), "one.two.three");
        assert_eq!(keep_right_labels("one.two.three", 2), "two.three");
        assert_eq!(keep_right_labels("three", 1), "three");
    }
}
