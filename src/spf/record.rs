//! SPF record discovery (RFC 7208 Section 4.5).

use tracing::trace;

use crate::common::dns::DnsResolver;

use super::SpfError;

const VERSION: &str = "v=spf1";

/// The one SPF record a domain publishes, kept as published. Terms are
/// parsed lazily while the record is walked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpfRecord {
    raw: String,
}

impl SpfRecord {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The whitespace-separated terms after the version tag.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.raw.split_whitespace().skip(1)
    }
}

/// Check if a TXT record is an SPF record: exactly `v=spf1` followed by a
/// space or the end of the string. The comparison is case-sensitive.
pub fn is_spf_record(txt: &str) -> bool {
    match txt.strip_prefix(VERSION) {
        Some(rest) => rest.is_empty() || rest.starts_with(' '),
        None => false,
    }
}

/// Pick the SPF record out of a domain's TXT strings.
///
/// - No TXT record matching `v=spf1` → `Ok(None)`
/// - More than one distinct matching record → `MultipleRecords`
pub fn select_record(domain: &str, txt_records: &[String]) -> Result<Option<SpfRecord>, SpfError> {
    let mut spf_records: Vec<&str> = Vec::new();
    for txt in txt_records.iter().map(String::as_str) {
        if is_spf_record(txt) && !spf_records.contains(&txt) {
            spf_records.push(txt);
        }
    }

    match spf_records.as_slice() {
        [] => Ok(None),
        [record] => Ok(Some(SpfRecord {
            raw: record.to_string(),
        })),
        _ => Err(SpfError::MultipleRecords(domain.to_string())),
    }
}

/// Query DNS TXT records for a domain and select its SPF record.
///
/// NXDOMAIN and empty answers mean the domain has no record; any other
/// resolver failure is returned as `SpfError::Dns` (a TempError).
pub async fn lookup_spf<R: DnsResolver>(resolver: &R, domain: &str) -> Result<Option<SpfRecord>, SpfError> {
    let txt_records = match resolver.query_txt(domain).await {
        Ok(records) => records,
        Err(e) if e.is_empty_answer() => {
            trace!(domain, error = %e, "no TXT records");
            return Ok(None);
        }
        Err(e) => {
            return Err(SpfError::Dns {
                domain: domain.to_string(),
                source: e,
            })
        }
    };

    select_record(domain, &txt_records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::dns::{DnsError, MockResolver};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn lookup_spf_queries_txt_and_selects() {
        let resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["v=spf1 -all"]);
        let record = lookup_spf(&resolver, "example.com").await.unwrap().unwrap();
        assert_eq!(record.as_str(), "v=spf1 -all");
        assert_eq!(record.terms().collect::<Vec<_>>(), vec!["-all"]);
    }

    #[tokio::test]
    async fn lookup_spf_filters_non_spf_records() {
        let resolver = MockResolver::new();
        resolver.add_txt(
            "example.com",
            vec![
                "google-site-verification=abc123",
                "v=spf1 ip4:192.0.2.0/24 -all",
                "some other txt record",
            ],
        );
        let record = lookup_spf(&resolver, "example.com").await.unwrap().unwrap();
        assert_eq!(record.terms().count(), 2);
    }

    #[tokio::test]
    async fn lookup_spf_multiple_spf_records() {
        let resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["v=spf1 +all", "v=spf1 -all"]);
        let err = lookup_spf(&resolver, "example.com").await.unwrap_err();
        assert_eq!(err, SpfError::MultipleRecords("example.com".into()));
    }

    #[tokio::test]
    async fn lookup_spf_identical_records_count_once() {
        let resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["v=spf1 -all", "v=spf1 -all"]);
        assert!(lookup_spf(&resolver, "example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn lookup_spf_no_spf_record() {
        let resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["not-spf"]);
        assert_eq!(lookup_spf(&resolver, "example.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn lookup_spf_nxdomain_is_no_record() {
        let resolver = MockResolver::new();
        resolver.set_nxdomain("nonexistent.example.com");
        assert_eq!(
            lookup_spf(&resolver, "nonexistent.example.com").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn lookup_spf_servfail_is_dns_error() {
        let resolver = MockResolver::new();
        resolver.set_error("example.com", DnsError::ServFail);
        let err = lookup_spf(&resolver, "example.com").await.unwrap_err();
        assert_eq!(
            err,
            SpfError::Dns {
                domain: "example.com".into(),
                source: DnsError::ServFail,
            }
        );
    }

    #[test]
    fn version_tag_rules() {
        assert!(is_spf_record("v=spf1"));
        assert!(is_spf_record("v=spf1 -all"));
        assert!(!is_spf_record("v=spf10 -all"));
        assert!(!is_spf_record("V=SPF1 -all"));
        assert!(!is_spf_record(" v=spf1 -all"));
        assert!(!is_spf_record("spf2.0/pra -all"));
    }

    #[test]
    fn terms_skip_version_and_collapse_whitespace() {
        let record = select_record("example.com", &["v=spf1  a   mx\t-all".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(record.terms().collect::<Vec<_>>(), vec!["a", "mx", "-all"]);
    }
}
