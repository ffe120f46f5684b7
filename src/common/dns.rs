use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{ResolveError, TokioResolver};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("NXDOMAIN: domain does not exist")]
    NxDomain,
    #[error("no records of the requested type")]
    NoRecords,
    #[error("SERVFAIL: server failure")]
    ServFail,
    #[error("timeout")]
    Timeout,
    #[error("DNS error: {0}")]
    Other(String),
}

impl DnsError {
    /// NXDOMAIN or an empty answer: the data is authoritatively absent, as
    /// opposed to a failed resolution.
    pub fn is_empty_answer(&self) -> bool {
        matches!(self, DnsError::NxDomain | DnsError::NoRecords)
    }
}

/// One MX answer. `host` carries no trailing dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    pub preference: u16,
    pub host: String,
}

impl MxRecord {
    pub fn new(preference: u16, host: impl Into<String>) -> Self {
        Self {
            preference,
            host: host.into(),
        }
    }
}

/// DNS resolver trait for abstracting DNS lookups.
///
/// This is the only way the SPF engine touches the network. Timeouts,
/// retries and caching are the implementor's business.
pub trait DnsResolver: Clone + Send + Sync + 'static {
    /// TXT strings for `domain`, each record's character-strings already
    /// concatenated.
    fn query_txt(&self, domain: &str) -> impl Future<Output = Result<Vec<String>, DnsError>> + Send;
    /// A and AAAA answers for `domain`.
    fn query_addrs(&self, domain: &str) -> impl Future<Output = Result<Vec<IpAddr>, DnsError>> + Send;
    /// MX answers for `domain`, in the order the server returned them.
    fn query_mx(&self, domain: &str) -> impl Future<Output = Result<Vec<MxRecord>, DnsError>> + Send;
    /// Reverse (PTR) names for `ip`.
    fn query_ptr(&self, ip: IpAddr) -> impl Future<Output = Result<Vec<String>, DnsError>> + Send;
}

/// Hickory DNS resolver implementation
#[derive(Clone)]
pub struct HickoryResolver {
    resolver: TokioResolver,
}

impl HickoryResolver {
    pub fn new() -> Self {
        Self::with_config(ResolverConfig::default(), ResolverOpts::default())
    }

    pub fn with_config(config: ResolverConfig, opts: ResolverOpts) -> Self {
        let resolver = TokioResolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build();
        Self { resolver }
    }

    fn classify_error(e: &ResolveError) -> DnsError {
        let msg = e.to_string().to_lowercase();
        if msg.contains("nxdomain") {
            DnsError::NxDomain
        } else if msg.contains("no record") {
            DnsError::NoRecords
        } else if msg.contains("timeout") || msg.contains("timed out") {
            DnsError::Timeout
        } else if msg.contains("servfail") {
            DnsError::ServFail
        } else {
            DnsError::Other(e.to_string())
        }
    }
}

impl Default for HickoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_root(name: String) -> String {
    match name.strip_suffix('.') {
        Some(stripped) => stripped.to_string(),
        None => name,
    }
}

impl DnsResolver for HickoryResolver {
    async fn query_txt(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        let lookup = self
            .resolver
            .txt_lookup(domain)
            .await
            .map_err(|e| Self::classify_error(&e))?;
        Ok(lookup
            .iter()
            .map(|txt| {
                let bytes: Vec<u8> = txt.txt_data().iter().flat_map(|s| s.iter().copied()).collect();
                String::from_utf8_lossy(&bytes).into_owned()
            })
            .collect())
    }

    async fn query_addrs(&self, domain: &str) -> Result<Vec<IpAddr>, DnsError> {
        let lookup = self
            .resolver
            .lookup_ip(domain)
            .await
            .map_err(|e| Self::classify_error(&e))?;
        Ok(lookup.iter().collect())
    }

    async fn query_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError> {
        let lookup = self
            .resolver
            .mx_lookup(domain)
            .await
            .map_err(|e| Self::classify_error(&e))?;
        Ok(lookup
            .iter()
            .map(|mx| MxRecord::new(mx.preference(), strip_root(mx.exchange().to_string())))
            .collect())
    }

    async fn query_ptr(&self, ip: IpAddr) -> Result<Vec<String>, DnsError> {
        let lookup = self
            .resolver
            .reverse_lookup(ip)
            .await
            .map_err(|e| Self::classify_error(&e))?;
        Ok(lookup.iter().map(|name| strip_root(name.to_string())).collect())
    }
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock DNS resolver for testing.
///
/// Domains are matched case-insensitively. A domain with no configured data
/// answers `NoRecords`; `set_nxdomain` and `set_error` override every query
/// type for that name.
#[derive(Clone, Default)]
pub struct MockResolver {
    txt_records: Arc<Mutex<HashMap<String, Vec<String>>>>,
    addr_records: Arc<Mutex<HashMap<String, Vec<IpAddr>>>>,
    mx_records: Arc<Mutex<HashMap<String, Vec<MxRecord>>>>,
    ptr_records: Arc<Mutex<HashMap<IpAddr, Vec<String>>>>,
    errors: Arc<Mutex<HashMap<String, DnsError>>>,
    ptr_errors: Arc<Mutex<HashMap<IpAddr, DnsError>>>,
    queries: Arc<AtomicUsize>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_txt(&self, domain: &str, records: Vec<&str>) {
        locked(&self.txt_records).insert(
            domain.to_lowercase(),
            records.into_iter().map(String::from).collect(),
        );
    }

    /// # Panics
    ///
    /// Panics if an address does not parse; fixtures are written by hand.
    pub fn add_a(&self, domain: &str, addrs: Vec<&str>) {
        self.add_addrs(domain, addrs);
    }

    /// # Panics
    ///
    /// Panics if an address does not parse.
    pub fn add_aaaa(&self, domain: &str, addrs: Vec<&str>) {
        self.add_addrs(domain, addrs);
    }

    fn add_addrs(&self, domain: &str, addrs: Vec<&str>) {
        let parsed = addrs.into_iter().map(|a| {
            a.parse::<IpAddr>()
                .unwrap_or_else(|_| panic!("invalid fixture address {a}"))
        });
        locked(&self.addr_records)
            .entry(domain.to_lowercase())
            .or_default()
            .extend(parsed);
    }

    pub fn add_mx(&self, domain: &str, records: Vec<(u16, &str)>) {
        locked(&self.mx_records).insert(
            domain.to_lowercase(),
            records
                .into_iter()
                .map(|(pref, host)| MxRecord::new(pref, host))
                .collect(),
        );
    }

    pub fn add_ptr(&self, ip: IpAddr, names: Vec<&str>) {
        locked(&self.ptr_records).insert(ip, names.into_iter().map(String::from).collect());
    }

    pub fn set_nxdomain(&self, domain: &str) {
        self.set_error(domain, DnsError::NxDomain);
    }

    /// Every query for `domain` fails with `error`.
    pub fn set_error(&self, domain: &str, error: DnsError) {
        locked(&self.errors).insert(domain.to_lowercase(), error);
    }

    pub fn set_ptr_error(&self, ip: IpAddr, error: DnsError) {
        locked(&self.ptr_errors).insert(ip, error);
    }

    /// Number of queries answered so far, of any type.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn answer<T: Clone>(
        &self,
        table: &Mutex<HashMap<String, Vec<T>>>,
        domain: &str,
    ) -> Result<Vec<T>, DnsError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let key = domain.to_lowercase();
        let key = key.strip_suffix('.').unwrap_or(&key);
        if let Some(err) = locked(&self.errors).get(key) {
            return Err(err.clone());
        }
        match locked(table).get(key) {
            Some(records) if !records.is_empty() => Ok(records.clone()),
            _ => Err(DnsError::NoRecords),
        }
    }
}

impl DnsResolver for MockResolver {
    async fn query_txt(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        self.answer(&self.txt_records, domain)
    }

    async fn query_addrs(&self, domain: &str) -> Result<Vec<IpAddr>, DnsError> {
        self.answer(&self.addr_records, domain)
    }

    async fn query_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError> {
        self.answer(&self.mx_records, domain)
    }

    async fn query_ptr(&self, ip: IpAddr) -> Result<Vec<String>, DnsError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = locked(&self.ptr_errors).get(&ip) {
            return Err(err.clone());
        }
        match locked(&self.ptr_records).get(&ip) {
            Some(names) if !names.is_empty() => Ok(names.clone()),
            _ => Err(DnsError::NxDomain),
        }
    }
}
