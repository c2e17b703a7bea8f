use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::ProtoErrorKind;
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::{ResolveError, TokioResolver};
use thiserror::Error;
use tracing::debug;

use crate::config::ResolverSettings;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("NXDOMAIN: domain does not exist")]
    NxDomain,
    #[error("no records of the requested type")]
    NoRecords,
    #[error("timeout")]
    Timeout,
    #[error("temporary DNS failure: {0}")]
    TempFail(String),
}

impl DnsError {
    /// Returns `true` if the lookup may succeed when retried later.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Timeout | Self::TempFail(_))
    }
}

/// DNS resolver trait for abstracting DNS lookups
pub trait DnsResolver: Clone + Send + Sync + 'static {
    fn query_txt(
        &self,
        domain: &str,
    ) -> impl Future<Output = Result<Vec<String>, DnsError>> + Send;
    fn query_a(
        &self,
        domain: &str,
    ) -> impl Future<Output = Result<Vec<Ipv4Addr>, DnsError>> + Send;
    fn query_aaaa(
        &self,
        domain: &str,
    ) -> impl Future<Output = Result<Vec<Ipv6Addr>, DnsError>> + Send;
    fn query_mx(
        &self,
        domain: &str,
    ) -> impl Future<Output = Result<Vec<(u16, String)>, DnsError>> + Send;
    fn query_ptr(&self, ip: IpAddr) -> impl Future<Output = Result<Vec<String>, DnsError>> + Send;
}

/// Hickory DNS resolver implementation
#[derive(Clone)]
pub struct HickoryResolver {
    resolver: TokioResolver,
}

impl HickoryResolver {
    /// Builds a resolver from configured settings. An empty nameserver list
    /// falls back to the system configuration (`/etc/resolv.conf`).
    pub fn from_settings(settings: &ResolverSettings) -> Result<Self, DnsError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(settings.timeout_secs);
        opts.attempts = settings.attempts;

        let resolver = if settings.nameservers.is_empty() {
            TokioResolver::builder(TokioConnectionProvider::default())
                .map_err(|e| Self::classify_error(&e))?
                .with_options(opts)
                .build()
        } else {
            let group =
                NameServerConfigGroup::from_ips_clear(&settings.nameservers, settings.port, true);
            let config = ResolverConfig::from_parts(None, vec![], group);
            TokioResolver::builder_with_config(config, TokioConnectionProvider::default())
                .with_options(opts)
                .build()
        };

        let nameservers: Vec<SocketAddr> = settings
            .nameservers
            .iter()
            .map(|ip| SocketAddr::new(*ip, settings.port))
            .collect();
        debug!(
            ?nameservers,
            timeout_secs = settings.timeout_secs,
            "resolver ready"
        );
        Ok(Self { resolver })
    }

    fn classify_error(e: &ResolveError) -> DnsError {
        if let Some(proto) = e.proto() {
            match proto.kind() {
                ProtoErrorKind::NoRecordsFound { response_code, .. } => {
                    return classify_response(*response_code);
                }
                ProtoErrorKind::Timeout => return DnsError::Timeout,
                _ => {}
            }
        }
        let msg = e.to_string();
        if msg.to_lowercase().contains("timed out") || msg.to_lowercase().contains("timeout") {
            DnsError::Timeout
        } else {
            DnsError::TempFail(msg)
        }
    }
}

/// Maps the response code of an answer that carried no records. Only
/// NXDOMAIN and an empty NOERROR answer are definitive; SERVFAIL, REFUSED
/// and the rest are server trouble.
fn classify_response(code: ResponseCode) -> DnsError {
    match code {
        ResponseCode::NXDomain => DnsError::NxDomain,
        ResponseCode::NoError => DnsError::NoRecords,
        other => DnsError::TempFail(other.to_string()),
    }
}

fn trim_root(name: String) -> String {
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
        Ok(lookup.iter().map(ToString::to_string).collect())
    }

    async fn query_a(&self, domain: &str) -> Result<Vec<Ipv4Addr>, DnsError> {
        let lookup = self
            .resolver
            .ipv4_lookup(domain)
            .await
            .map_err(|e| Self::classify_error(&e))?;
        Ok(lookup.iter().map(|a| a.0).collect())
    }

    async fn query_aaaa(&self, domain: &str) -> Result<Vec<Ipv6Addr>, DnsError> {
        let lookup = self
            .resolver
            .ipv6_lookup(domain)
            .await
            .map_err(|e| Self::classify_error(&e))?;
        Ok(lookup.iter().map(|aaaa| aaaa.0).collect())
    }

    async fn query_mx(&self, domain: &str) -> Result<Vec<(u16, String)>, DnsError> {
        let lookup = self
            .resolver
            .mx_lookup(domain)
            .await
            .map_err(|e| Self::classify_error(&e))?;
        Ok(lookup
            .iter()
            .map(|mx| (mx.preference(), trim_root(mx.exchange().to_string())))
            .collect())
    }

    async fn query_ptr(&self, ip: IpAddr) -> Result<Vec<String>, DnsError> {
        let lookup = self
            .resolver
            .reverse_lookup(ip)
            .await
            .map_err(|e| Self::classify_error(&e))?;
        Ok(lookup.iter().map(|name| trim_root(name.to_string())).collect())
    }
}

/// In-memory resolver for tests. Clones share state, so a clone handed to a
/// checker still records into the original's query log.
#[derive(Clone, Default)]
pub struct MockResolver {
    txt_records: Arc<Mutex<HashMap<String, Vec<String>>>>,
    a_records: Arc<Mutex<HashMap<String, Vec<Ipv4Addr>>>>,
    aaaa_records: Arc<Mutex<HashMap<String, Vec<Ipv6Addr>>>>,
    mx_records: Arc<Mutex<HashMap<String, Vec<(u16, String)>>>>,
    ptr_records: Arc<Mutex<HashMap<IpAddr, Vec<String>>>>,
    errors: Arc<Mutex<HashMap<String, DnsError>>>,
    queries: Arc<Mutex<Vec<String>>>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_txt(&self, domain: &str, records: Vec<&str>) {
        lock(&self.txt_records).insert(
            domain.to_lowercase(),
            records.into_iter().map(String::from).collect(),
        );
    }

    pub fn add_a(&self, domain: &str, addrs: Vec<Ipv4Addr>) {
        lock(&self.a_records).insert(domain.to_lowercase(), addrs);
    }

    pub fn add_aaaa(&self, domain: &str, addrs: Vec<Ipv6Addr>) {
        lock(&self.aaaa_records).insert(domain.to_lowercase(), addrs);
    }

    pub fn add_mx(&self, domain: &str, records: Vec<(u16, &str)>) {
        lock(&self.mx_records).insert(
            domain.to_lowercase(),
            records.into_iter().map(|(p, h)| (p, h.to_string())).collect(),
        );
    }

    pub fn add_ptr(&self, ip: IpAddr, names: Vec<&str>) {
        lock(&self.ptr_records).insert(ip, names.into_iter().map(String::from).collect());
    }

    /// Every query for `domain` (any record type) fails with `error`.
    pub fn fail(&self, domain: &str, error: DnsError) {
        lock(&self.errors).insert(domain.to_lowercase(), error);
    }

    pub fn set_nxdomain(&self, domain: &str) {
        self.fail(domain, DnsError::NxDomain);
    }

    /// Queries issued so far, as `"<TYPE> <name>"`, in order.
    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }

    fn record(&self, kind: &str, name: &str) -> Result<String, DnsError> {
        let name = name.to_lowercase();
        lock(&self.queries).push(format!("{kind} {name}"));
        match lock(&self.errors).get(&name) {
            Some(err) => Err(err.clone()),
            None => Ok(name),
        }
    }
}

impl DnsResolver for MockResolver {
    async fn query_txt(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        let name = self.record("TXT", domain)?;
        Ok(lock(&self.txt_records).get(&name).cloned().unwrap_or_default())
    }

    async fn query_a(&self, domain: &str) -> Result<Vec<Ipv4Addr>, DnsError> {
        let name = self.record("A", domain)?;
        Ok(lock(&self.a_records).get(&name).cloned().unwrap_or_default())
    }

    async fn query_aaaa(&self, domain: &str) -> Result<Vec<Ipv6Addr>, DnsError> {
        let name = self.record("AAAA", domain)?;
        Ok(lock(&self.aaaa_records).get(&name).cloned().unwrap_or_default())
    }

    async fn query_mx(&self, domain: &str) -> Result<Vec<(u16, String)>, DnsError> {
        let name = self.record("MX", domain)?;
        Ok(lock(&self.mx_records).get(&name).cloned().unwrap_or_default())
    }

    async fn query_ptr(&self, ip: IpAddr) -> Result<Vec<String>, DnsError> {
        let key = ip.to_string();
        self.record("PTR", &key)?;
        Ok(lock(&self.ptr_records).get(&ip).cloned().unwrap_or_default())
    }
}
