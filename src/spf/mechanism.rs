//! SPF directive tokens: qualifier + mechanism (RFC 7208 Section 4.6, 5).

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

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

/// A CIDR prefix length pair for A and MX mechanisms.
/// `v4` defaults to 32, `v6` defaults to 128 when not specified, which
/// reduces the match to address equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DualCidr {
    pub v4: u8,
    pub v6: u8,
}

impl Default for DualCidr {
    fn default() -> Self {
        Self { v4: 32, v6: 128 }
    }
}

/// SPF mechanism (RFC 7208 Section 5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mechanism {
    /// `all`
    All,
    /// `include:<domain>`
    Include(String),
    /// `a[:<domain>][/cidr4][//cidr6]`
    A { domain: Option<String>, cidr: DualCidr },
    /// `mx[:<domain>][/cidr4][//cidr6]`
    Mx { domain: Option<String>, cidr: DualCidr },
    /// `ptr[:<domain>]`
    Ptr(Option<String>),
    /// `ip4:<ip4-network>[/cidr]`
    Ip4 { addr: Ipv4Addr, prefix_len: u8 },
    /// `ip6:<ip6-network>[/cidr]`
    Ip6 { addr: Ipv6Addr, prefix_len: u8 },
    /// `exists:<domain>`
    Exists(String),
}

impl Mechanism {
    /// The domain this mechanism queries, falling back to the domain whose
    /// policy is being evaluated when the token names none.
    pub fn target<'a>(&'a self, current: &'a str) -> &'a str {
        match self {
            Mechanism::Include(d) | Mechanism::Exists(d) => d,
            Mechanism::A { domain, .. } | Mechanism::Mx { domain, .. } | Mechanism::Ptr(domain) => {
                domain.as_deref().unwrap_or(current)
            }
            Mechanism::All | Mechanism::Ip4 { .. } | Mechanism::Ip6 { .. } => current,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mechanism::All => "all",
            Mechanism::Include(_) => "include",
            Mechanism::A { .. } => "a",
            Mechanism::Mx { .. } => "mx",
            Mechanism::Ptr(_) => "ptr",
            Mechanism::Ip4 { .. } => "ip4",
            Mechanism::Ip6 { .. } => "ip6",
            Mechanism::Exists(_) => "exists",
        }
    }
}

/// A directive = qualifier + mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub qualifier: Qualifier,
    pub mechanism: Mechanism,
}

impl Directive {
    /// Parse one whitespace-delimited record token.
    pub fn parse(token: &str) -> Result<Self, SpfParseError> {
        let (qualifier, term) = Qualifier::parse_prefix(token);
        let mechanism = parse_mechanism(term)?;
        Ok(Directive { qualifier, mechanism })
    }
}

/// Error type for SPF record parsing. All parse failures map to PermError in evaluation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpfParseError {
    #[error("invalid SPF version: expected 'v=spf1'")]
    InvalidVersion,
    #[error("unknown mechanism: {0}")]
    UnknownMechanism(String),
    #[error("invalid mechanism argument: {0}")]
    InvalidArgument(String),
    #[error("missing required argument for {0}")]
    MissingArgument(String),
    #[error("invalid CIDR prefix: {0}")]
    InvalidCidr(String),
    #[error("redirect={0} combined with other terms is not supported")]
    RedirectWithMechanisms(String),
}

/// Parse a dual CIDR suffix: "/24", "//64" or "/24//64".
fn parse_dual_cidr(suffix: &str) -> Result<DualCidr, SpfParseError> {
    let invalid = || SpfParseError::InvalidCidr(suffix.to_string());
    let body = suffix.strip_prefix('/').ok_or_else(invalid)?;

    let (v4, v6) = match body.split_once("//") {
        Some((v4, v6)) => (v4, Some(v6)),
        None => match body.strip_prefix('/') {
            Some(v6) => ("", Some(v6)),
            None => (body, None),
        },
    };
    if v4.is_empty() && v6.is_none() {
        return Err(invalid());
    }

    let mut cidr = DualCidr::default();
    if !v4.is_empty() {
        cidr.v4 = parse_prefix_len(v4, 32).ok_or_else(invalid)?;
    }
    if let Some(v6) = v6 {
        cidr.v6 = parse_prefix_len(v6, 128).ok_or_else(invalid)?;
    }
    Ok(cidr)
}

fn parse_prefix_len(s: &str, max: u8) -> Option<u8> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u8>().ok().filter(|len| *len <= max)
}

/// Split the argument of `a`/`mx` into an optional domain and a CIDR
/// suffix. The suffix is validated whether or not a domain is present, so
/// `a/24` and `a:example.com/24` go through the same path.
fn parse_host_arg(rest: &str, name: &str) -> Result<(Option<String>, DualCidr), SpfParseError> {
    if rest.is_empty() {
        return Ok((None, DualCidr::default()));
    }
    if rest.starts_with('/') {
        return Ok((None, parse_dual_cidr(rest)?));
    }
    let Some(arg) = rest.strip_prefix(':') else {
        return Err(SpfParseError::UnknownMechanism(format!("{name}{rest}")));
    };
    let (domain, cidr) = match arg.find('/') {
        Some(pos) => (&arg[..pos], parse_dual_cidr(&arg[pos..])?),
        None => (arg, DualCidr::default()),
    };
    if domain.is_empty() {
        return Err(SpfParseError::MissingArgument(name.to_string()));
    }
    Ok((Some(domain.to_ascii_lowercase()), cidr))
}

fn required_domain(rest: &str, name: &str) -> Result<String, SpfParseError> {
    match rest.strip_prefix(':') {
        Some(domain) if !domain.is_empty() && !domain.contains('/') => {
            Ok(domain.to_ascii_lowercase())
        }
        Some(domain) if domain.contains('/') => {
            Err(SpfParseError::InvalidArgument(format!("{name}:{domain}")))
        }
        _ => Err(SpfParseError::MissingArgument(name.to_string())),
    }
}

fn parse_ip_literal<T: std::str::FromStr>(
    rest: &str,
    name: &str,
    max: u8,
) -> Result<(T, u8), SpfParseError> {
    let arg = rest
        .strip_prefix(':')
        .filter(|a| !a.is_empty())
        .ok_or_else(|| SpfParseError::MissingArgument(name.to_string()))?;
    let (addr, prefix_len) = match arg.split_once('/') {
        Some((addr, len)) => (
            addr,
            parse_prefix_len(len, max).ok_or_else(|| SpfParseError::InvalidCidr(arg.to_string()))?,
        ),
        None => (arg, max),
    };
    let addr = addr
        .parse::<T>()
        .map_err(|_| SpfParseError::InvalidArgument(format!("{name}:{arg}")))?;
    Ok((addr, prefix_len))
}

/// Parse a mechanism from its textual representation (without qualifier prefix).
/// The name is everything before the first ':' or '/', matched exactly
/// against the known mechanism names.
pub fn parse_mechanism(term: &str) -> Result<Mechanism, SpfParseError> {
    let split = term.find([':', '/']).unwrap_or(term.len());
    let (name, rest) = term.split_at(split);
    let name = name.to_ascii_lowercase();

    match name.as_str() {
        "all" if rest.is_empty() => Ok(Mechanism::All),
        "all" => Err(SpfParseError::InvalidArgument(
            "all mechanism takes no arguments".into(),
        )),
        "include" => Ok(Mechanism::Include(required_domain(rest, "include")?)),
        "exists" => Ok(Mechanism::Exists(required_domain(rest, "exists")?)),
        "a" => {
            let (domain, cidr) = parse_host_arg(rest, "a")?;
            Ok(Mechanism::A { domain, cidr })
        }
        "mx" => {
            let (domain, cidr) = parse_host_arg(rest, "mx")?;
            Ok(Mechanism::Mx { domain, cidr })
        }
        "ptr" if rest.is_empty() => Ok(Mechanism::Ptr(None)),
        "ptr" => Ok(Mechanism::Ptr(Some(required_domain(rest, "ptr")?))),
        "ip4" => {
            let (addr, prefix_len) = parse_ip_literal::<Ipv4Addr>(rest, "ip4", 32)?;
            Ok(Mechanism::Ip4 { addr, prefix_len })
        }
        "ip6" => {
            let (addr, prefix_len) = parse_ip_literal::<Ipv6Addr>(rest, "ip6", 128)?;
            Ok(Mechanism::Ip6 { addr, prefix_len })
        }
        _ => Err(SpfParseError::UnknownMechanism(term.to_string())),
    }
}
