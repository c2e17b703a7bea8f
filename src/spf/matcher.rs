//! Matching a single non-include mechanism against the client address.

use std::net::IpAddr;

use tracing::{debug, trace};

use crate::common::cidr::{in_network, ip4_in_network, ip6_in_network};
use crate::common::dns::{DnsError, DnsResolver};

use super::context::CheckContext;
use super::mechanism::{DualCidr, Mechanism};

/// NXDOMAIN and empty answers are ordinary non-matches; anything else is
/// a temporary failure for the whole check.
fn or_empty<T>(result: Result<Vec<T>, DnsError>) -> Result<Vec<T>, DnsError> {
    match result {
        Err(DnsError::NxDomain | DnsError::NoRecords) => Ok(Vec::new()),
        other => other,
    }
}

/// Returns whether `mechanism` matches `ctx.client_ip`, with `domain` as the
/// policy currently being evaluated. Every term that queries DNS counts as
/// one lookup, however many queries it issues; `ip4`, `ip6` and `all` are
/// free. `include` is expanded by the engine and never matches here.
pub async fn matches<R: DnsResolver>(
    resolver: &R,
    mechanism: &Mechanism,
    domain: &str,
    ctx: &mut CheckContext,
) -> Result<bool, DnsError> {
    let client_ip = ctx.client_ip;
    let target = mechanism.target(domain);

    let matched = match mechanism {
        Mechanism::All => true,
        Mechanism::Include(_) => false,
        Mechanism::Ip4 { addr, prefix_len } => match client_ip {
            IpAddr::V4(ip) => ip4_in_network(ip, *addr, *prefix_len),
            IpAddr::V6(_) => false,
        },
        Mechanism::Ip6 { addr, prefix_len } => match client_ip {
            IpAddr::V6(ip) => ip6_in_network(ip, *addr, *prefix_len),
            IpAddr::V4(_) => false,
        },
        Mechanism::A { cidr, .. } => {
            ctx.count_lookup();
            check_a(resolver, target, client_ip, *cidr).await?
        }
        Mechanism::Mx { cidr, .. } => {
            ctx.count_lookup();
            check_mx(resolver, target, client_ip, *cidr).await?
        }
        Mechanism::Ptr(_) => {
            ctx.count_lookup();
            ctx.ptr_used = true;
            check_ptr(resolver, target, client_ip).await?
        }
        Mechanism::Exists(_) => {
            ctx.count_lookup();
            !or_empty(resolver.query_a(target).await)?.is_empty()
        }
    };

    trace!(mechanism = mechanism.name(), %target, matched, lookups = ctx.lookups, "evaluated");
    Ok(matched)
}

/// Addresses of `host` in the client's family.
async fn addresses<R: DnsResolver>(
    resolver: &R,
    host: &str,
    client_ip: IpAddr,
) -> Result<Vec<IpAddr>, DnsError> {
    Ok(match client_ip {
        IpAddr::V4(_) => or_empty(resolver.query_a(host).await)?
            .into_iter()
            .map(IpAddr::V4)
            .collect(),
        IpAddr::V6(_) => or_empty(resolver.query_aaaa(host).await)?
            .into_iter()
            .map(IpAddr::V6)
            .collect(),
    })
}

async fn check_a<R: DnsResolver>(
    resolver: &R,
    host: &str,
    client_ip: IpAddr,
    cidr: DualCidr,
) -> Result<bool, DnsError> {
    let addrs = addresses(resolver, host, client_ip).await?;
    Ok(addrs
        .into_iter()
        .any(|addr| in_network(client_ip, addr, cidr.v4, cidr.v6)))
}

async fn check_mx<R: DnsResolver>(
    resolver: &R,
    domain: &str,
    client_ip: IpAddr,
    cidr: DualCidr,
) -> Result<bool, DnsError> {
    let mut exchangers = or_empty(resolver.query_mx(domain).await)?;
    exchangers.sort_by_key(|(priority, _)| *priority);

    for (priority, host) in exchangers {
        if check_a(resolver, &host, client_ip, cidr).await? {
            debug!(%domain, %host, priority, "mx matched");
            return Ok(true);
        }
    }
    Ok(false)
}

/// A reverse name matches when it mentions the target domain, or when it
/// resolves forward to the client address.
async fn check_ptr<R: DnsResolver>(
    resolver: &R,
    domain: &str,
    client_ip: IpAddr,
) -> Result<bool, DnsError> {
    let names = or_empty(resolver.query_ptr(client_ip).await)?;
    let domain = domain.to_ascii_lowercase();

    for name in names {
        if name.to_ascii_lowercase().contains(&domain) {
            debug!(%name, %domain, "ptr name matched target");
            return Ok(true);
        }
        if check_a(resolver, &name, client_ip, DualCidr::default()).await? {
            debug!(%name, "ptr name resolves back to client");
            return Ok(true);
        }
    }
    Ok(false)
}
