//! Following `redirect=` chains to the policy that actually gets evaluated.

use tracing::debug;

use crate::common::dns::{DnsError, DnsResolver};

use super::context::{CheckContext, Fatal};
use super::record::PolicyRecord;

/// Follows redirects from `record` until a policy that is not itself a
/// redirect, which may be a record with no policy at all. Each hop costs one
/// lookup; with `breadcrumbs` it is also appended to the check's redirect
/// trail. Returns `None` after recording a fatal loop.
pub async fn resolve<R: DnsResolver>(
    resolver: &R,
    record: PolicyRecord,
    ctx: &mut CheckContext,
    breadcrumbs: bool,
) -> Result<Option<PolicyRecord>, DnsError> {
    let mut visited = vec![record.domain.clone()];
    let mut current = record;

    while let Some(target) = current.redirect_target().map(str::to_owned) {
        if visited.contains(&target) {
            ctx.set_fatal(Fatal::RedirectLoop(target));
            return Ok(None);
        }
        ctx.count_lookup();
        if breadcrumbs {
            ctx.redirect_trail.push(format!("redirect={target}"));
        }
        debug!(from = %current.domain, to = %target, lookups = ctx.lookups, "following redirect");

        current = PolicyRecord::fetch(resolver, &target).await?;
        visited.push(target);
    }

    Ok(Some(current))
}
