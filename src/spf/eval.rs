use std::net::IpAddr;

use tracing::{info, warn};

use crate::common::dns::{DnsError, DnsResolver};
use crate::common::domain::normalize;

use super::context::{CheckContext, Fatal};
use super::engine::{self, Match};
use super::record::{PolicyRecord, RecordStatus};
use super::{redirect, verdict, Diagnostic, SpfCheck, SpfResult};

/// Runs SPF checks against an injected resolver. Holds no state between
/// checks; each call gets its own lookup accounting.
pub struct SpfChecker<R: DnsResolver> {
    resolver: R,
}

impl<R: DnsResolver> SpfChecker<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Is `client_ip` authorized to send for `domain`?
    pub async fn check(&self, client_ip: IpAddr, domain: &str) -> SpfCheck {
        let domain = normalize(domain);
        let mut ctx = CheckContext::new(client_ip);

        let check = match self.run(&domain, &mut ctx).await {
            Ok((outcome, policy)) => verdict::classify(domain, outcome, policy.as_ref(), ctx),
            Err(e) => temp_error(domain, ctx, &e),
        };

        info!(
            domain = %check.domain,
            %client_ip,
            result = %check.result,
            lookups = check.lookups,
            "spf check complete"
        );
        check
    }

    /// Fetches the top-level policy, resolves any redirect and evaluates
    /// the result. Problems with the top-level record itself are recorded
    /// without evaluating a single mechanism.
    async fn run(
        &self,
        domain: &str,
        ctx: &mut CheckContext,
    ) -> Result<(Option<Match>, Option<PolicyRecord>), DnsError> {
        let top = PolicyRecord::fetch(&self.resolver, domain).await?;
        ctx.policy_text = top.policy_text.clone();
        if !check_status(&top, ctx) {
            return Ok((None, Some(top)));
        }

        let policy = if top.redirect_target().is_some() {
            match redirect::resolve(&self.resolver, top, ctx, true).await? {
                Some(policy) => policy,
                None => return Ok((None, None)),
            }
        } else {
            top
        };
        if !check_status(&policy, ctx) {
            return Ok((None, Some(policy)));
        }

        let outcome = engine::evaluate(&self.resolver, &policy, ctx).await?;
        Ok((outcome, Some(policy)))
    }
}

/// Records a fatal condition for an unusable record; `true` if evaluation
/// can go ahead. A missing record is not fatal.
fn check_status(record: &PolicyRecord, ctx: &mut CheckContext) -> bool {
    match &record.status {
        RecordStatus::Found => true,
        RecordStatus::Missing => false,
        RecordStatus::Multiple => {
            ctx.set_fatal(Fatal::MultipleRecords(record.domain.clone()));
            false
        }
        RecordStatus::Invalid(e) => {
            ctx.set_fatal(Fatal::Malformed {
                domain: record.domain.clone(),
                reason: e.to_string(),
            });
            false
        }
    }
}

fn temp_error(domain: String, ctx: CheckContext, error: &DnsError) -> SpfCheck {
    warn!(%domain, %error, "check ended with a temporary DNS failure");
    SpfCheck {
        domain,
        result: SpfResult::TempError,
        policy_text: ctx.policy_text,
        lookups: ctx.lookups,
        match_trail: Vec::new(),
        redirect_trail: ctx.redirect_trail,
        diagnostics: vec![Diagnostic::TempFailure(error.to_string())],
    }
}
