//! Human-readable rendering of a check.

use std::fmt;
use std::net::IpAddr;

use crate::spf::{Diagnostic, SpfCheck, SpfResult, MAX_DNS_LOOKUPS};

/// Renders an [`SpfCheck`] for the terminal via `Display`.
pub struct Report<'a> {
    pub check: &'a SpfCheck,
    pub client_ip: IpAddr,
}

impl<'a> Report<'a> {
    pub fn new(check: &'a SpfCheck, client_ip: IpAddr) -> Self {
        Self { check, client_ip }
    }

    fn explanation(&self) -> String {
        let ip = self.client_ip;
        let domain = &self.check.domain;
        match self.check.result {
            SpfResult::Pass => format!("{ip} is authorized to send mail for {domain}."),
            SpfResult::Fail => format!("{ip} is NOT authorized to send mail for {domain}."),
            SpfResult::SoftFail => {
                format!("{ip} is probably not authorized to send mail for {domain} (softfail).")
            }
            SpfResult::Neutral => format!("{domain} makes no assertion about {ip}."),
            SpfResult::None => format!("{domain} publishes no applicable SPF policy."),
            SpfResult::TempError => {
                format!("A temporary DNS failure prevented checking {domain}; try again later.")
            }
            SpfResult::PermError => format!("The SPF policy of {domain} could not be evaluated."),
        }
    }
}

fn describe(diagnostic: &Diagnostic) -> String {
    match diagnostic {
        Diagnostic::LookupLimitExceeded(count) => format!(
            "{count} DNS lookups were needed; RFC 7208 allows at most {MAX_DNS_LOOKUPS} \
             (receivers may return permerror)"
        ),
        Diagnostic::NoSpfRecord { domain, txt_records: 0 } => {
            format!("{domain} has no TXT records at all")
        }
        Diagnostic::NoSpfRecord { domain, txt_records } => {
            format!("{domain} has {txt_records} TXT record(s) but none is an SPF record")
        }
        Diagnostic::MultipleRecords(domain) => {
            format!("{domain} publishes more than one SPF record")
        }
        Diagnostic::IncludeWithoutPolicy(domain) => {
            format!("include:{domain} returned no SPF policy")
        }
        Diagnostic::IncludeLoop(domain) => format!("include:{domain} includes itself"),
        Diagnostic::RedirectLoop(domain) => format!("redirect={domain} forms a loop"),
        Diagnostic::Malformed { domain, reason } => {
            format!("malformed policy at {domain}: {reason}")
        }
        Diagnostic::PtrDiscouraged => {
            "the ptr mechanism was used; RFC 7208 Section 5.5 discourages it".to_string()
        }
        Diagnostic::TempFailure(reason) => format!("temporary DNS failure: {reason}"),
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let check = self.check;
        writeln!(f, "Result: {}", check.result)?;
        writeln!(f, "  {}", self.explanation())?;
        if let Some(policy) = &check.policy_text {
            writeln!(f)?;
            writeln!(f, "SPF record: {policy}")?;
        }

        if !check.match_trail.is_empty() {
            writeln!(f)?;
            writeln!(f, "Matched by:")?;
            let chain = check.redirect_trail.iter().chain(check.match_trail.iter());
            for (depth, term) in chain.enumerate() {
                writeln!(f, "  {:indent$}{term}", "", indent = depth * 2)?;
            }
        } else if !check.redirect_trail.is_empty() {
            writeln!(f)?;
            writeln!(f, "Redirected via:")?;
            for hop in &check.redirect_trail {
                writeln!(f, "  {hop}")?;
            }
        }

        writeln!(f)?;
        writeln!(f, "DNS lookups: {}/{MAX_DNS_LOOKUPS}", check.lookups)?;

        if !check.diagnostics.is_empty() {
            writeln!(f)?;
            writeln!(f, "Additional information:")?;
            for diagnostic in &check.diagnostics {
                writeln!(f, "  - {}", describe(diagnostic))?;
            }
        }
        Ok(())
    }
}
