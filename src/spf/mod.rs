//! SPF (Sender Policy Framework) evaluation with match attribution.
//!
//! A check fetches the sender domain's policy, follows a redirect if the
//! policy is one, then walks its directives with every `include` expanded
//! in place. Besides the result it reports which directive chain matched,
//! the redirect hops taken and anything worth flagging along the way.

mod context;
mod engine;
mod eval;
mod matcher;
mod mechanism;
mod record;
mod redirect;
mod verdict;

pub use context::{CheckContext, Fatal, MAX_DNS_LOOKUPS};
pub use engine::Match;
pub use eval::SpfChecker;
pub use mechanism::{parse_mechanism, Directive, DualCidr, Mechanism, Qualifier, SpfParseError};
pub use record::{PolicyRecord, RecordStatus, Terminal};

use std::fmt;

/// SPF evaluation result (RFC 7208 Section 2.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpfResult {
    /// Sender is authorized.
    Pass,
    /// Sender is NOT authorized.
    Fail,
    /// Weak authorization failure.
    SoftFail,
    /// No assertion made.
    Neutral,
    /// No SPF record found.
    None,
    /// Transient DNS error.
    TempError,
    /// Permanent error (multiple records, unresolvable include, syntax).
    PermError,
}

impl fmt::Display for SpfResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SpfResult::Pass => "pass",
            SpfResult::Fail => "fail",
            SpfResult::SoftFail => "softfail",
            SpfResult::Neutral => "neutral",
            SpfResult::None => "none",
            SpfResult::TempError => "temperror",
            SpfResult::PermError => "permerror",
        })
    }
}

/// Findings reported next to the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// More DNS-querying terms than the protocol allows; the count is given.
    LookupLimitExceeded(usize),
    /// The domain has no SPF record. `txt_records` counts its other TXT records.
    NoSpfRecord { domain: String, txt_records: usize },
    MultipleRecords(String),
    IncludeWithoutPolicy(String),
    IncludeLoop(String),
    RedirectLoop(String),
    Malformed { domain: String, reason: String },
    /// A `ptr` mechanism was evaluated (discouraged by RFC 7208 Section 5.5).
    PtrDiscouraged,
    TempFailure(String),
}

/// Outcome of one authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpfCheck {
    pub domain: String,
    pub result: SpfResult,
    /// The checked domain's own SPF record, if one was retrieved.
    pub policy_text: Option<String>,
    pub lookups: usize,
    /// Include chain to the matching directive, outermost first. Empty when
    /// the result came from the default qualifier or an error.
    pub match_trail: Vec<String>,
    /// `redirect=<domain>` hops taken before evaluation.
    pub redirect_trail: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SpfCheck {
    /// A temporary failure before the domain's own record was retrieved.
    pub fn top_fetch_failed(&self) -> bool {
        self.result == SpfResult::TempError && self.policy_text.is_none()
    }

    pub fn lookup_limit_exceeded(&self) -> bool {
        self.lookups > MAX_DNS_LOOKUPS
    }
}
