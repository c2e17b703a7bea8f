use std::net::IpAddr;

use tracing::warn;

/// RFC 7208 Section 4.6.4 cap on DNS-querying terms per check.
pub const MAX_DNS_LOOKUPS: usize = 10;

/// Conditions that end a check with a permanent error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fatal {
    /// The named domain publishes more than one SPF record.
    MultipleRecords(String),
    /// An `include` target has no usable policy.
    IncludeWithoutPolicy(String),
    /// An `include` names a domain whose policy is already being expanded.
    IncludeLoop(String),
    /// A redirect chain came back to a domain it already visited.
    RedirectLoop(String),
    /// A directive or record could not be parsed.
    Malformed { domain: String, reason: String },
}

/// Accounting for one authorization check. Created per check and threaded
/// by reference through every fetch, expansion and match, so the lookup
/// budget covers the whole tree of included and redirected policies.
#[derive(Debug)]
pub struct CheckContext {
    pub client_ip: IpAddr,
    /// SPF record of the checked domain itself, once fetched.
    pub policy_text: Option<String>,
    pub lookups: usize,
    pub fatal: Option<Fatal>,
    pub ptr_used: bool,
    pub redirect_trail: Vec<String>,
}

impl CheckContext {
    /// An IPv4-mapped IPv6 client is checked as the IPv4 address it carries.
    pub fn new(client_ip: IpAddr) -> Self {
        Self {
            client_ip: client_ip.to_canonical(),
            policy_text: None,
            lookups: 0,
            fatal: None,
            ptr_used: false,
            redirect_trail: Vec::new(),
        }
    }

    /// Counts one DNS-querying term. Exceeding the cap is only noted here;
    /// evaluation carries on and the verdict is annotated afterwards.
    pub fn count_lookup(&mut self) {
        self.lookups += 1;
        if self.lookups == MAX_DNS_LOOKUPS + 1 {
            warn!(limit = MAX_DNS_LOOKUPS, "DNS lookup limit exceeded");
        }
    }

    pub fn over_limit(&self) -> bool {
        self.lookups > MAX_DNS_LOOKUPS
    }

    /// Records a fatal condition. The first one wins: it is the condition
    /// that actually stopped evaluation.
    pub fn set_fatal(&mut self, fatal: Fatal) {
        if self.fatal.is_none() {
            warn!(?fatal, "evaluation aborted");
            self.fatal = Some(fatal);
        }
    }
}
