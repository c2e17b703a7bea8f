//! Policy record retrieval and token-level parsing.

use tracing::{debug, warn};

use crate::common::dns::{DnsError, DnsResolver};
use crate::common::domain::normalize;

use super::mechanism::{Directive, Mechanism, Qualifier, SpfParseError};

/// What ends a policy once its mechanisms are exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// Trailing `all` directive; its qualifier is the default result.
    Default(Qualifier),
    /// `redirect=<domain>` as the only term of the record.
    Redirect(String),
}

/// How the TXT answer for a domain resolved into a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    /// Exactly one `v=spf1` record, parsed.
    Found,
    /// No `v=spf1` record among the TXT answers.
    Missing,
    /// More than one `v=spf1` record.
    Multiple,
    /// One `v=spf1` record that could not be split into terms.
    Invalid(SpfParseError),
}

/// One domain's policy as fetched for a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRecord {
    pub domain: String,
    /// Every TXT string returned for the domain, SPF or not.
    pub raw_texts: Vec<String>,
    pub policy_text: Option<String>,
    /// Directive tokens in evaluation order, kept as written in the record.
    pub mechanisms: Vec<String>,
    pub terminal: Option<Terminal>,
    pub status: RecordStatus,
}

impl PolicyRecord {
    /// Query the domain's TXT records and parse the single SPF record among
    /// them. NXDOMAIN and empty answers give a `Missing` record; only
    /// temporary resolver failures are returned as errors.
    pub async fn fetch<R: DnsResolver>(resolver: &R, domain: &str) -> Result<Self, DnsError> {
        let domain = normalize(domain);
        let raw_texts = match resolver.query_txt(&domain).await {
            Ok(records) => records,
            Err(DnsError::NxDomain | DnsError::NoRecords) => Vec::new(),
            Err(e) => {
                warn!(%domain, error = %e, "TXT lookup failed");
                return Err(e);
            }
        };

        let spf: Vec<&String> = raw_texts.iter().filter(|s| is_spf_record(s)).collect();
        let mut record = PolicyRecord {
            domain,
            raw_texts: raw_texts.clone(),
            policy_text: None,
            mechanisms: Vec::new(),
            terminal: None,
            status: RecordStatus::Missing,
        };

        match spf.as_slice() {
            [] => debug!(domain = %record.domain, txt = raw_texts.len(), "no SPF record"),
            [text] => {
                record.policy_text = Some((*text).clone());
                match parse(text) {
                    Ok((mechanisms, terminal)) => {
                        record.mechanisms = mechanisms;
                        record.terminal = terminal;
                        record.status = RecordStatus::Found;
                    }
                    Err(e) => {
                        warn!(domain = %record.domain, error = %e, "unusable SPF record");
                        record.status = RecordStatus::Invalid(e);
                    }
                }
                debug!(domain = %record.domain, policy = %text, "fetched SPF record");
            }
            _ => {
                warn!(domain = %record.domain, count = spf.len(), "multiple SPF records");
                record.status = RecordStatus::Multiple;
            }
        }
        Ok(record)
    }

    pub fn has_policy(&self) -> bool {
        self.status == RecordStatus::Found
    }

    pub fn redirect_target(&self) -> Option<&str> {
        match &self.terminal {
            Some(Terminal::Redirect(target)) => Some(target),
            _ => None,
        }
    }

    pub fn default_qualifier(&self) -> Option<Qualifier> {
        match self.terminal {
            Some(Terminal::Default(q)) => Some(q),
            _ => None,
        }
    }
}

/// Check if a TXT record is an SPF record (case-insensitive v=spf1 prefix).
fn is_spf_record(txt: &str) -> bool {
    let lower = txt.trim().to_ascii_lowercase();
    lower == "v=spf1" || lower.starts_with("v=spf1 ")
}

/// A modifier is `name=value` where the name is a letter followed by
/// letters, digits, `-`, `_` or `.` (RFC 7208 Section 12), e.g. `exp=`,
/// `redirect=` or `x-tracking=`. Returns the lowercased name and the value.
fn as_modifier(term: &str) -> Option<(String, &str)> {
    let (name, value) = term.split_once('=')?;
    let mut chars = name.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')) {
        return None;
    }
    Some((name.to_ascii_lowercase(), value))
}

/// Split an SPF record into its directive tokens and terminal directive.
///
/// `redirect=` is only understood when it is the record's sole term; a
/// redirect next to other terms is rejected rather than given a precedence
/// rule. Other modifiers are dropped. A trailing `all` directive becomes
/// the default qualifier; any other last token stays a mechanism.
pub fn parse(text: &str) -> Result<(Vec<String>, Option<Terminal>), SpfParseError> {
    let mut terms = text.split_whitespace();
    match terms.next() {
        Some(version) if version.eq_ignore_ascii_case("v=spf1") => {}
        _ => return Err(SpfParseError::InvalidVersion),
    }
    let terms: Vec<&str> = terms.collect();

    let redirect = terms
        .iter()
        .filter_map(|t| as_modifier(t))
        .find(|(name, _)| name == "redirect");
    if let Some((_, target)) = redirect {
        if terms.len() > 1 {
            return Err(SpfParseError::RedirectWithMechanisms(target.to_string()));
        }
        if target.is_empty() {
            return Err(SpfParseError::MissingArgument("redirect".into()));
        }
        return Ok((Vec::new(), Some(Terminal::Redirect(normalize(target)))));
    }

    let mut mechanisms: Vec<String> = terms
        .into_iter()
        .filter(|t| as_modifier(t).is_none())
        .map(String::from)
        .collect();

    let terminal = match mechanisms.last().map(|t| Directive::parse(t)) {
        Some(Ok(Directive { qualifier, mechanism: Mechanism::All })) => {
            mechanisms.pop();
            Some(Terminal::Default(qualifier))
        }
        _ => None,
    };
    Ok((mechanisms, terminal))
}
