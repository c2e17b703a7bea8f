//! Evaluation of a resolved policy by inline expansion of `include`.
//!
//! The engine owns a working sequence of directive tokens and walks it with
//! an index. An `include` splices the included policy's tokens in right
//! after itself, so nested directives are visited before the rest of the
//! enclosing policy, in record order. Open includes form the attribution
//! stack; each expansion is registered against the id of its last entry so
//! that a non-match there closes it again. Several expansions can close on
//! the same entry (an include that is the last term of another include), in
//! which case they unwind innermost first.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::common::dns::{DnsError, DnsResolver};
use crate::common::domain::normalize;

use super::context::{CheckContext, Fatal};
use super::matcher;
use super::mechanism::{Directive, Mechanism, Qualifier};
use super::record::PolicyRecord;
use super::redirect;

/// A matching directive and the chain of includes that led to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub qualifier: Qualifier,
    /// Outermost include first, matching directive last.
    pub trail: Vec<String>,
}

#[derive(Debug, Clone)]
struct Entry {
    id: usize,
    token: String,
    /// Domain whose policy the token came from; the default target.
    domain: String,
}

#[derive(Debug)]
struct Frame {
    id: usize,
    directive: String,
    target: String,
    domain: String,
}

struct Expansion {
    root: String,
    sequence: Vec<Entry>,
    stack: Vec<Frame>,
    /// Entry id -> frames that close on it, outermost first.
    closing: HashMap<usize, Vec<usize>>,
    next_id: usize,
}

impl Expansion {
    fn new(policy: &PolicyRecord) -> Self {
        let mut expansion = Self {
            root: policy.domain.clone(),
            sequence: Vec::with_capacity(policy.mechanisms.len()),
            stack: Vec::new(),
            closing: HashMap::new(),
            next_id: 0,
        };
        let entries = expansion.entries(policy.mechanisms.clone(), &policy.domain);
        expansion.sequence = entries;
        expansion
    }

    fn id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn entries(&mut self, tokens: Vec<String>, domain: &str) -> Vec<Entry> {
        tokens
            .into_iter()
            .map(|token| Entry {
                id: self.id(),
                token,
                domain: domain.to_string(),
            })
            .collect()
    }

    /// Whether `domain` is already being evaluated, at top level or as an
    /// open include.
    fn is_open(&self, domain: &str) -> bool {
        self.root == domain
            || self
                .stack
                .iter()
                .any(|frame| frame.target == domain || frame.domain == domain)
    }

    /// Splices `included` in after the include at `cursor` and opens a frame
    /// for it. Frames that were due to close on the include itself move to
    /// the new last entry; with nothing to splice they close right away.
    fn expand(&mut self, cursor: usize, include: &Entry, target: &str, included: PolicyRecord) {
        let mut closing = self.closing.remove(&include.id).unwrap_or_default();
        let PolicyRecord { domain, mechanisms, .. } = included;

        let entries = self.entries(mechanisms, &domain);
        let Some(last) = entries.last().map(|entry| entry.id) else {
            self.unwind(closing);
            return;
        };

        let frame = self.id();
        closing.push(frame);
        self.closing.insert(last, closing);
        self.stack.push(Frame {
            id: frame,
            directive: include.token.clone(),
            target: target.to_string(),
            domain,
        });
        self.sequence.splice(cursor + 1..cursor + 1, entries);
    }

    fn close_at(&mut self, entry: usize) {
        if let Some(frames) = self.closing.remove(&entry) {
            self.unwind(frames);
        }
    }

    fn unwind(&mut self, mut frames: Vec<usize>) {
        while let Some(frame) = frames.pop() {
            if self.stack.last().map(|open| open.id) != Some(frame) {
                break;
            }
            if let Some(closed) = self.stack.pop() {
                trace!(include = %closed.directive, "include closed without match");
            }
        }
    }

    fn trail(&self, matched: &str) -> Vec<String> {
        self.stack
            .iter()
            .map(|frame| frame.directive.clone())
            .chain(std::iter::once(matched.to_string()))
            .collect()
    }
}

/// Fetches an include target, following a redirect-only policy. `None`
/// means the target has no usable policy.
async fn fetch_included<R: DnsResolver>(
    resolver: &R,
    target: &str,
    ctx: &mut CheckContext,
) -> Result<Option<PolicyRecord>, DnsError> {
    let mut record = PolicyRecord::fetch(resolver, target).await?;
    if record.redirect_target().is_some() {
        match redirect::resolve(resolver, record, ctx, false).await? {
            Some(resolved) => record = resolved,
            None => return Ok(None),
        }
    }
    Ok(record.has_policy().then_some(record))
}

/// Walks `policy`'s directives in order and returns the first match.
///
/// `Ok(None)` covers both exhaustion and a fatal condition; the latter is
/// recorded in `ctx`. An include without a usable policy ends the whole
/// evaluation at that point, whatever follows it. Temporary resolver
/// failures are returned as errors.
pub async fn evaluate<R: DnsResolver>(
    resolver: &R,
    policy: &PolicyRecord,
    ctx: &mut CheckContext,
) -> Result<Option<Match>, DnsError> {
    let mut expansion = Expansion::new(policy);
    let mut cursor = 0;

    while let Some(entry) = expansion.sequence.get(cursor).cloned() {
        let directive = match Directive::parse(&entry.token) {
            Ok(directive) => directive,
            Err(e) => {
                ctx.set_fatal(Fatal::Malformed {
                    domain: entry.domain,
                    reason: format!("{}: {e}", entry.token),
                });
                return Ok(None);
            }
        };

        if let Mechanism::Include(target) = &directive.mechanism {
            let target = normalize(target);
            if expansion.is_open(&target) {
                ctx.set_fatal(Fatal::IncludeLoop(target));
                return Ok(None);
            }
            let Some(included) = fetch_included(resolver, &target, ctx).await? else {
                ctx.set_fatal(Fatal::IncludeWithoutPolicy(target));
                return Ok(None);
            };
            ctx.count_lookup();
            debug!(
                include = %entry.token,
                terms = included.mechanisms.len(),
                depth = expansion.stack.len() + 1,
                lookups = ctx.lookups,
                "expanding include"
            );
            expansion.expand(cursor, &entry, &target, included);
            cursor += 1;
            continue;
        }

        if matcher::matches(resolver, &directive.mechanism, &entry.domain, ctx).await? {
            let trail = expansion.trail(&entry.token);
            debug!(
                directive = %entry.token,
                qualifier = %directive.qualifier,
                domain = %entry.domain,
                ?trail,
                "matched"
            );
            return Ok(Some(Match {
                qualifier: directive.qualifier,
                trail,
            }));
        }

        expansion.close_at(entry.id);
        cursor += 1;
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::common::dns::MockResolver;

    async fn eval(
        resolver: &MockResolver,
        domain: &str,
        ip: &str,
    ) -> (Option<Match>, CheckContext) {
        let mut ctx = CheckContext::new(ip.parse().unwrap());
        let policy = PolicyRecord::fetch(resolver, domain).await.unwrap();
        let outcome = evaluate(resolver, &policy, &mut ctx).await.unwrap();
        (outcome, ctx)
    }

    #[tokio::test]
    async fn first_match_wins_and_stops() {
        let resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["v=spf1 ip4:192.0.2.0/24 a mx -all"]);

        let (outcome, ctx) = eval(&resolver, "example.com", "192.0.2.9").await;
        let m = outcome.unwrap();
        assert_eq!(m.trail, vec!["ip4:192.0.2.0/24"]);
        assert_eq!(m.qualifier, Qualifier::Pass);
        assert_eq!(ctx.lookups, 0);
        assert_eq!(resolver.queries(), vec!["TXT example.com"]);
    }

    #[tokio::test]
    async fn include_match_trail() {
        let resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["v=spf1 include:_spf.provider.net -all"]);
        resolver.add_txt("_spf.provider.net", vec!["v=spf1 ip4:198.51.100.0/24 ~all"]);

        let (outcome, ctx) = eval(&resolver, "example.com", "198.51.100.20").await;
        let m = outcome.unwrap();
        assert_eq!(m.trail, vec!["include:_spf.provider.net", "ip4:198.51.100.0/24"]);
        assert_eq!(ctx.lookups, 1);
    }

    #[tokio::test]
    async fn nested_includes_are_visited_before_the_rest() {
        let resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["v=spf1 include:outer.example a:after.example -all"]);
        resolver.add_txt("outer.example", vec!["v=spf1 a:o1.example include:inner.example -all"]);
        resolver.add_txt("inner.example", vec!["v=spf1 a:i1.example -all"]);

        let (outcome, _) = eval(&resolver, "example.com", "203.0.113.1").await;
        assert!(outcome.is_none());
        assert_eq!(
            resolver.queries(),
            vec![
                "TXT example.com",
                "TXT outer.example",
                "A o1.example",
                "TXT inner.example",
                "A i1.example",
                "A after.example",
            ]
        );
    }

    #[tokio::test]
    async fn includes_closing_together_unwind_fully() {
        let resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["v=spf1 include:outer.example a:after.example -all"]);
        resolver.add_txt("outer.example", vec!["v=spf1 a:o1.example include:inner.example -all"]);
        resolver.add_txt("inner.example", vec!["v=spf1 a:i1.example -all"]);
        resolver.add_a("after.example", vec![Ipv4Addr::new(203, 0, 113, 1)]);

        let (outcome, ctx) = eval(&resolver, "example.com", "203.0.113.1").await;
        // Both includes closed on a:i1.example, so the match is attributed
        // to the top level only.
        assert_eq!(outcome.unwrap().trail, vec!["a:after.example"]);
        assert_eq!(ctx.lookups, 5);
    }

    #[tokio::test]
    async fn identical_tokens_in_different_includes_are_distinct() {
        let resolver = MockResolver::new();
        resolver.add_txt(
            "example.com",
            vec!["v=spf1 include:one.example include:two.example -all"],
        );
        resolver.add_txt("one.example", vec!["v=spf1 ip4:192.0.2.1 -all"]);
        resolver.add_txt("two.example", vec!["v=spf1 ip4:192.0.2.1 ip4:192.0.2.2 -all"]);

        let (outcome, _) = eval(&resolver, "example.com", "192.0.2.2").await;
        assert_eq!(outcome.unwrap().trail, vec!["include:two.example", "ip4:192.0.2.2"]);
    }

    #[tokio::test]
    async fn matched_qualifier_comes_from_directive() {
        let resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["v=spf1 include:deny.example +all"]);
        resolver.add_txt("deny.example", vec!["v=spf1 -ip4:192.0.2.0/24"]);

        let (outcome, _) = eval(&resolver, "example.com", "192.0.2.7").await;
        let m = outcome.unwrap();
        assert_eq!(m.qualifier, Qualifier::Fail);
        assert_eq!(m.trail, vec!["include:deny.example", "-ip4:192.0.2.0/24"]);
    }

    #[tokio::test]
    async fn missing_include_aborts_before_later_terms() {
        let resolver = MockResolver::new();
        resolver.add_txt(
            "example.com",
            vec!["v=spf1 include:nothing.example ip4:192.0.2.0/24 -all"],
        );

        let (outcome, ctx) = eval(&resolver, "example.com", "192.0.2.1").await;
        assert!(outcome.is_none());
        assert_eq!(ctx.fatal, Some(Fatal::IncludeWithoutPolicy("nothing.example".into())));
        assert_eq!(ctx.lookups, 0);
    }

    #[tokio::test]
    async fn include_with_multiple_records_is_unresolvable() {
        let resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["v=spf1 include:twice.example -all"]);
        resolver.add_txt("twice.example", vec!["v=spf1 a -all", "v=spf1 mx -all"]);

        let (_, ctx) = eval(&resolver, "example.com", "192.0.2.1").await;
        assert_eq!(ctx.fatal, Some(Fatal::IncludeWithoutPolicy("twice.example".into())));
    }

    #[tokio::test]
    async fn empty_include_contributes_nothing() {
        let resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["v=spf1 include:empty.example ip4:192.0.2.1 -all"]);
        resolver.add_txt("empty.example", vec!["v=spf1 -all"]);

        let (outcome, ctx) = eval(&resolver, "example.com", "192.0.2.1").await;
        assert_eq!(outcome.unwrap().trail, vec!["ip4:192.0.2.1"]);
        assert_eq!(ctx.lookups, 1);
        assert!(ctx.fatal.is_none());
    }

    #[tokio::test]
    async fn empty_include_closes_enclosing_frame() {
        let resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["v=spf1 include:outer.example ip4:192.0.2.1 -all"]);
        resolver.add_txt("outer.example", vec!["v=spf1 a:o.example include:empty.example"]);
        resolver.add_txt("empty.example", vec!["v=spf1 -all"]);

        let (outcome, _) = eval(&resolver, "example.com", "192.0.2.1").await;
        assert_eq!(outcome.unwrap().trail, vec!["ip4:192.0.2.1"]);
    }

    #[tokio::test]
    async fn include_of_redirect_policy() {
        let resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["v=spf1 include:alias.example -all"]);
        resolver.add_txt("alias.example", vec!["v=spf1 redirect=real.example"]);
        resolver.add_txt("real.example", vec!["v=spf1 a -all"]);
        resolver.add_a("real.example", vec![Ipv4Addr::new(192, 0, 2, 80)]);

        let (outcome, ctx) = eval(&resolver, "example.com", "192.0.2.80").await;
        assert_eq!(outcome.unwrap().trail, vec!["include:alias.example", "a"]);
        // redirect hop, include, a
        assert_eq!(ctx.lookups, 3);
        assert!(ctx.redirect_trail.is_empty());
        assert!(resolver.queries().contains(&"A real.example".to_string()));
    }

    #[tokio::test]
    async fn self_include_is_a_loop() {
        let resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["v=spf1 include:a.example -all"]);
        resolver.add_txt("a.example", vec!["v=spf1 include:b.example"]);
        resolver.add_txt("b.example", vec!["v=spf1 include:a.example"]);

        let (outcome, ctx) = eval(&resolver, "example.com", "192.0.2.1").await;
        assert!(outcome.is_none());
        assert_eq!(ctx.fatal, Some(Fatal::IncludeLoop("a.example".into())));
    }

    #[tokio::test]
    async fn malformed_term_is_fatal_when_reached() {
        let resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["v=spf1 ip4:192.0.2.1 bogus:thing -all"]);

        let (outcome, _) = eval(&resolver, "example.com", "192.0.2.1").await;
        assert!(outcome.is_some());

        let (outcome, ctx) = eval(&resolver, "example.com", "192.0.2.2").await;
        assert!(outcome.is_none());
        assert!(matches!(ctx.fatal, Some(Fatal::Malformed { .. })));
    }

    #[tokio::test]
    async fn temporary_failure_inside_include() {
        let resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["v=spf1 include:flaky.example -all"]);
        resolver.fail("flaky.example", DnsError::TempFail("SERVFAIL".into()));

        let mut ctx = CheckContext::new("192.0.2.1".parse().unwrap());
        let policy = PolicyRecord::fetch(&resolver, "example.com").await.unwrap();
        let err = evaluate(&resolver, &policy, &mut ctx).await.unwrap_err();
        assert!(err.is_temporary());
    }
}
