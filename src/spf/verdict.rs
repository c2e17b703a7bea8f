use super::context::{CheckContext, Fatal};
use super::engine::Match;
use super::mechanism::Qualifier;
use super::record::{PolicyRecord, RecordStatus};
use super::{Diagnostic, SpfCheck, SpfResult};

fn qualifier_to_result(q: Qualifier) -> SpfResult {
    match q {
        Qualifier::Pass => SpfResult::Pass,
        Qualifier::Fail => SpfResult::Fail,
        Qualifier::SoftFail => SpfResult::SoftFail,
        Qualifier::Neutral => SpfResult::Neutral,
    }
}

fn fatal_diagnostic(fatal: Fatal) -> Diagnostic {
    match fatal {
        Fatal::MultipleRecords(domain) => Diagnostic::MultipleRecords(domain),
        Fatal::IncludeWithoutPolicy(domain) => Diagnostic::IncludeWithoutPolicy(domain),
        Fatal::IncludeLoop(domain) => Diagnostic::IncludeLoop(domain),
        Fatal::RedirectLoop(domain) => Diagnostic::RedirectLoop(domain),
        Fatal::Malformed { domain, reason } => Diagnostic::Malformed { domain, reason },
    }
}

/// Turns the outcome of one check into its result and diagnostics.
///
/// `policy` is the policy that was evaluated (after redirects), if the
/// check got that far. A match decides the result outright; the lookup
/// limit and `ptr` use only annotate it.
pub fn classify(
    domain: String,
    outcome: Option<Match>,
    policy: Option<&PolicyRecord>,
    ctx: CheckContext,
) -> SpfCheck {
    let CheckContext {
        policy_text,
        lookups,
        fatal,
        ptr_used,
        redirect_trail,
        ..
    } = ctx;

    let mut diagnostics = Vec::new();
    if lookups > super::MAX_DNS_LOOKUPS {
        diagnostics.push(Diagnostic::LookupLimitExceeded(lookups));
    }

    let (result, match_trail) = match (outcome, fatal) {
        (Some(m), _) => (qualifier_to_result(m.qualifier), m.trail),
        (None, Some(fatal)) => {
            diagnostics.push(fatal_diagnostic(fatal));
            (SpfResult::PermError, Vec::new())
        }
        (None, None) => match policy {
            Some(p) if p.status == RecordStatus::Missing => {
                diagnostics.push(Diagnostic::NoSpfRecord {
                    domain: p.domain.clone(),
                    txt_records: p.raw_texts.len(),
                });
                (SpfResult::None, Vec::new())
            }
            Some(p) => match p.default_qualifier() {
                Some(q) => (qualifier_to_result(q), Vec::new()),
                None => (SpfResult::None, Vec::new()),
            },
            None => (SpfResult::None, Vec::new()),
        },
    };

    if ptr_used {
        diagnostics.push(Diagnostic::PtrDiscouraged);
    }

    SpfCheck {
        domain,
        result,
        policy_text,
        lookups,
        match_trail,
        redirect_trail,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spf::record::Terminal;

    fn ctx() -> CheckContext {
        CheckContext::new("192.0.2.1".parse().unwrap())
    }

    fn policy(status: RecordStatus, terminal: Option<Terminal>) -> PolicyRecord {
        PolicyRecord {
            domain: "example.com".into(),
            raw_texts: vec!["v=spf1 -all".into()],
            policy_text: None,
            mechanisms: Vec::new(),
            terminal,
            status,
        }
    }

    #[test]
    fn match_uses_directive_qualifier() {
        let m = Match { qualifier: Qualifier::Pass, trail: vec!["mx".into()] };
        let check = classify("example.com".into(), Some(m), None, ctx());
        assert_eq!(check.result, SpfResult::Pass);
        assert_eq!(check.match_trail, vec!["mx"]);
        assert!(check.diagnostics.is_empty());
    }

    #[test]
    fn match_over_limit_is_annotated_not_overridden() {
        let mut ctx = ctx();
        ctx.lookups = 12;
        let m = Match { qualifier: Qualifier::Pass, trail: vec!["a".into()] };
        let check = classify("example.com".into(), Some(m), None, ctx);
        assert_eq!(check.result, SpfResult::Pass);
        assert_eq!(check.diagnostics, vec![Diagnostic::LookupLimitExceeded(12)]);
    }

    #[test]
    fn exactly_ten_lookups_is_fine() {
        let mut ctx = ctx();
        ctx.lookups = 10;
        let p = policy(RecordStatus::Found, Some(Terminal::Default(Qualifier::SoftFail)));
        let check = classify("example.com".into(), None, Some(&p), ctx);
        assert_eq!(check.result, SpfResult::SoftFail);
        assert!(check.diagnostics.is_empty());
    }

    #[test]
    fn terminal_qualifier_without_match() {
        let p = policy(RecordStatus::Found, Some(Terminal::Default(Qualifier::Fail)));
        let check = classify("example.com".into(), None, Some(&p), ctx());
        assert_eq!(check.result, SpfResult::Fail);
    }

    #[test]
    fn no_terminal_no_match_is_none() {
        let p = policy(RecordStatus::Found, None);
        let check = classify("example.com".into(), None, Some(&p), ctx());
        assert_eq!(check.result, SpfResult::None);
        assert!(check.diagnostics.is_empty());
    }

    #[test]
    fn missing_record_reported() {
        let p = policy(RecordStatus::Missing, None);
        let check = classify("example.com".into(), None, Some(&p), ctx());
        assert_eq!(check.result, SpfResult::None);
        assert_eq!(
            check.diagnostics,
            vec![Diagnostic::NoSpfRecord { domain: "example.com".into(), txt_records: 1 }]
        );
    }

    #[test]
    fn fatal_include_is_permerror() {
        let mut ctx = ctx();
        ctx.set_fatal(Fatal::IncludeWithoutPolicy("gone.example".into()));
        ctx.ptr_used = true;
        let check = classify("example.com".into(), None, None, ctx);
        assert_eq!(check.result, SpfResult::PermError);
        assert_eq!(
            check.diagnostics,
            vec![
                Diagnostic::IncludeWithoutPolicy("gone.example".into()),
                Diagnostic::PtrDiscouraged,
            ]
        );
    }
}
