/// Normalize a domain: lowercase + strip trailing dot.
pub fn normalize(domain: &str) -> String {
    let d = domain.trim().to_ascii_lowercase();
    d.strip_suffix('.').unwrap_or(&d).to_string()
}

/// Extract domain part from an email address (after `@`).
/// Returns None if no `@` is present.
pub fn domain_from_email(email: &str) -> Option<&str> {
    email.rsplit_once('@').map(|(_, domain)| domain)
}

/// Hostname syntax check: at least two labels, labels of 1-63 letters, digits,
/// hyphens or underscores, no leading/trailing hyphen, 253 octets overall.
/// Underscores are accepted since SPF records commonly live under `_spf.`.
pub fn is_valid_domain(domain: &str) -> bool {
    let d = domain.strip_suffix('.').unwrap_or(domain);
    if d.is_empty() || d.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = d.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    })
}

/// Resolve a user-supplied sender into the domain whose policy is checked.
/// Accepts either a bare domain or an e-mail address.
pub fn sender_domain(input: &str) -> Option<String> {
    let candidate = match domain_from_email(input) {
        Some(_) if input.starts_with('@') => return None,
        Some(domain) => domain,
        None => input,
    };
    is_valid_domain(candidate).then(|| normalize(candidate))
}
