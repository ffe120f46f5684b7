/// Normalize a domain: lowercase + strip trailing dot.
pub fn normalize(domain: &str) -> String {
    let d = domain.to_ascii_lowercase();
    d.strip_suffix('.').unwrap_or(&d).to_string()
}

/// Check if `child` is `parent` itself or one of its subdomains, matching on
/// label boundaries (after normalization).
pub fn is_same_or_subdomain_of(child: &str, parent: &str) -> bool {
    let nc = normalize(child);
    let np = normalize(parent);
    if np.is_empty() {
        return false;
    }
    nc == np || nc.ends_with(&format!(".{}", np))
}

/// Split an email address into (local part, domain) at the last `@`.
/// Returns None if no `@` is present.
pub fn split_email(email: &str) -> Option<(&str, &str)> {
    email.rsplit_once('@')
}

/// Cheap syntactic sanity check for a host name: at least two dot-separated
/// labels of letters, digits, `-` or `_`, each 1..=63 bytes, at most 253
/// bytes overall, and a top-level label that is not all digits.
/// A single trailing dot is accepted.
pub fn is_valid_hostname(domain: &str) -> bool {
    let name = domain.strip_suffix('.').unwrap_or(domain);
    if name.is_empty() || name.len() > 253 {
        return false;
    }

    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    });

    let tld_ok = labels
        .last()
        .map_or(false, |tld| !tld.bytes().all(|b| b.is_ascii_digit()));

    labels_ok && tld_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Normalize tests ---

    #[test]
    fn normalize_lowercase() {
        assert_eq!(normalize("EXAMPLE.COM"), "example.com");
    }

    #[test]
    fn normalize_strip_trailing_dot() {
        assert_eq!(normalize("example.com."), "example.com");
    }

    #[test]
    fn normalize_combined() {
        assert_eq!(normalize("Mail.EXAMPLE.COM."), "mail.example.com");
    }

    // --- is_same_or_subdomain_of tests ---

    #[test]
    fn subdomain_true() {
        assert!(is_same_or_subdomain_of("mail.example.com", "example.com"));
        assert!(is_same_or_subdomain_of("a.b.c.example.com", "example.com"));
    }

    #[test]
    fn subdomain_self_matches() {
        assert!(is_same_or_subdomain_of("example.com", "example.com"));
        assert!(is_same_or_subdomain_of("example.com.", "EXAMPLE.com"));
    }

    #[test]
    fn subdomain_partial_label_no_match() {
        assert!(!is_same_or_subdomain_of("notexample.com", "example.com"));
    }

    #[test]
    fn subdomain_different_domain() {
        assert!(!is_same_or_subdomain_of("mail.other.com", "example.com"));
    }

    #[test]
    fn subdomain_empty_parent() {
        assert!(!is_same_or_subdomain_of("example.com", ""));
    }

    // --- split_email tests ---

    #[test]
    fn split_email_normal() {
        assert_eq!(split_email("user@example.com"), Some(("user", "example.com")));
    }

    #[test]
    fn split_email_no_at() {
        assert_eq!(split_email("example.com"), None);
    }

    #[test]
    fn split_email_multiple_at() {
        // rsplit_once takes the last @
        assert_eq!(
            split_email("user@host@example.com"),
            Some(("user@host", "example.com"))
        );
    }

    #[test]
    fn split_email_empty_parts() {
        assert_eq!(split_email("@example.com"), Some(("", "example.com")));
        assert_eq!(split_email("user@"), Some(("user", "")));
    }

    // --- is_valid_hostname tests ---

    #[test]
    fn hostname_valid() {
        assert!(is_valid_hostname("example.com"));
        assert!(is_valid_hostname("_spf.mail-relay.example.co.uk"));
        assert!(is_valid_hostname("example.com."));
        assert!(is_valid_hostname("ignore.redirect"));
    }

    #[test]
    fn hostname_needs_two_labels() {
        assert!(!is_valid_hostname("localhost"));
        assert!(!is_valid_hostname(""));
        assert!(!is_valid_hostname("."));
    }

    #[test]
    fn hostname_rejects_bad_labels() {
        assert!(!is_valid_hostname("exa mple.com"));
        assert!(!is_valid_hostname("example..com"));
        assert!(!is_valid_hostname(".example.com"));
        assert!(!is_valid_hostname("D&(WQ*DGW)QGDQD.com"));
        assert!(!is_valid_hostname(&format!("{}.com", "a".repeat(64))));
    }

    #[test]
    fn hostname_rejects_numeric_tld() {
        assert!(!is_valid_hostname("192.0.2.1"));
    }
}
