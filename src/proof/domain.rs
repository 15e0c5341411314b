//! Hostname normalization and syntax checks.

use crate::error::{Error, Result};

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Normalize a claimed domain and check that it is a plausible public hostname.
///
/// Surrounding whitespace and a single trailing dot are dropped and the
/// result is lowercased. URLs, ports, paths, IP literals and single-label
/// names are rejected rather than stripped: the caller must claim exactly
/// the hostname it intends to prove.
///
/// # Errors
///
/// Returns [`Error::InvalidDomain`] naming the first problem found.
pub fn normalize_domain(input: &str) -> Result<String> {
    let invalid = |reason: &str| Error::InvalidDomain {
        domain: input.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = input.trim();
    let domain = trimmed
        .strip_suffix('.')
        .unwrap_or(trimmed)
        .to_ascii_lowercase();

    if domain.is_empty() {
        return Err(invalid("empty domain"));
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(invalid("longer than 253 characters"));
    }
    if domain.contains("://") || domain.contains(['/', ':', '?', '#', '@']) {
        return Err(invalid("expected a bare hostname, not a URL"));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(invalid("must contain at least two labels"));
    }

    for label in &labels {
        if label.is_empty() {
            return Err(invalid("empty label"));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(invalid("label longer than 63 characters"));
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(invalid("labels may only contain letters, digits and '-'"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("labels may not start or end with '-'"));
        }
    }

    if labels
        .last()
        .is_some_and(|tld| tld.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(invalid("top-level label may not be numeric"));
    }

    Ok(domain)
}
