//! Human-readable setup instructions for each verification type.

use super::VerificationType;
use crate::config::VerifierConfig;

/// Render the steps a developer must take to publish `token` for `domain`.
#[must_use]
pub fn render_instructions(
    verification_type: VerificationType,
    token: &str,
    domain: &str,
    config: &VerifierConfig,
) -> String {
    match verification_type {
        VerificationType::DnsTxt => format!(
            "Add a DNS TXT record to prove you control {domain}:\n\
             \n  Host:  {label}.{domain}\n  Type:  TXT\n  Value: {token}\n\
             \nDNS changes can take several minutes to propagate. \
             Request verification once the record resolves.",
            label = config.dns_label,
        ),
        VerificationType::MetaTag => format!(
            "Add the following tag inside the <head> of https://{domain}/ :\n\
             \n  <meta name=\"{name}\" content=\"{token}\">\n\
             \nThe tag must be served in the page HTML, not injected by script.",
            name = config.meta_name(),
        ),
        VerificationType::FileUpload => format!(
            "Host a plain-text file at https://{domain}{path} containing only:\n\
             \n  {token}\n\
             \nThe file must be reachable without authentication. Redirects \
             are followed only within {domain}; a redirect to another host \
             fails the check.",
            path = config.file_path,
        ),
        VerificationType::ManualReview => format!(
            "Your claim for {domain} has been queued for manual review. \
             A member of the review team will contact you.\n\
             \nReference token: {token}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "rapid-verify-0123abcd";

    #[test]
    fn test_dns_instructions_name_record() {
        let text = render_instructions(
            VerificationType::DnsTxt,
            TOKEN,
            "example.com",
            &VerifierConfig::default(),
        );
        assert!(text.contains("_rapid-verify.example.com"));
        assert!(text.contains("TXT"));
        assert!(text.contains(TOKEN));
    }

    #[test]
    fn test_meta_instructions_include_tag() {
        let text = render_instructions(
            VerificationType::MetaTag,
            TOKEN,
            "example.com",
            &VerifierConfig::default(),
        );
        assert!(text.contains(&format!(
            "<meta name=\"rapid-verify\" content=\"{TOKEN}\">"
        )));
    }

    #[test]
    fn test_file_instructions_use_configured_path() {
        let config = VerifierConfig {
            file_path: "/.well-known/rapid.txt".to_string(),
            ..VerifierConfig::default()
        };
        let text =
            render_instructions(VerificationType::FileUpload, TOKEN, "example.com", &config);
        assert!(text.contains("https://example.com/.well-known/rapid.txt"));
        assert!(text.contains(TOKEN));
        assert!(text.contains("followed only within example.com"));
    }

    #[test]
    fn test_manual_review_mentions_queue_and_token() {
        let text = render_instructions(
            VerificationType::ManualReview,
            TOKEN,
            "example.com",
            &VerifierConfig::default(),
        );
        assert!(text.contains("manual review"));
        assert!(text.contains(TOKEN));
    }
}
