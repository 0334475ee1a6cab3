//! Capability URI template expansion.
//!
//! Templates use three placeholders: `{alias}`, `{domain.tld}` and
//! `{pubkey}`. Substituted values are percent-encoded.

use crate::{PaymailError, Result};

/// Values available for substitution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TemplateParams<'a> {
    /// Value for `{alias}`.
    pub alias: Option<&'a str>,
    /// Value for `{domain.tld}`.
    pub domain: Option<&'a str>,
    /// Value for `{pubkey}`.
    pub pubkey: Option<&'a str>,
}

impl<'a> TemplateParams<'a> {
    /// Parameters for a handle.
    pub fn handle(alias: &'a str, domain: &'a str) -> Self {
        Self {
            alias: Some(alias),
            domain: Some(domain),
            pubkey: None,
        }
    }

    /// Add a public key.
    pub fn with_pubkey(mut self, pubkey: &'a str) -> Self {
        self.pubkey = Some(pubkey);
        self
    }
}

/// Expand a capability template.
///
/// Unknown placeholders, an unterminated `{`, or a placeholder without a
/// supplied value are errors. A lone `}` is kept literally.
///
/// # Example
///
/// ```
/// use paymail_lib::invoke::{expand_template, TemplateParams};
///
/// let url = expand_template(
///     "https://bsvalias.example.com/api/{alias}@{domain.tld}/id",
///     &TemplateParams::handle("alice", "example.com"),
/// )
/// .unwrap();
/// assert_eq!(url, "https://bsvalias.example.com/api/alice@example.com/id");
/// ```
pub fn expand_template(template: &str, params: &TemplateParams<'_>) -> Result<String> {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| PaymailError::template(template, "unterminated placeholder"))?;
        let name = &after[..close];

        let value = match name {
            "alias" => params.alias,
            "domain.tld" => params.domain,
            "pubkey" => params.pubkey,
            other => {
                return Err(PaymailError::template(
                    template,
                    format!("unknown placeholder {{{}}}", other),
                ))
            }
        }
        .ok_or_else(|| PaymailError::template(template, format!("no value for {{{}}}", name)))?;

        out.push_str(&urlencoding::encode(value));
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_expand_all_placeholders() {
        let params = TemplateParams::handle("alice", "example.com").with_pubkey("02abcd");
        let url = expand_template(
            "https://h/api/verify/{alias}@{domain.tld}/{pubkey}",
            &params,
        )
        .unwrap();
        assert_eq!(url, "https://h/api/verify/alice@example.com/02abcd");
    }

    #[test]
    fn test_values_are_encoded() {
        let params = TemplateParams::handle("a+b", "example.com");
        let url = expand_template("https://h/{alias}", &params).unwrap();
        assert_eq!(url, "https://h/a%2Bb");
    }

    #[test]
    fn test_template_errors() {
        let params = TemplateParams::handle("alice", "example.com");
        for template in [
            "https://h/{alias",
            "https://h/{unknown}",
            "https://h/{pubkey}",
            "https://h/{}",
        ] {
            assert!(
                matches!(
                    expand_template(template, &params),
                    Err(PaymailError::Template { .. })
                ),
                "{}",
                template
            );
        }
    }

    #[test]
    fn test_no_placeholders_and_stray_brace() {
        let params = TemplateParams::default();
        assert_eq!(expand_template("https://h/x}", &params).unwrap(), "https://h/x}");
    }

    proptest! {
        #[test]
        fn prop_expansion_never_leaves_placeholders(alias in "[a-z0-9._-]{1,20}", domain in "[a-z]{1,10}\\.[a-z]{2,5}") {
            let params = TemplateParams::handle(&alias, &domain);
            let url = expand_template("https://svc/{alias}@{domain.tld}/id", &params).unwrap();
            prop_assert!(!url.contains('{'), "url still contains a placeholder brace: {}", url);
            prop_assert_eq!(url, format!("https://svc/{}@{}/id", alias, domain));
        }

        #[test]
        fn prop_arbitrary_templates_do_not_panic(template in ".{0,64}") {
            let params = TemplateParams::handle("alice", "example.com").with_pubkey("02ab");
            let _ = expand_template(&template, &params);
        }
    }
}
