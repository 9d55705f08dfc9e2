//! Mapping masked recipients onto the true mailbox

/// Strip a path down to its bare address.
///
/// Surrounding whitespace and angle brackets go, as does anything after the
/// closing bracket (ESMTP parameters). `<>` becomes the empty string.
pub fn bare_address(path: &str) -> &str {
    let path = path.trim();
    match path.strip_prefix('<') {
        Some(inner) => match inner.split_once('>') {
            Some((address, _)) => address,
            None => inner,
        },
        None => path.trim_end_matches('>'),
    }
}

/// The masked-address convention.
///
/// Mail for `someone@<fake_domain>` goes to
/// `<true_local>+someone@<true_domain>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteRule {
    pub fake_domain: String,
    pub true_local: String,
    pub true_domain: String,
}

impl RewriteRule {
    pub fn new(fake_domain: &str, true_local: &str, true_domain: &str) -> Self {
        Self {
            fake_domain: fake_domain.to_owned(),
            true_local: true_local.to_owned(),
            true_domain: true_domain.to_owned(),
        }
    }

    /// Rewrite a single recipient, if it belongs to the fake domain.
    ///
    /// The domain comparison is an exact, case-sensitive suffix match.
    pub fn rewrite(&self, recipient: &str) -> Option<String> {
        let address = bare_address(recipient);
        let local = address.strip_suffix(&self.fake_domain)?.strip_suffix('@')?;
        Some(format!("{}+{}@{}", self.true_local, local, self.true_domain))
    }

    /// Resolve a recipient list to the single outbound mailbox.
    ///
    /// The first matching recipient wins; later ones are ignored.
    pub fn resolve<S: AsRef<str>>(&self, recipients: &[S]) -> Option<String> {
        recipients
            .iter()
            .find_map(|recipient| self.rewrite(recipient.as_ref()))
    }
}
