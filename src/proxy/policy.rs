//! Domain policy evaluation.
//!
//! A single blocked domain is matched against the raw request target. The
//! match is a case-sensitive substring test against both the bare domain and
//! its `www.` form, so `https://old.reddit.com/r/rust` and `notreddit.com:443`
//! are both blocked when the domain is `reddit.com`.
//!
//! # Example
//!
//! ```
//! use proxied_proxy::proxy::DomainPolicy;
//!
//! let policy = DomainPolicy::new("reddit.com");
//! assert!(policy.is_blocked("www.reddit.com:443"));
//! assert!(!policy.is_blocked("example.com:443"));
//! ```

/// Outcome of evaluating a request target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Proceed with the request.
    Allow,
    /// Refuse (or intercept) the request.
    Block,
}

/// Immutable single-domain blocklist.
#[derive(Debug, Clone)]
pub struct DomainPolicy {
    /// Blocked domain as configured (e.g. `reddit.com`).
    domain: String,
    /// The `www.` form of the domain.
    www_domain: String,
}

impl DomainPolicy {
    /// Create a policy blocking `domain` and `www.<domain>`.
    pub fn new(domain: impl Into<String>) -> Self {
        let domain = domain.into();
        let www_domain = format!("www.{}", domain);
        Self { domain, www_domain }
    }

    /// The configured blocked domain.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns true iff the target contains the blocked domain or its `www.` form.
    pub fn is_blocked(&self, target: &str) -> bool {
        target.contains(&self.domain) || target.contains(&self.www_domain)
    }

    /// Evaluate a request target.
    pub fn evaluate(&self, target: &str) -> PolicyDecision {
        if self.is_blocked(target) {
            PolicyDecision::Block
        } else {
            PolicyDecision::Allow
        }
    }

    /// Human-readable refusal text for the blocked domain.
    pub fn block_message(&self) -> String {
        format!("Access to {} is not allowed.", self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> DomainPolicy {
        DomainPolicy::new("reddit.com")
    }

    #[test]
    fn test_exact_host_blocked() {
        assert!(policy().is_blocked("reddit.com"));
        assert!(policy().is_blocked("reddit.com:443"));
    }

    #[test]
    fn test_www_host_blocked() {
        assert!(policy().is_blocked("www.reddit.com:443"));
    }

    #[test]
    fn test_full_url_blocked() {
        assert!(policy().is_blocked("http://www.reddit.com/r/rust?sort=new"));
    }

    #[test]
    fn test_substring_anywhere_blocked() {
        // Unrelated hosts embedding the domain are blocked too.
        assert!(policy().is_blocked("notreddit.com:443"));
        assert!(policy().is_blocked("http://example.com/?next=reddit.com"));
    }

    #[test]
    fn test_match_is_case_sensitive() {
        assert!(!policy().is_blocked("REDDIT.COM:443"));
        assert!(!policy().is_blocked("Reddit.com"));
    }

    #[test]
    fn test_unrelated_host_allowed() {
        assert!(!policy().is_blocked("example.com:443"));
        assert!(!policy().is_blocked("http://reddit.co/"));
    }

    #[test]
    fn test_evaluate() {
        assert_eq!(policy().evaluate("reddit.com:443"), PolicyDecision::Block);
        assert_eq!(policy().evaluate("example.com:443"), PolicyDecision::Allow);
    }

    #[test]
    fn test_block_message() {
        assert_eq!(
            policy().block_message(),
            "Access to reddit.com is not allowed."
        );
    }
}
