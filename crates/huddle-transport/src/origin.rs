//! Origin allow-list for WebSocket upgrades.

/// Match one allow-list pattern against an origin.
///
/// A pattern ending in `*` matches any origin starting with the rest of the
/// pattern; any other pattern must match exactly.
#[must_use]
pub fn match_origin(pattern: &str, origin: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => origin.starts_with(prefix),
        None => pattern == origin,
    }
}

/// Allowed upgrade origins.
///
/// An empty policy allows every origin. Requests without an `Origin` header
/// come from non-browser clients and are always allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginPolicy {
    patterns: Vec<String>,
}

impl OriginPolicy {
    #[must_use]
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Check the `Origin` header of an upgrade request.
    #[must_use]
    pub fn allows(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin else {
            return true;
        };
        self.patterns.is_empty() || self.patterns.iter().any(|p| match_origin(p, origin))
    }

    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_origin() {
        assert!(match_origin("http://localhost", "http://localhost"));
        assert!(!match_origin("http://localhost", "http://localhost:5173"));
        assert!(match_origin("https://*", "https://app.example.com"));
        assert!(match_origin("http://localhost:*", "http://localhost:5173"));
        assert!(!match_origin("http://localhost:*", "http://evil.com"));
    }

    #[test]
    fn test_policy() {
        let policy = OriginPolicy::new(["http://localhost:5173", "https://app.*"]);

        assert!(policy.allows(None));
        assert!(policy.allows(Some("http://localhost:5173")));
        assert!(policy.allows(Some("https://app.example.com")));
        assert!(!policy.allows(Some("https://evil.example.com")));
        assert!(!policy.allows(Some("")));
    }

    #[test]
    fn test_empty_policy_allows_all() {
        let policy = OriginPolicy::default();
        assert!(policy.allows(Some("https://anything.example")));
    }
}
