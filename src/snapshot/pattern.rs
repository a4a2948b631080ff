//! Wildcard permission patterns
//!
//! Supports two pattern types:
//! 1. Universal wildcard: `"*"` matches every permission
//! 2. Prefix wildcard: `"billing.*"` matches `"billing.read"` and
//!    `"billing.invoice.write"`, but not `"billing"` or `"billingx.read"`

use std::fmt;

/// A parsed wildcard pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WildcardPattern {
    /// `*`
    All,
    /// `prefix.*`, stored with the trailing dot (`"prefix."`)
    Prefix(String),
}

/// Reason a pattern was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedPattern(pub String);

impl fmt::Display for MalformedPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bad wildcard pattern '{}'", self.0)
    }
}

impl WildcardPattern {
    /// Parses a pattern
    ///
    /// Anything other than `*` must end in `.*` and be at least three
    /// characters long.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bitmap_rbac::snapshot::WildcardPattern;
    ///
    /// let pattern = WildcardPattern::parse("a.*").unwrap();
    /// assert!(pattern.matches("a.read"));
    /// assert!(!pattern.matches("ab.read"));
    /// assert!(!pattern.matches("a"));
    ///
    /// assert!(WildcardPattern::parse("a*").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, MalformedPattern> {
        if raw == "*" {
            return Ok(WildcardPattern::All);
        }

        if raw.len() < 3 || !raw.ends_with(".*") {
            return Err(MalformedPattern(raw.to_string()));
        }

        Ok(WildcardPattern::Prefix(raw[..raw.len() - 1].to_string()))
    }

    /// Checks whether a permission name matches
    pub fn matches(&self, name: &str) -> bool {
        match self {
            WildcardPattern::All => true,
            WildcardPattern::Prefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("*", "anything" ; "universal")]
    #[test_case("*", "" ; "universal empty")]
    #[test_case("a.*", "a.read" ; "prefix read")]
    #[test_case("a.*", "a.write" ; "prefix write")]
    #[test_case("a.*", "a.b.c" ; "prefix nested")]
    #[test_case("org.dept.*", "org.dept.view" ; "multi segment prefix")]
    fn test_matches(pattern: &str, name: &str) {
        assert!(WildcardPattern::parse(pattern).unwrap().matches(name));
    }

    #[test_case("a.*", "ab.read" ; "longer first segment")]
    #[test_case("a.*", "a" ; "bare prefix")]
    #[test_case("a.*", "b.read" ; "other prefix")]
    #[test_case("A.*", "a.read" ; "case sensitive")]
    fn test_no_match(pattern: &str, name: &str) {
        assert!(!WildcardPattern::parse(pattern).unwrap().matches(name));
    }

    #[test_case("" ; "empty")]
    #[test_case(".*" ; "too short")]
    #[test_case("a*" ; "missing dot")]
    #[test_case("a.b" ; "no star")]
    #[test_case("**" ; "double star")]
    fn test_malformed(pattern: &str) {
        assert_eq!(
            WildcardPattern::parse(pattern),
            Err(MalformedPattern(pattern.to_string()))
        );
    }
}
