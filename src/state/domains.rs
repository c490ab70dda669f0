//! Host names the capsule answers to

use std::collections::HashSet;

/// Fallback name when nothing is configured
pub const FALLBACK_DOMAIN: &str = "localhost";

/// Ordered, deduplicated set of lowercase host names
///
/// Never empty. The certificate's subject alternative names must match it
/// exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainSet {
    names: Vec<String>,
}

impl DomainSet {
    /// Build from configured names, plus the onion address when known
    pub fn new<I, S>(configured: I, onion_address: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self { names: Vec::new() };
        for name in configured {
            set.push(name.as_ref());
        }
        if set.names.is_empty() {
            set.push(FALLBACK_DOMAIN);
        }
        if let Some(onion) = onion_address {
            set.push(onion);
        }
        set
    }

    fn push(&mut self, name: &str) {
        let name = name.trim().to_lowercase();
        if !name.is_empty() && !self.names.contains(&name) {
            self.names.push(name);
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.names.iter().any(|n| *n == name)
    }

    /// Same size and same members, ignoring order and case
    pub fn same_members<S: AsRef<str>>(&self, other: &[S]) -> bool {
        if other.len() != self.names.len() {
            return false;
        }
        let theirs: HashSet<String> = other.iter().map(|s| s.as_ref().to_lowercase()).collect();
        theirs.len() == self.names.len() && self.names.iter().all(|n| theirs.contains(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_when_empty() {
        let set = DomainSet::new(Vec::<String>::new(), None);
        assert_eq!(set.as_slice(), ["localhost"]);
    }

    #[test]
    fn test_onion_appended_after_fallback() {
        let set = DomainSet::new(Vec::<String>::new(), Some("abcd.onion"));
        assert_eq!(set.as_slice(), ["localhost", "abcd.onion"]);
    }

    #[test]
    fn test_dedup_and_lowercase() {
        let set = DomainSet::new(["Example.org", "example.org ", "b.example"], Some("EXAMPLE.ORG"));
        assert_eq!(set.as_slice(), ["example.org", "b.example"]);
        assert!(set.contains("B.EXAMPLE"));
    }

    #[test]
    fn test_same_members() {
        let set = DomainSet::new(["example.org", "abcd.onion"], None);
        assert!(set.same_members(&["abcd.onion", "example.org"]));
        assert!(!set.same_members(&["example.org"]));
        assert!(!set.same_members(&["example.org", "example.org"]));
        assert!(!set.same_members(&["example.org", "other.onion"]));
    }
}
