//! Ordered, case-insensitive header multi-map.

use serde::{Deserialize, Serialize};

/// One header name with every value seen for it, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    /// Name as spelled by its first occurrence.
    pub name: String,
    pub values: Vec<String>,
}

/// Ordered multi-map from header name to decoded values.
///
/// Names compare case-insensitively. Entries keep the order in which each
/// name first appeared; repeated headers append to the existing entry. A
/// header with blank content is stored as an empty string, never dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderCollection {
    entries: Vec<HeaderEntry>,
}

impl HeaderCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `name`.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.position(name) {
            Some(i) => self.entries[i].values.push(value),
            None => self.entries.push(HeaderEntry {
                name: name.to_string(),
                values: vec![value],
            }),
        }
    }

    /// Replace every value of `name` with `value`, keeping its position.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        match self.position(name) {
            Some(i) => self.entries[i].values = vec![value.into()],
            None => self.add(name, value),
        }
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name)
            .and_then(|i| self.entries[i].values.first())
            .map(String::as_str)
    }

    /// All values of `name`; empty if absent.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.position(name)
            .map(|i| self.entries[i].values.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Remove `name` entirely, returning its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.position(name).map(|i| self.entries.remove(i).values)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn entries(&self) -> &[HeaderEntry] {
        &self.entries
    }

    /// `(name, value)` pairs grouped by first occurrence of each name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|e| e.values.iter().map(move |v| (e.name.as_str(), v.as_str())))
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut headers = HeaderCollection::new();
        headers.add("Subject", "Hi");
        assert_eq!(headers.get("SUBJECT"), Some("Hi"));
        assert!(headers.contains("subject"));
    }

    #[test]
    fn test_first_occurrence_order_is_kept() {
        let mut headers = HeaderCollection::new();
        headers.add("Received", "a");
        headers.add("From", "x@y.z");
        headers.add("received", "b");
        let names: Vec<_> = headers.names().collect();
        assert_eq!(names, vec!["Received", "From"]);
        assert_eq!(headers.get_all("RECEIVED"), &["a".to_string(), "b".to_string()]);
        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(pairs, vec![("Received", "a"), ("Received", "b"), ("From", "x@y.z")]);
    }

    #[test]
    fn test_blank_value_is_kept() {
        let mut headers = HeaderCollection::new();
        headers.add("Subject", "");
        assert_eq!(headers.get("Subject"), Some(""));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_set_and_remove() {
        let mut headers = HeaderCollection::new();
        headers.add("X-A", "1");
        headers.add("X-A", "2");
        headers.set("x-a", "3");
        assert_eq!(headers.get_all("X-A"), &["3".to_string()]);
        assert_eq!(headers.remove("X-A"), Some(vec!["3".to_string()]));
        assert!(headers.is_empty());
    }
}
