//! Set of client IDs a host accepts as guests.

use serde::{Deserialize, Serialize};

/// Insertion-ordered, duplicate-free list of client IDs.
/// Serialized as `{"allowed_clients": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowList {
    #[serde(rename = "allowed_clients", default)]
    ids: Vec<String>,
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id`. Returns false if it was blank or already present.
    pub fn insert(&mut self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() || self.contains(id) {
            return false;
        }
        self.ids.push(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|x| x == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for AllowList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = AllowList::new();
        for id in iter {
            list.insert(id.as_ref());
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_order_and_skips_duplicates() {
        let mut list = AllowList::new();
        assert!(list.insert("b"));
        assert!(list.insert("a"));
        assert!(!list.insert("b"));
        assert!(!list.insert("   "));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(list.contains("a"));
        assert!(!list.contains("c"));
    }

    #[test]
    fn json_shape() {
        let list: AllowList = ["x", "y"].into_iter().collect();
        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(json, r#"{"allowed_clients":["x","y"]}"#);
        let back: AllowList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, list);
        let empty: AllowList = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }
}
