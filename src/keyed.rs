//! Ordered key/value collections produced by the combinators.
//!
//! Keys keep the order of the input collection, whether they are positions
//! (`enumerate()`) or arbitrary labels.

use std::slice;
use std::vec;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keyed<K, V> {
    entries: Vec<(K, V)>,
}

impl<K, V> Keyed<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, (K, V)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn into_values(self) -> Vec<V> {
        self.entries.into_iter().map(|(_, value)| value).collect()
    }

    /// First value stored under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: PartialEq<Q>,
        Q: ?Sized,
    {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value)
    }

    pub fn into_inner(self) -> Vec<(K, V)> {
        self.entries
    }
}

impl<K, V> Default for Keyed<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> From<Vec<(K, V)>> for Keyed<K, V> {
    fn from(entries: Vec<(K, V)>) -> Self {
        Self { entries }
    }
}

impl<K, V> FromIterator<(K, V)> for Keyed<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<K, V> IntoIterator for Keyed<K, V> {
    type Item = (K, V);
    type IntoIter = vec::IntoIter<(K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, K, V> IntoIterator for &'a Keyed<K, V> {
    type Item = &'a (K, V);
    type IntoIter = slice::Iter<'a, (K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_insertion_order() {
        let keyed: Keyed<&str, u32> = vec![("b", 2), ("a", 1), ("c", 3)].into();

        assert_eq!(keyed.keys().copied().collect::<Vec<_>>(), ["b", "a", "c"]);
        assert_eq!(keyed.clone().into_values(), [2, 1, 3]);
        assert_eq!(keyed.len(), 3);
    }

    #[test]
    fn test_lookup_by_key() {
        let keyed: Keyed<String, u32> = [("one".to_string(), 1)].into_iter().collect();

        assert_eq!(keyed.get("one"), Some(&1));
        assert_eq!(keyed.get("two"), None);
        assert!(Keyed::<u8, u8>::new().is_empty());
    }
}
