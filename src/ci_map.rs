//! Case-insensitive, case-preserving ordered map.
//!
//! Column headers, docket keys and record field names are all looked up without regard to
//! case, but the casing written to the output must be the one the user last wrote. [`CiMap`]
//! keeps both:
//!
//! - lookups normalize the key (Unicode lowercase)
//! - iteration yields the stored key casing, in first-insertion order
//! - re-inserting an existing key under a different casing keeps its position but adopts the
//!   new casing (last write wins)

use std::fmt;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// An insertion-ordered map with case-insensitive string keys.
#[derive(Clone)]
pub struct CiMap<V> {
    entries: IndexMap<String, (String, V)>,
}

fn fold(key: &str) -> String {
    key.to_lowercase()
}

impl<V> CiMap<V> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a value, returning the previous value stored under the same folded key.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        let folded = fold(&key);
        match self.entries.get_mut(&folded) {
            Some(slot) => {
                slot.0 = key;
                Some(std::mem::replace(&mut slot.1, value))
            }
            None => {
                self.entries.insert(folded, (key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(&fold(key)).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries.get_mut(&fold(key)).map(|(_, v)| v)
    }

    /// Returns the stored casing and the value for `key`.
    pub fn get_key_value(&self, key: &str) -> Option<(&str, &V)> {
        self.entries
            .get(&fold(key))
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Position of `key` in insertion order.
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.entries.get_index_of(&fold(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&fold(key))
    }

    /// Remove `key`, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.shift_remove(&fold(key)).map(|(_, v)| v)
    }

    /// Iterate `(stored key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(|(_, v)| v)
    }
}

impl<V> Default for CiMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: PartialEq> PartialEq for CiMap<V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va == vb)
    }
}

impl<V: fmt::Debug> fmt::Debug for CiMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for CiMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K: Into<String>, V> Extend<(K, V)> for CiMap<V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<V> IntoIterator for CiMap<V> {
    type Item = (String, V);
    type IntoIter = indexmap::map::IntoValues<String, (String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

impl<V: Serialize> Serialize for CiMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::CiMap;

    #[test]
    fn lookup_ignores_case() {
        let mut m = CiMap::new();
        m.insert("Serial Number", 1);
        assert_eq!(m.get("serial number"), Some(&1));
        assert_eq!(m.get("SERIAL NUMBER"), Some(&1));
        assert!(m.contains_key("Serial number"));
        assert_eq!(m.get("Serial"), None);
    }

    #[test]
    fn reinsert_keeps_position_and_takes_last_casing() {
        let mut m = CiMap::new();
        m.insert("alpha", 1);
        m.insert("Beta", 2);
        let old = m.insert("ALPHA", 3);

        assert_eq!(old, Some(1));
        let pairs: Vec<(&str, &i32)> = m.iter().collect();
        assert_eq!(pairs, vec![("ALPHA", &3), ("Beta", &2)]);
    }

    #[test]
    fn remove_preserves_order() {
        let mut m: CiMap<i32> = [("a", 1), ("b", 2), ("c", 3)].into_iter().collect();
        assert_eq!(m.remove("B"), Some(2));
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(m.index_of("C"), Some(1));
    }

    #[test]
    fn serializes_with_stored_casing_in_order() {
        let m: CiMap<i32> = [("Zeta", 1), ("alpha", 2)].into_iter().collect();
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"Zeta":1,"alpha":2}"#);
    }
}
