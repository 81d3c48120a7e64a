//! First-seen ordering for grouped rows and pivot axes.

use std::collections::HashMap;
use std::hash::Hash;

/// Assigns each distinct key a stable index on first sight.
///
/// Shared by the heatmap pivot and the trend series so both keep the
/// engine's row order when they regroup flat rows.
#[derive(Clone, Debug)]
pub struct OrderedIndex<K> {
    positions: HashMap<K, usize>,
    keys: Vec<K>,
}

impl<K> Default for OrderedIndex<K> {
    fn default() -> Self {
        Self { positions: HashMap::new(), keys: Vec::new() }
    }
}

impl<K: Clone + Eq + Hash> OrderedIndex<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `key`, inserting it at the end when unseen.
    pub fn insert(&mut self, key: K) -> usize {
        if let Some(position) = self.positions.get(&key) {
            return *position;
        }
        let position = self.keys.len();
        self.positions.insert(key.clone(), position);
        self.keys.push(key);
        position
    }

    pub fn get(&self, key: &K) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn into_keys(self) -> Vec<K> {
        self.keys
    }
}

impl<K: Clone + Eq + Hash> FromIterator<K> for OrderedIndex<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut index = Self::new();
        for key in iter {
            index.insert(key);
        }
        index
    }
}
