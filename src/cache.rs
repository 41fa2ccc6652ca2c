//! Memoization of processed card images for one run.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

/// Store for processed images keyed by source path.
pub trait ImageCache<V> {
    fn get(&mut self, key: &Path) -> Option<V>;
    fn insert(&mut self, key: PathBuf, value: V);
}

/// Least-recently-used cache holding at most `capacity` entries.
#[derive(Debug)]
pub struct LruCache<V> {
    capacity: usize,
    entries: HashMap<PathBuf, V>,
    // front = least recently used
    order: VecDeque<PathBuf>,
}

impl<V> LruCache<V> {
    pub fn new(capacity: usize) -> Self {
        LruCache {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn touch(&mut self, key: &Path) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

impl<V: Clone> ImageCache<V> for LruCache<V> {
    fn get(&mut self, key: &Path) -> Option<V> {
        let hit = self.entries.get(key).cloned();
        if hit.is_some() {
            self.touch(key);
        }
        hit
    }

    fn insert(&mut self, key: PathBuf, value: V) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), value).is_some() {
            self.touch(&key);
            return;
        }
        self.order.push_back(key);
        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(old) => {
                    self.entries.remove(&old);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        assert_eq!(cache.get(Path::new("a")), Some(1));
        cache.insert("c".into(), 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(Path::new("b")), None);
        assert_eq!(cache.get(Path::new("a")), Some(1));
        assert_eq!(cache.get(Path::new("c")), Some(3));
    }

    #[test]
    fn reinsert_replaces_without_growing() {
        let mut cache = LruCache::new(2);
        cache.insert("a".into(), 1);
        cache.insert("a".into(), 5);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(Path::new("a")), Some(5));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut cache = LruCache::new(0);
        cache.insert("a".into(), 1);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get(Path::new("a")), None);
    }

    #[test]
    fn huge_capacity_allocates_lazily() {
        let mut cache = LruCache::new(usize::MAX);
        cache.insert("a".into(), 1);
        assert_eq!(cache.get(Path::new("a")), Some(1));
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut cache = LruCache::new(3);
        for i in 0..10 {
            cache.insert(PathBuf::from(format!("{i}.png")), i);
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.get(Path::new("9.png")), Some(9));
        assert_eq!(cache.get(Path::new("6.png")), None);
    }
}
