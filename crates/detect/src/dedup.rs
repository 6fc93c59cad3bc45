//! Spatial-grid deduplication of detections

use std::collections::HashSet;

/// Grid cell of a pixel position: `(floor(x / bucket), floor(y / bucket))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub col: i64,
    pub row: i64,
}

impl DedupKey {
    pub fn new(x: f64, y: f64, bucket_size: usize) -> Self {
        let b = bucket_size.max(1) as f64;
        Self {
            col: (x / b).floor() as i64,
            row: (y / b).floor() as i64,
        }
    }
}

/// Buckets already holding a detection during one detector run.
///
/// The first candidate to claim a bucket wins; later ones in the same
/// bucket are dropped without comparison.
#[derive(Debug, Clone)]
pub struct DedupIndex {
    bucket_size: usize,
    seen: HashSet<DedupKey>,
}

impl DedupIndex {
    pub fn new(bucket_size: usize) -> Self {
        Self {
            bucket_size: bucket_size.max(1),
            seen: HashSet::new(),
        }
    }

    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    pub fn key(&self, x: f64, y: f64) -> DedupKey {
        DedupKey::new(x, y, self.bucket_size)
    }

    /// Claim the bucket of `(x, y)`. Returns false if it was already taken.
    pub fn insert(&mut self, x: f64, y: f64) -> bool {
        let key = self.key(x, y);
        self.seen.insert(key)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.seen.contains(&self.key(x, y))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_floors() {
        assert_eq!(DedupKey::new(99.9, 0.0, 100), DedupKey { col: 0, row: 0 });
        assert_eq!(DedupKey::new(100.0, 250.0, 100), DedupKey { col: 1, row: 2 });
        assert_eq!(DedupKey::new(-0.5, 10.0, 100), DedupKey { col: -1, row: 0 });
    }

    #[test]
    fn test_first_seen_wins() {
        let mut index = DedupIndex::new(500);
        assert!(index.insert(10.0, 10.0));
        assert!(!index.insert(499.0, 2.0));
        assert!(index.insert(500.0, 2.0));
        assert!(index.contains(0.0, 0.0));
        assert_eq!(index.len(), 2);
    }
}
