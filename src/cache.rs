//! In-process, two-level query cache.
//!
//! L1 is an exact map keyed by SHA-256 of the full fingerprint. L2 buckets
//! entries by the fingerprint *minus the query text* and answers when a
//! cached query embedding is cosine-close (>= threshold) to the probe, so
//! "authentication handler" can serve "auth logic" without touching the
//! store. Entries expire after a TTL and are evicted lazily; invalidation
//! is per-index and runs before any indexing write.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

/// Cache identity of one search call. `rest` is a canonical rendering of
/// everything except the query text (filters, limit, min-score, mode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub index_name: String,
    pub query: String,
    pub rest: String,
}

impl Fingerprint {
    pub fn full_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.index_name.as_bytes());
        hasher.update([0]);
        hasher.update(self.query.as_bytes());
        hasher.update([0]);
        hasher.update(self.rest.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Bucket key for the semantic level: identical for two calls that
    /// differ only in query text.
    pub fn bucket_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.index_name.as_bytes());
        hasher.update([0]);
        hasher.update(self.rest.as_bytes());
        hex::encode(hasher.finalize())
    }
}

struct ExactEntry<T> {
    payload: T,
    index_name: String,
    inserted_at: Instant,
}

struct SemanticEntry<T> {
    query_embedding: Vec<f32>,
    payload: T,
    index_name: String,
    inserted_at: Instant,
}

struct Levels<T> {
    l1: HashMap<String, ExactEntry<T>>,
    l2: HashMap<String, Vec<SemanticEntry<T>>>,
}

/// Each L2 bucket keeps at most this many entries; the oldest is dropped.
const L2_BUCKET_CAP: usize = 16;

pub struct QueryCache<T> {
    levels: Mutex<Levels<T>>,
    ttl: Duration,
    threshold: f32,
}

impl<T: Clone> QueryCache<T> {
    pub fn new(ttl: Duration, threshold: f32) -> Self {
        Self {
            levels: Mutex::new(Levels {
                l1: HashMap::new(),
                l2: HashMap::new(),
            }),
            ttl,
            threshold,
        }
    }

    /// L1 probe: exact fingerprint hash.
    pub fn probe_exact(&self, fp: &Fingerprint) -> Option<T> {
        let key = fp.full_key();
        let mut levels = self.levels.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = levels.l1.get(&key) {
            if entry.inserted_at.elapsed() <= self.ttl {
                return Some(entry.payload.clone());
            }
            levels.l1.remove(&key);
        }
        None
    }

    /// L2 probe: nearest cached query embedding within the bucket, accepted
    /// at cosine ≥ threshold.
    pub fn probe_semantic(&self, fp: &Fingerprint, query_embedding: &[f32]) -> Option<T> {
        let key = fp.bucket_key();
        let mut levels = self.levels.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = levels.l2.get_mut(&key)?;
        bucket.retain(|e| e.inserted_at.elapsed() <= self.ttl);

        bucket
            .iter()
            .find(|e| cosine_similarity(&e.query_embedding, query_embedding) >= self.threshold)
            .map(|e| e.payload.clone())
    }

    /// Write-through to both levels. Bypassing callers simply never call
    /// this.
    pub fn store(&self, fp: &Fingerprint, query_embedding: Vec<f32>, payload: T) {
        let full = fp.full_key();
        let bucket_key = fp.bucket_key();
        let now = Instant::now();

        let mut levels = self.levels.lock().unwrap_or_else(|e| e.into_inner());
        levels.l1.insert(
            full,
            ExactEntry {
                payload: payload.clone(),
                index_name: fp.index_name.clone(),
                inserted_at: now,
            },
        );

        let bucket = levels.l2.entry(bucket_key).or_default();
        if bucket.len() >= L2_BUCKET_CAP {
            bucket.remove(0);
        }
        bucket.push(SemanticEntry {
            query_embedding,
            payload,
            index_name: fp.index_name.clone(),
            inserted_at: now,
        });
    }

    /// Drop every entry belonging to `index_name`, both levels. Called at
    /// the start of each indexing run, before the first chunk write.
    pub fn invalidate(&self, index_name: &str) {
        let mut levels = self.levels.lock().unwrap_or_else(|e| e.into_inner());
        levels.l1.retain(|_, e| e.index_name != index_name);
        for bucket in levels.l2.values_mut() {
            bucket.retain(|e| e.index_name != index_name);
        }
        levels.l2.retain(|_, b| !b.is_empty());
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(index: &str, query: &str) -> Fingerprint {
        Fingerprint {
            index_name: index.to_string(),
            query: query.to_string(),
            rest: "limit=10;min=0;mode=auto".to_string(),
        }
    }

    fn cache() -> QueryCache<Vec<u32>> {
        QueryCache::new(Duration::from_secs(60), 0.95)
    }

    #[test]
    fn l1_exact_hit_and_miss() {
        let c = cache();
        let f = fp("idx", "getUserById");
        assert!(c.probe_exact(&f).is_none());
        c.store(&f, vec![1.0, 0.0], vec![42]);
        assert_eq!(c.probe_exact(&f), Some(vec![42]));
        // Different query → L1 miss.
        assert!(c.probe_exact(&fp("idx", "other")).is_none());
    }

    #[test]
    fn l2_serves_paraphrases_above_threshold() {
        let c = cache();
        let first = fp("idx", "authentication handler");
        c.store(&first, vec![1.0, 0.0, 0.0], vec![7]);

        // Same non-query fingerprint, near-identical embedding: hit.
        let paraphrase = fp("idx", "auth logic");
        assert_eq!(c.probe_semantic(&paraphrase, &[0.999, 0.02, 0.0]), Some(vec![7]));

        // Orthogonal embedding: miss.
        assert!(c.probe_semantic(&paraphrase, &[0.0, 1.0, 0.0]).is_none());
    }

    #[test]
    fn l2_respects_non_query_fingerprint() {
        let c = cache();
        let first = fp("idx", "authentication handler");
        c.store(&first, vec![1.0, 0.0], vec![7]);

        // Same embedding, different limit bucket: miss.
        let mut other = fp("idx", "auth logic");
        other.rest = "limit=50;min=0;mode=auto".to_string();
        assert!(c.probe_semantic(&other, &[1.0, 0.0]).is_none());
    }

    #[test]
    fn invalidation_is_per_index() {
        let c = cache();
        c.store(&fp("alpha", "q"), vec![1.0], vec![1]);
        c.store(&fp("beta", "q"), vec![1.0], vec![2]);

        c.invalidate("alpha");
        assert!(c.probe_exact(&fp("alpha", "q")).is_none());
        assert_eq!(c.probe_exact(&fp("beta", "q")), Some(vec![2]));
    }

    #[test]
    fn expired_entries_are_ignored() {
        let c: QueryCache<Vec<u32>> = QueryCache::new(Duration::ZERO, 0.95);
        let f = fp("idx", "q");
        c.store(&f, vec![1.0], vec![1]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(c.probe_exact(&f).is_none());
        assert!(c.probe_semantic(&f, &[1.0]).is_none());
    }

    #[test]
    fn bucket_is_bounded() {
        let c = cache();
        for i in 0..(L2_BUCKET_CAP + 4) {
            c.store(&fp("idx", &format!("q{i}")), vec![i as f32, 1.0], vec![i as u32]);
        }
        let levels = c.levels.lock().unwrap();
        let bucket = levels.l2.values().next().unwrap();
        assert_eq!(bucket.len(), L2_BUCKET_CAP);
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0); // length mismatch
    }
}
