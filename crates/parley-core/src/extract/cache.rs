//! Short-lived extraction result cache keyed by an input-text prefix
//!
//! Entries expire after the configured TTL and are never invalidated early.
//! Clones share the same underlying map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::models::Transaction;

struct Entry {
    stored_at: Instant,
    transactions: Vec<Transaction>,
}

#[derive(Clone)]
pub struct ExtractionCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    ttl: Duration,
    key_prefix_chars: usize,
}

impl ExtractionCache {
    pub fn new(ttl: Duration, key_prefix_chars: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            key_prefix_chars: key_prefix_chars.max(1),
        }
    }

    /// Cache key: the first `key_prefix_chars` characters of the trimmed text
    pub fn key_for(&self, text: &str) -> String {
        text.trim().chars().take(self.key_prefix_chars).collect()
    }

    /// Cached transactions for `text`, if present and not expired
    ///
    /// Returns clones; callers stamp fresh identities before handing them out.
    pub fn get(&self, text: &str) -> Option<Vec<Transaction>> {
        let key = self.key_for(text);
        let mut entries = self.entries.lock().ok()?;
        match entries.get(&key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.transactions.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, text: &str, transactions: &[Transaction]) {
        let key = self.key_for(text);
        if let Ok(mut entries) = self.entries.lock() {
            let ttl = self.ttl;
            entries.retain(|_, e| e.stored_at.elapsed() < ttl);
            entries.insert(
                key,
                Entry {
                    stored_at: Instant::now(),
                    transactions: transactions.to_vec(),
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, TxDate};

    fn sample() -> Vec<Transaction> {
        vec![Transaction::new(TxDate::Unknown, "Coffee", 4.5, Direction::Out)]
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = ExtractionCache::new(Duration::from_secs(60), 100);
        cache.put("spent $4.50 on coffee", &sample());
        let hit = cache.get("spent $4.50 on coffee").unwrap();
        assert_eq!(hit[0].description, "Coffee");
    }

    #[test]
    fn test_prefix_keying() {
        let cache = ExtractionCache::new(Duration::from_secs(60), 5);
        cache.put("hello world", &sample());
        assert!(cache.get("hello there").is_some());
        assert!(cache.get("help me").is_none());
    }

    #[test]
    fn test_expired_entries_miss() {
        let cache = ExtractionCache::new(Duration::from_millis(0), 100);
        cache.put("x $1", &sample());
        assert!(cache.get("x $1").is_none());
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = ExtractionCache::new(Duration::from_secs(60), 100);
        let other = cache.clone();
        cache.put("shared $2", &sample());
        assert!(other.get("shared $2").is_some());
        assert_eq!(other.len(), 1);
    }
}
