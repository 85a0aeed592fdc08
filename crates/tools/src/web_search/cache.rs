use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Identifies a cacheable response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub operation: &'static str,
    pub query: String,
    pub engine: String,
    pub time_range: String,
    pub language: String,
    pub max_results: usize,
}

impl CacheKey {
    pub fn for_url(operation: &'static str, url: &str) -> Self {
        Self {
            operation,
            query: url.to_string(),
            engine: String::new(),
            time_range: String::new(),
            language: String::new(),
            max_results: 0,
        }
    }
}

pub struct ResponseCache {
    ttl: Duration,
    enabled: bool,
    entries: Mutex<HashMap<CacheKey, (Instant, Value)>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, enabled: bool) -> Self {
        Self {
            ttl,
            enabled,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        if !self.enabled {
            return None;
        }
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((stored, value)) if stored.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: CacheKey, value: Value) {
        if !self.enabled {
            return;
        }
        let mut entries = self.entries.lock();
        let ttl = self.ttl;
        entries.retain(|_, (stored, _)| stored.elapsed() < ttl);
        entries.insert(key, (Instant::now(), value));
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(query: &str) -> CacheKey {
        CacheKey {
            operation: "search",
            query: query.to_string(),
            engine: "duckduckgo".to_string(),
            time_range: "all".to_string(),
            language: "en".to_string(),
            max_results: 10,
        }
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(60), true);
        cache.insert(key("rust"), json!({"n": 1}));
        assert_eq!(cache.get(&key("rust")), Some(json!({"n": 1})));
        assert_eq!(cache.get(&key("go")), None);
    }

    #[test]
    fn test_expired_entry_is_evicted() {
        let cache = ResponseCache::new(Duration::ZERO, true);
        cache.insert(key("rust"), json!(1));
        assert_eq!(cache.get(&key("rust")), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache = ResponseCache::new(Duration::from_secs(60), false);
        cache.insert(key("rust"), json!(1));
        assert!(cache.get(&key("rust")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_distinguishes_time_range() {
        let cache = ResponseCache::new(Duration::from_secs(60), true);
        let mut week = key("rust");
        week.time_range = "week".to_string();
        cache.insert(week.clone(), json!("week"));
        assert!(cache.get(&key("rust")).is_none());
        assert_eq!(cache.get(&week), Some(json!("week")));
    }
}
