use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::control::MutationHook;

/// Small TTL cache for read-endpoint responses.
///
/// Entries expire on their own; every control-plane mutation clears the
/// whole cache early through [`MutationHook`], so operators never read a
/// stale chain snapshot after add/update/delete.
pub struct ResponseCache {
    entries: RwLock<HashMap<String, (Instant, Value)>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().ok()?;
        let (stored_at, value) = entries.get(key)?;
        if stored_at.elapsed() < self.ttl {
            Some(value.clone())
        } else {
            None
        }
    }

    pub fn put(&self, key: String, value: Value) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, (Instant::now(), value));
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

impl MutationHook for ResponseCache {
    fn on_mutate(&self) {
        self.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_then_get() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.put("health".to_string(), json!({"status": "ok"}));
        assert_eq!(cache.get("health"), Some(json!({"status": "ok"})));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let cache = ResponseCache::new(Duration::ZERO);
        cache.put("health".to_string(), json!({"status": "ok"}));
        assert_eq!(cache.get("health"), None);
    }

    #[test]
    fn test_mutation_hook_invalidates() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.put("chains".to_string(), json!([1, 2]));
        cache.on_mutate();
        assert_eq!(cache.get("chains"), None);
    }
}
