//! Small TTL cache with an injected clock, so expiry is testable without
//! wall-clock sleeps. Replaces what was once a module-level mutable map
//! with a 24-hour hardcoded expiry.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Box<dyn Clock>,
    entries: Mutex<HashMap<K, (DateTime<Utc>, V)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Box<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// 24 hours on the system clock — the production configuration.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::hours(24), Box::new(SystemClock))
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().ok()?;

        match entries.get(key) {
            Some((inserted_at, value)) if now - *inserted_at < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, (now, value));
        }
    }

    pub fn invalidate(&self, key: &K) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock the test can wind forward by hand.
    struct ManualClock {
        seconds: Arc<AtomicI64>,
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::<Utc>::from_timestamp(self.seconds.load(Ordering::SeqCst), 0)
                .expect("valid timestamp")
        }
    }

    fn manual() -> (Arc<AtomicI64>, Box<dyn Clock>) {
        let seconds = Arc::new(AtomicI64::new(1_700_000_000));
        let clock = ManualClock {
            seconds: seconds.clone(),
        };
        (seconds, Box::new(clock))
    }

    #[test]
    fn entries_expire_after_ttl() {
        let (seconds, clock) = manual();
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::hours(24), clock);

        cache.insert("k", 7);
        assert_eq!(cache.get(&"k"), Some(7));

        // 23h59m later: still fresh.
        seconds.fetch_add(24 * 3600 - 60, Ordering::SeqCst);
        assert_eq!(cache.get(&"k"), Some(7));

        // Past 24h: gone.
        seconds.fetch_add(120, Ordering::SeqCst);
        assert_eq!(cache.get(&"k"), None);
    }

    #[test]
    fn insert_refreshes_the_window() {
        let (seconds, clock) = manual();
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::hours(1), clock);

        cache.insert("k", 1);
        seconds.fetch_add(3000, Ordering::SeqCst);
        cache.insert("k", 2);
        seconds.fetch_add(3000, Ordering::SeqCst);

        // 5000s since first insert but only 3000s since the refresh.
        assert_eq!(cache.get(&"k"), Some(2));
    }

    #[test]
    fn invalidate_removes_immediately() {
        let (_, clock) = manual();
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::hours(1), clock);
        cache.insert("k", 1);
        cache.invalidate(&"k");
        assert_eq!(cache.get(&"k"), None);
    }
}
