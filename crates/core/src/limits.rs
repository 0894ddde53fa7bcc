//! Request limiting primitives keyed by client identifier.
//!
//! These are plain data structures: callers pass the current [`Instant`] in,
//! and keep the structures behind whatever lock suits them. Entries carry
//! their own expiry and are evicted on access or by [`FixedWindow::evict_expired`]
//! / [`Blocklist::evict_expired`].

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;

/// Outcome of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl Decision {
    pub fn is_limited(&self) -> bool {
        matches!(self, Decision::Limited { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

/// Fixed-window counter: at most `max` hits per key per `window`.
#[derive(Debug)]
pub struct FixedWindow<K> {
    window: Duration,
    max: u32,
    entries: HashMap<K, Window>,
}

impl<K: Eq + Hash + Clone> FixedWindow<K> {
    pub fn new(window: Duration, max: u32) -> Self {
        Self {
            window,
            max,
            entries: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn current(&mut self, key: &K, now: Instant) -> &mut Window {
        let window = self.window;
        let entry = self.entries.entry(key.clone()).or_insert(Window {
            started: now,
            hits: 0,
        });
        if now.duration_since(entry.started) >= window {
            *entry = Window {
                started: now,
                hits: 0,
            };
        }
        entry
    }

    fn retry_after(&self, started: Instant, now: Instant) -> Duration {
        match started.checked_add(self.window) {
            Some(end) => end.saturating_duration_since(now),
            None => self.window,
        }
    }

    /// Check the key without counting a hit.
    pub fn peek(&mut self, key: &K, now: Instant) -> Decision {
        let max = self.max;
        let entry = *self.current(key, now);
        if entry.hits >= max {
            Decision::Limited {
                retry_after: self.retry_after(entry.started, now),
            }
        } else {
            Decision::Allowed {
                remaining: max - entry.hits,
            }
        }
    }

    /// Count a hit unconditionally.
    pub fn record(&mut self, key: &K, now: Instant) {
        let entry = self.current(key, now);
        entry.hits = entry.hits.saturating_add(1);
    }

    /// Count a hit if the key still has room, and report the outcome.
    pub fn hit(&mut self, key: &K, now: Instant) -> Decision {
        let max = self.max;
        let entry = self.current(key, now);
        if entry.hits >= max {
            let started = entry.started;
            return Decision::Limited {
                retry_after: self.retry_after(started, now),
            };
        }
        entry.hits += 1;
        Decision::Allowed {
            remaining: max - entry.hits,
        }
    }

    /// Drop windows that have fully elapsed. Returns how many were removed.
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let window = self.window;
        let before = self.entries.len();
        self.entries
            .retain(|_, w| now.duration_since(w.started) < window);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Keys blocked until an expiry instant. `None` never expires.
#[derive(Debug)]
pub struct Blocklist<K> {
    entries: HashMap<K, Option<Instant>>,
}

impl<K: Eq + Hash> Default for Blocklist<K> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> Blocklist<K> {
    /// Block `key` for `duration` from `now`. Durations past the clock's range
    /// block for good.
    pub fn block(&mut self, key: K, now: Instant, duration: Duration) -> Option<Instant> {
        let expires = now.checked_add(duration);
        self.entries.insert(key, expires);
        expires
    }

    /// Remaining block time for `key`, evicting the entry once it expired.
    pub fn blocked_for(&mut self, key: &K, now: Instant) -> Option<Duration> {
        match *self.entries.get(key)? {
            None => Some(Duration::MAX),
            Some(expires) if now < expires => Some(expires - now),
            Some(_) => {
                self.entries.remove(key);
                None
            }
        }
    }

    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, expires| expires.map_or(true, |expires| now < expires));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Request attributes inspected for suspicious activity.
#[derive(Debug, Clone, Copy)]
pub struct RequestFacts<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub user_agent: Option<&'a str>,
    pub has_origin: bool,
}

/// Why a request looks suspicious.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspicion {
    CrawlerAgent,
    PathTraversal,
    ScriptInjection,
    PreflightWithoutOrigin,
    MissingUserAgent,
}

/// User agents shorter than this are treated as missing.
const MIN_USER_AGENT_CHARS: usize = 10;

fn crawler_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)bot|crawl|spider|scrape").unwrap())
}

/// All suspicion markers that apply to a request; empty when it looks fine.
pub fn suspicions(facts: &RequestFacts<'_>) -> Vec<Suspicion> {
    let user_agent = facts.user_agent.unwrap_or("");
    let mut found = Vec::new();

    if crawler_pattern().is_match(user_agent) {
        found.push(Suspicion::CrawlerAgent);
    }
    if facts.path.contains("..") {
        found.push(Suspicion::PathTraversal);
    }
    if facts.path.contains("<script>") {
        found.push(Suspicion::ScriptInjection);
    }
    if facts.method.eq_ignore_ascii_case("OPTIONS") && !facts.has_origin {
        found.push(Suspicion::PreflightWithoutOrigin);
    }
    if user_agent.chars().count() < MIN_USER_AGENT_CHARS {
        found.push(Suspicion::MissingUserAgent);
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    // ============================================================================
    // FixedWindow tests
    // ============================================================================

    #[test]
    fn test_fixed_window_allows_up_to_max() {
        let now = Instant::now();
        let mut limiter = FixedWindow::new(MINUTE, 3);

        assert_eq!(limiter.hit(&"a", now), Decision::Allowed { remaining: 2 });
        assert_eq!(limiter.hit(&"a", now), Decision::Allowed { remaining: 1 });
        assert_eq!(limiter.hit(&"a", now), Decision::Allowed { remaining: 0 });
        assert!(limiter.hit(&"a", now).is_limited());
    }

    #[test]
    fn test_fixed_window_keys_are_independent() {
        let now = Instant::now();
        let mut limiter = FixedWindow::new(MINUTE, 1);

        assert!(!limiter.hit(&"a", now).is_limited());
        assert!(limiter.hit(&"a", now).is_limited());
        assert!(!limiter.hit(&"b", now).is_limited());
    }

    #[test]
    fn test_fixed_window_resets_after_window() {
        let now = Instant::now();
        let mut limiter = FixedWindow::new(MINUTE, 1);

        assert!(!limiter.hit(&"a", now).is_limited());
        assert!(limiter.hit(&"a", now + Duration::from_secs(59)).is_limited());
        assert!(!limiter.hit(&"a", now + MINUTE).is_limited());
    }

    #[test]
    fn test_fixed_window_retry_after_counts_down() {
        let now = Instant::now();
        let mut limiter = FixedWindow::new(MINUTE, 1);
        limiter.hit(&"a", now);

        assert_eq!(
            limiter.hit(&"a", now + Duration::from_secs(20)),
            Decision::Limited {
                retry_after: Duration::from_secs(40)
            }
        );
    }

    #[test]
    fn test_fixed_window_unbounded_window_does_not_overflow() {
        let now = Instant::now();
        let mut limiter = FixedWindow::new(Duration::MAX, 1);
        assert!(!limiter.hit(&"a", now).is_limited());
        assert_eq!(
            limiter.hit(&"a", now + MINUTE),
            Decision::Limited {
                retry_after: Duration::MAX
            }
        );
        assert!(limiter.peek(&"a", now + MINUTE).is_limited());
    }

    #[test]
    fn test_fixed_window_peek_and_record() {
        let now = Instant::now();
        let mut limiter = FixedWindow::new(MINUTE, 2);

        assert_eq!(limiter.peek(&"a", now), Decision::Allowed { remaining: 2 });
        limiter.record(&"a", now);
        limiter.record(&"a", now);
        assert!(limiter.peek(&"a", now).is_limited());
        // Peeking never counts.
        limiter.peek(&"b", now);
        assert_eq!(limiter.peek(&"b", now), Decision::Allowed { remaining: 2 });
    }

    #[test]
    fn test_fixed_window_evict_expired() {
        let now = Instant::now();
        let mut limiter = FixedWindow::new(MINUTE, 5);
        limiter.hit(&"old", now);
        limiter.hit(&"new", now + Duration::from_secs(30));

        assert_eq!(limiter.evict_expired(now + MINUTE), 1);
        assert_eq!(limiter.len(), 1);
    }

    // ============================================================================
    // Blocklist tests
    // ============================================================================

    #[test]
    fn test_blocklist_blocks_until_expiry() {
        let now = Instant::now();
        let mut list = Blocklist::default();
        list.block("1.2.3.4", now, Duration::from_secs(1800));

        assert_eq!(
            list.blocked_for(&"1.2.3.4", now + Duration::from_secs(800)),
            Some(Duration::from_secs(1000))
        );
        assert_eq!(list.blocked_for(&"5.6.7.8", now), None);
    }

    #[test]
    fn test_blocklist_evicts_on_lookup_after_expiry() {
        let now = Instant::now();
        let mut list = Blocklist::default();
        list.block("ip", now, MINUTE);

        assert_eq!(list.blocked_for(&"ip", now + MINUTE), None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_blocklist_unbounded_duration_never_expires() {
        let now = Instant::now();
        let mut list = Blocklist::default();
        assert_eq!(list.block("ip", now, Duration::MAX), None);

        assert_eq!(
            list.blocked_for(&"ip", now + MINUTE * 60),
            Some(Duration::MAX)
        );
        assert_eq!(list.evict_expired(now + MINUTE * 60), 0);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_blocklist_evict_expired() {
        let now = Instant::now();
        let mut list = Blocklist::default();
        list.block("a", now, MINUTE);
        list.block("b", now, MINUTE * 10);

        assert_eq!(list.evict_expired(now + MINUTE * 2), 1);
        assert_eq!(list.len(), 1);
    }

    // ============================================================================
    // suspicions tests
    // ============================================================================

    fn request<'a>(method: &'a str, path: &'a str, ua: Option<&'a str>) -> RequestFacts<'a> {
        RequestFacts {
            method,
            path,
            user_agent: ua,
            has_origin: true,
        }
    }

    const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64)";

    #[test]
    fn test_suspicions_clean_request() {
        assert!(suspicions(&request("GET", "/api/health", Some(BROWSER))).is_empty());
    }

    #[test]
    fn test_suspicions_crawler() {
        assert_eq!(
            suspicions(&request("GET", "/", Some("Mozilla/5.0 Googlebot/2.1"))),
            vec![Suspicion::CrawlerAgent]
        );
    }

    #[test]
    fn test_suspicions_path_markers() {
        assert_eq!(
            suspicions(&request("GET", "/api/../etc", Some(BROWSER))),
            vec![Suspicion::PathTraversal]
        );
        assert_eq!(
            suspicions(&request("GET", "/<script>", Some(BROWSER))),
            vec![Suspicion::ScriptInjection]
        );
    }

    #[test]
    fn test_suspicions_preflight_without_origin() {
        let mut p = request("OPTIONS", "/api/upload", Some(BROWSER));
        assert!(suspicions(&p).is_empty());
        p.has_origin = false;
        assert_eq!(suspicions(&p), vec![Suspicion::PreflightWithoutOrigin]);
    }

    #[test]
    fn test_suspicions_missing_or_short_user_agent() {
        assert_eq!(
            suspicions(&request("GET", "/", None)),
            vec![Suspicion::MissingUserAgent]
        );
        assert_eq!(
            suspicions(&request("GET", "/", Some("curl/8"))),
            vec![Suspicion::MissingUserAgent]
        );
    }
}
