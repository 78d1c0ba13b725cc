//! Typing Indicator Tracker
//!
//! Process-local, per-chat map of who is typing and when they last said so.
//! Entries expire by timestamp comparison; no background sweep runs, so a
//! client that dies mid-typing simply ages out. Every write prunes the
//! chat's expired entries in passing, which keeps abandoned indicators from
//! accumulating in long-lived chats.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Tracks typing activity per chat with a fixed TTL.
pub struct TypingTracker {
    entries: DashMap<i64, HashMap<i64, Instant>>,
    ttl: Duration,
}

impl TypingTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Record that a user started or refreshed typing in a chat.
    ///
    /// Returns true when this flips the user's visible state from not-typing
    /// to typing; a refresh of a still-live entry returns false so callers
    /// can suppress redundant broadcasts.
    pub fn set_typing(&self, chat_id: i64, user_id: i64) -> bool {
        let now = Instant::now();
        let mut chat = self.entries.entry(chat_id).or_default();
        chat.retain(|_, stamp| now.duration_since(*stamp) < self.ttl);
        let was_live = chat.contains_key(&user_id);
        chat.insert(user_id, now);
        !was_live
    }

    /// Clear a user's typing state in a chat. Returns true when a live entry
    /// was actually removed.
    pub fn clear(&self, chat_id: i64, user_id: i64) -> bool {
        let now = Instant::now();
        let Some(mut chat) = self.entries.get_mut(&chat_id) else {
            return false;
        };
        let was_live = match chat.remove(&user_id) {
            Some(stamp) => now.duration_since(stamp) < self.ttl,
            None => false,
        };
        chat.retain(|_, stamp| now.duration_since(*stamp) < self.ttl);
        was_live
    }

    /// Users currently typing in a chat. Prunes expired entries in passing.
    pub fn typing_users(&self, chat_id: i64) -> Vec<i64> {
        let now = Instant::now();
        let Some(mut chat) = self.entries.get_mut(&chat_id) else {
            return Vec::new();
        };
        chat.retain(|_, stamp| now.duration_since(*stamp) < self.ttl);
        chat.keys().copied().collect()
    }

    #[cfg(test)]
    fn tracked(&self, chat_id: i64) -> usize {
        self.entries.get(&chat_id).map(|chat| chat.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_start_flips_state_refresh_does_not() {
        let tracker = TypingTracker::new(Duration::from_secs(5));
        assert!(tracker.set_typing(1, 10));
        assert!(!tracker.set_typing(1, 10));
        assert_eq!(tracker.typing_users(1), vec![10]);
    }

    #[test]
    fn clear_removes_live_entry() {
        let tracker = TypingTracker::new(Duration::from_secs(5));
        tracker.set_typing(1, 10);
        assert!(tracker.clear(1, 10));
        assert!(tracker.typing_users(1).is_empty());
        // Second clear finds nothing.
        assert!(!tracker.clear(1, 10));
    }

    #[test]
    fn entries_expire_without_an_explicit_stop() {
        let tracker = TypingTracker::new(Duration::from_millis(10));
        tracker.set_typing(1, 10);
        std::thread::sleep(Duration::from_millis(20));
        assert!(tracker.typing_users(1).is_empty());
        // An expired entry counts as not-typing, so a new start flips again.
        assert!(tracker.set_typing(1, 10));
    }

    #[test]
    fn writes_evict_abandoned_entries() {
        let tracker = TypingTracker::new(Duration::from_millis(10));
        tracker.set_typing(1, 10);
        std::thread::sleep(Duration::from_millis(20));

        // Another user's start sweeps out the dead entry.
        assert!(tracker.set_typing(1, 11));
        assert_eq!(tracker.tracked(1), 1);

        // So does a clear, even one aimed at a different user.
        std::thread::sleep(Duration::from_millis(20));
        assert!(!tracker.clear(1, 99));
        assert_eq!(tracker.tracked(1), 0);
    }

    #[test]
    fn chats_are_isolated() {
        let tracker = TypingTracker::new(Duration::from_secs(5));
        tracker.set_typing(1, 10);
        tracker.set_typing(2, 20);
        assert_eq!(tracker.typing_users(1), vec![10]);
        assert_eq!(tracker.typing_users(2), vec![20]);
    }
}
