use crate::api::RecordingError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How long a notification stays visible.
pub const NOTIFICATION_TTL: Duration = Duration::from_millis(3000);

// ─── Notification ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: String,
    pub level: NotificationLevel,
    pub message: String,
    pub created: Instant,
    pub ttl: Duration,
}

impl Notification {
    fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            level,
            message: message.into(),
            created: Instant::now(),
            ttl: NOTIFICATION_TTL,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn is_expired(&self) -> bool {
        self.created.elapsed() >= self.ttl
    }
}

// ─── NotificationCenter ─────────────────────────────────────────────────────

/// Append-only notification list, pruned by expiry. Cheap to clone; all
/// clones share the same list.
#[derive(Clone, Default)]
pub struct NotificationCenter(Arc<Mutex<Vec<Notification>>>);

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self, notification: Notification) {
        log::debug!(
            "notification [{:?}] {}",
            notification.level,
            notification.message
        );
        self.0.lock().push(notification);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.post(Notification::success(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.post(Notification::error(message));
    }

    /// Remove a notification by ID.
    pub fn dismiss(&self, id: &str) {
        self.0.lock().retain(|n| n.id != id);
    }

    /// Return non-expired notifications and prune expired ones from the list.
    pub fn snapshot(&self) -> Vec<Notification> {
        let mut list = self.0.lock();
        list.retain(|n| !n.is_expired());
        list.clone()
    }
}

// ─── Deduplication ──────────────────────────────────────────────────────────

/// Categories that own a fingerprint slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    RecordingFailure,
}

/// Fingerprint of a recording failure: the timestamp, else the output text,
/// else the non-zero exit code. Returns `None` when none of them carries
/// information, in which case nothing is surfaced.
pub fn recording_fingerprint(error: &RecordingError) -> Option<String> {
    if let Some(ts) = error.timestamp.as_deref().filter(|s| !s.is_empty()) {
        return Some(ts.to_string());
    }
    if let Some(output) = error.output.as_deref().filter(|s| !s.is_empty()) {
        return Some(output.to_string());
    }
    error
        .exit_code
        .filter(|code| *code != 0)
        .map(|code| code.to_string())
}

/// Remembers the last fingerprint surfaced per category.
#[derive(Default)]
pub struct Deduplicator {
    last_shown: Mutex<HashMap<ErrorCategory, String>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `fingerprint` with the stored one and store it if different.
    ///
    /// Returns `true` when the caller should surface the error. The
    /// comparison and the update happen under one lock.
    pub fn should_surface(&self, category: ErrorCategory, fingerprint: &str) -> bool {
        let mut slots = self.last_shown.lock();
        if slots.get(&category).is_some_and(|last| last == fingerprint) {
            return false;
        }
        slots.insert(category, fingerprint.to_string());
        true
    }

    pub fn last_shown(&self, category: ErrorCategory) -> Option<String> {
        self.last_shown.lock().get(&category).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(exit_code: Option<i64>, output: Option<&str>, timestamp: Option<&str>) -> RecordingError {
        RecordingError {
            exit_code,
            output: output.map(str::to_string),
            timestamp: timestamp.map(str::to_string),
        }
    }

    #[test]
    fn fingerprint_precedence() {
        assert_eq!(
            recording_fingerprint(&error(Some(1), Some("disk full"), Some("T1"))).as_deref(),
            Some("T1")
        );
        assert_eq!(
            recording_fingerprint(&error(Some(1), Some("disk full"), Some(""))).as_deref(),
            Some("disk full")
        );
        assert_eq!(
            recording_fingerprint(&error(Some(137), None, None)).as_deref(),
            Some("137")
        );
        assert_eq!(recording_fingerprint(&error(Some(0), None, None)), None);
        assert_eq!(recording_fingerprint(&RecordingError::default()), None);
    }

    #[test]
    fn dedup_surfaces_each_distinct_fingerprint_once() {
        let dedup = Deduplicator::new();
        let cat = ErrorCategory::RecordingFailure;
        assert!(dedup.should_surface(cat, "T1"));
        assert!(!dedup.should_surface(cat, "T1"));
        assert!(!dedup.should_surface(cat, "T1"));
        assert!(dedup.should_surface(cat, "T2"));
        assert_eq!(dedup.last_shown(cat).as_deref(), Some("T2"));
        // Only the last value is remembered.
        assert!(dedup.should_surface(cat, "T1"));
    }

    #[test]
    fn center_prunes_expired() {
        let center = NotificationCenter::new();
        center.post(Notification::error("gone").with_ttl(Duration::ZERO));
        center.success("kept");
        let snapshot = center.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].message, "kept");
        assert_eq!(snapshot[0].level, NotificationLevel::Success);
    }

    #[test]
    fn center_dismiss_and_shared_clones() {
        let center = NotificationCenter::new();
        let clone = center.clone();
        clone.error("boom");
        let id = center.snapshot()[0].id.clone();
        center.dismiss(&id);
        assert!(clone.snapshot().is_empty());
    }

    #[test]
    fn notification_ids_are_unique() {
        let a = Notification::success("a");
        let b = Notification::success("a");
        assert_ne!(a.id, b.id);
        assert_eq!(a.ttl, NOTIFICATION_TTL);
    }
}
