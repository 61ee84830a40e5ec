//! The HTTP resource store's per-URL cache entry: `CacheEntry`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::auth::AuthMode;

/// Options governing one URL's fetch/retry/refresh behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// Non-zero enables periodic refresh after the first successful fetch.
    pub delay: Option<Duration>,
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
    /// Non-critical fetch failures return empty content instead of propagating.
    pub critical: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            delay: None,
            timeout: Duration::from_secs(10),
            retries: 1,
            retry_delay: Duration::from_millis(500),
            critical: false,
        }
    }
}

/// Which of a URL's two content versions is currently authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    Accepted,
    Validating,
    Rejected,
}

/// One URL's cached state. Invariants:
/// (a) `hasPending` implies `pendingChecksum != acceptedChecksum`;
/// (b) at most one in-flight validation per URL;
/// (c) `acceptedContent` only changes via successful promotion;
/// (d) `(etag, lastModified)` always reflects the most recent response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub url: String,
    pub accepted_content: String,
    pub accepted_checksum: String,
    pub accepted_time: DateTime<Utc>,
    pub pending_content: Option<String>,
    pub pending_checksum: Option<String>,
    pub validation_state: ValidationState,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub options: FetchOptions,
    pub auth: Option<AuthMode>,
}

pub fn checksum(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{digest:x}")
}

impl CacheEntry {
    pub fn new_accepted(
        url: impl Into<String>,
        content: String,
        now: DateTime<Utc>,
        options: FetchOptions,
        auth: Option<AuthMode>,
    ) -> Self {
        let accepted_checksum = checksum(&content);
        Self {
            url: url.into(),
            accepted_content: content,
            accepted_checksum,
            accepted_time: now,
            pending_content: None,
            pending_checksum: None,
            validation_state: ValidationState::Accepted,
            etag: None,
            last_modified: None,
            options,
            auth,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending_content.is_some()
    }

    /// Stages `content` as pending if its checksum differs from accepted.
    /// Returns whether the content actually changed.
    pub fn stage_pending(&mut self, content: String) -> bool {
        let new_checksum = checksum(&content);
        if new_checksum == self.accepted_checksum {
            return false;
        }
        self.pending_content = Some(content);
        self.pending_checksum = Some(new_checksum);
        self.validation_state = ValidationState::Validating;
        true
    }

    pub fn promote_pending(&mut self) {
        if let (Some(content), Some(checksum)) =
            (self.pending_content.take(), self.pending_checksum.take())
        {
            self.accepted_content = content;
            self.accepted_checksum = checksum;
            self.accepted_time = Utc::now();
        }
        self.validation_state = ValidationState::Accepted;
    }

    pub fn reject_pending(&mut self) {
        self.pending_content = None;
        self.pending_checksum = None;
        self.validation_state = ValidationState::Rejected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_identical_content_is_a_no_op() {
        let mut entry = CacheEntry::new_accepted(
            "http://h/x",
            "A".into(),
            Utc::now(),
            FetchOptions::default(),
            None,
        );
        assert!(!entry.stage_pending("A".into()));
        assert!(!entry.has_pending());
    }

    #[test]
    fn staging_different_content_sets_pending_and_validating() {
        let mut entry = CacheEntry::new_accepted(
            "http://h/x",
            "A".into(),
            Utc::now(),
            FetchOptions::default(),
            None,
        );
        assert!(entry.stage_pending("B".into()));
        assert!(entry.has_pending());
        assert_ne!(entry.pending_checksum, Some(entry.accepted_checksum.clone()));
        assert_eq!(entry.validation_state, ValidationState::Validating);
    }

    #[test]
    fn promote_pending_moves_content_and_clears_pending() {
        let mut entry = CacheEntry::new_accepted(
            "http://h/x",
            "A".into(),
            Utc::now(),
            FetchOptions::default(),
            None,
        );
        entry.stage_pending("B".into());
        entry.promote_pending();
        assert_eq!(entry.accepted_content, "B");
        assert!(!entry.has_pending());
        assert_eq!(entry.validation_state, ValidationState::Accepted);
    }

    #[test]
    fn reject_pending_keeps_accepted_content() {
        let mut entry = CacheEntry::new_accepted(
            "http://h/x",
            "A".into(),
            Utc::now(),
            FetchOptions::default(),
            None,
        );
        entry.stage_pending("B".into());
        entry.reject_pending();
        assert_eq!(entry.accepted_content, "A");
        assert!(!entry.has_pending());
    }
}
