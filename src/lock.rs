//! Section locks: mutually-exclusive edit reservations over document
//! sections.
//!
//! At most one participant holds a lock on a section at any time. A lock
//! is refreshed by re-acquisition or by a successful change targeting its
//! section; once the refresh is older than the configured TTL the lock is
//! eligible for forced takeover by a competing acquire, which is the sole
//! recovery path for crashed or disconnected holders.
//!
//! Acquisition never blocks: the caller gets an immediate grant or
//! refusal and must retry or surface the conflict.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An exclusive lock over one section of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionLock {
    pub section_id: String,
    pub participant_id: String,
    pub acquired_at: DateTime<Utc>,
    /// Last refresh; the expiry clock runs from here, not `acquired_at`
    pub refreshed_at: DateTime<Utc>,
}

impl SectionLock {
    fn new(section_id: impl Into<String>, participant_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            section_id: section_id.into(),
            participant_id: participant_id.into(),
            acquired_at: now,
            refreshed_at: now,
        }
    }

    /// Whether the lock has outlived the TTL without a refresh.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.refreshed_at + ttl <= now
    }
}

/// Result of an acquire attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Section was unlocked; the lock is now held by the caller
    Acquired,
    /// Caller already held the lock; the timestamp was refreshed
    Refreshed,
    /// Previous holder's lock had expired and was forcibly released
    TakenOver { previous_holder: String },
    /// Section is held by another participant with a live lock
    Held { holder: String },
}

impl AcquireOutcome {
    /// Whether the caller holds the lock after the attempt.
    pub fn granted(&self) -> bool {
        !matches!(self, AcquireOutcome::Held { .. })
    }
}

/// Section locks for a single document.
#[derive(Debug, Clone, Default)]
pub struct LockTable {
    locks: HashMap<String, SectionLock>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to acquire `section_id` for `participant_id`.
    ///
    /// Re-acquisition by the current holder refreshes the timestamp. An
    /// expired lock held by someone else is forcibly released and the
    /// section granted to the caller.
    pub fn acquire(
        &mut self,
        section_id: &str,
        participant_id: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> AcquireOutcome {
        match self.locks.get_mut(section_id) {
            Some(lock) if lock.participant_id == participant_id => {
                lock.refreshed_at = now;
                AcquireOutcome::Refreshed
            }
            Some(lock) if lock.is_expired(ttl, now) => {
                let previous_holder = lock.participant_id.clone();
                *lock = SectionLock::new(section_id, participant_id, now);
                AcquireOutcome::TakenOver { previous_holder }
            }
            Some(lock) => AcquireOutcome::Held {
                holder: lock.participant_id.clone(),
            },
            None => {
                self.locks
                    .insert(section_id.to_string(), SectionLock::new(section_id, participant_id, now));
                AcquireOutcome::Acquired
            }
        }
    }

    /// Release `section_id`, which must be held by `participant_id`.
    pub fn release(&mut self, section_id: &str, participant_id: &str) -> Result<SectionLock> {
        match self.locks.get(section_id) {
            Some(lock) if lock.participant_id == participant_id => {
                Ok(self.locks.remove(section_id).expect("lock present"))
            }
            _ => Err(Error::NotLockHolder {
                section_id: section_id.to_string(),
                participant_id: participant_id.to_string(),
            }),
        }
    }

    /// Release every lock held by `participant_id`, returning the released
    /// locks. Called on the leave path so disconnects never orphan locks.
    pub fn release_all_for(&mut self, participant_id: &str) -> Vec<SectionLock> {
        let sections: Vec<String> = self
            .locks
            .values()
            .filter(|lock| lock.participant_id == participant_id)
            .map(|lock| lock.section_id.clone())
            .collect();

        sections
            .iter()
            .filter_map(|section| self.locks.remove(section))
            .collect()
    }

    /// Refresh the lock on `section_id` if `participant_id` holds it.
    /// Used when a successful change targets the section.
    pub fn touch(&mut self, section_id: &str, participant_id: &str, now: DateTime<Utc>) {
        if let Some(lock) = self.locks.get_mut(section_id) {
            if lock.participant_id == participant_id {
                lock.refreshed_at = now;
            }
        }
    }

    /// Live holder of `section_id`, ignoring expired locks.
    pub fn holder(&self, section_id: &str, ttl: Duration, now: DateTime<Utc>) -> Option<&SectionLock> {
        self.locks
            .get(section_id)
            .filter(|lock| !lock.is_expired(ttl, now))
    }

    /// All live locks as (section, holder) pairs, sorted by section.
    pub fn locked_sections(&self, ttl: Duration, now: DateTime<Utc>) -> Vec<(String, String)> {
        let mut sections: Vec<(String, String)> = self
            .locks
            .values()
            .filter(|lock| !lock.is_expired(ttl, now))
            .map(|lock| (lock.section_id.clone(), lock.participant_id.clone()))
            .collect();
        sections.sort();
        sections
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }
}

// =============================================================================
// Duration parsing
// =============================================================================

/// Parse a duration string like "2h", "30m", "45s".
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return Err(Error::InvalidArgument("Duration cannot be empty".to_string()));
    }

    let (num_str, unit) = if let Some(pos) = s.find(|c: char| !c.is_ascii_digit()) {
        (&s[..pos], &s[pos..])
    } else {
        // Assume minutes if no unit
        (s, "m")
    };

    let num: i64 = num_str
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("Invalid duration number: {}", num_str)))?;

    let duration = match unit.to_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => Duration::seconds(num),
        "m" | "min" | "minute" | "minutes" => Duration::minutes(num),
        "h" | "hr" | "hour" | "hours" => Duration::hours(num),
        "d" | "day" | "days" => Duration::days(num),
        _ => {
            return Err(Error::InvalidArgument(format!(
                "Invalid duration unit '{}'. Expected: s, m, h, d",
                unit
            )));
        }
    };

    Ok(duration)
}
