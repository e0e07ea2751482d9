use serde::{Deserialize, Serialize};

use super::Admission;

/// A single recorded attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    /// Unix timestamp (seconds) of the attempt
    pub at: u64,
    /// Random tiebreaker keeping same-second attempts distinct
    pub member: String,
}

/// Time-ordered attempts for one action+identifier key
///
/// Used as the value of the in-memory store and, bincode-encoded, as the row
/// of the embedded store. Only attempts inside `(now - window, now]` survive
/// a purge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptLog {
    attempts: Vec<Attempt>,
    /// Unix timestamp after which the whole key is stale
    expires_at: u64,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attempts currently held
    pub fn count(&self) -> u32 {
        self.attempts.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// Whether the key has seen no attempt for a full window
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Drop attempts that fell out of the window, returning how many were removed
    pub fn purge(&mut self, now: u64, window_secs: u64) -> usize {
        let before = self.attempts.len();
        self.attempts
            .retain(|attempt| attempt.at.saturating_add(window_secs) > now);
        before - self.attempts.len()
    }

    /// Record an attempt and push the key's expiry out to `now + window`
    pub fn record(&mut self, now: u64, window_secs: u64, member: impl Into<String>) {
        let position = self.attempts.partition_point(|attempt| attempt.at <= now);
        self.attempts.insert(
            position,
            Attempt {
                at: now,
                member: member.into(),
            },
        );
        self.expires_at = self.expires_at.max(now.saturating_add(window_secs));
    }

    /// Purge, count, and record the attempt if the count is under `limit`
    pub fn try_admit(
        &mut self,
        now: u64,
        window_secs: u64,
        limit: u32,
        member: impl Into<String>,
    ) -> Admission {
        self.purge(now, window_secs);
        let count = self.count();

        if count >= limit {
            return Admission::rejected(count);
        }

        self.record(now, window_secs, member);
        Admission::admitted(count)
    }
}
