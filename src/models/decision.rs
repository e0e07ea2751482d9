use serde::Serialize;

/// Outcome of a single admission attempt against a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether the attempt was recorded
    pub admitted: bool,
    /// Attempts in the window before this one
    pub count: u32,
}

impl Admission {
    pub fn admitted(count: u32) -> Self {
        Self {
            admitted: true,
            count,
        }
    }

    pub fn rejected(count: u32) -> Self {
        Self {
            admitted: false,
            count,
        }
    }
}

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    /// Whether the attempt is allowed
    pub success: bool,
    /// Attempts left before the window is exhausted
    pub remaining: u32,
    /// Unix timestamp (seconds) when the window resets
    pub reset_time: u64,
    /// Maximum attempts allowed per window
    pub limit: u32,
    /// Seconds to wait before retrying (only set when rejected)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl RateLimitDecision {
    /// Create an allowed decision
    pub fn allowed(limit: u32, remaining: u32, reset_time: u64) -> Self {
        Self {
            success: true,
            remaining,
            reset_time,
            limit,
            retry_after: None,
        }
    }

    /// Create a rejected decision
    pub fn rejected(limit: u32, reset_time: u64, retry_after: u64) -> Self {
        Self {
            success: false,
            remaining: 0,
            reset_time,
            limit,
            retry_after: Some(retry_after),
        }
    }
}

/// Read-only view of a key's window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub remaining: u32,
    pub reset_time: u64,
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_decision() {
        let decision = RateLimitDecision::allowed(5, 4, 1_000_900);
        assert!(decision.success);
        assert_eq!(decision.remaining, 4);
        assert!(decision.retry_after.is_none());
    }

    #[test]
    fn test_rejected_decision() {
        let decision = RateLimitDecision::rejected(5, 1_000_900, 900);
        assert!(!decision.success);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after, Some(900));
    }

    #[test]
    fn test_decision_serializes_camel_case() {
        let json = serde_json::to_value(RateLimitDecision::allowed(5, 4, 10)).unwrap();
        assert_eq!(json["resetTime"], 10);
        assert!(json.get("retryAfter").is_none());
    }
}
