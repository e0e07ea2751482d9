/// Namespace prepended to every counting-store key
pub const DEFAULT_KEY_PREFIX: &str = "ratelimit";

/// Longest identifier accepted for a rate limit key.
/// Keeps store keys bounded when callers pass emails or raw header values.
pub const MAX_IDENTIFIER_LEN: usize = 256;

/// Bucket used when no client identity can be derived from a request
pub const UNKNOWN_IDENTIFIER: &str = "ip:unknown";

/// Interval between expiry sweeps for stores without native TTL (5 minutes)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Connect/response budget for a single Redis round trip
pub const DEFAULT_REDIS_TIMEOUT_MS: u64 = 250;

// =============================================================================
// Headers
// =============================================================================

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// Authenticated user id set by the upstream session layer
pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";
pub const HEADER_REAL_IP: &str = "x-real-ip";

// =============================================================================
// Error Messages
// =============================================================================

/// Error message for a blank identifier
pub const ERR_EMPTY_IDENTIFIER: &str = "Identifier must not be empty";

/// Error message for an oversized identifier
pub const ERR_IDENTIFIER_TOO_LONG: &str = "Identifier exceeds maximum length";

/// User-facing message attached to 429 responses
pub const ERR_TOO_MANY_ATTEMPTS: &str = "Too many attempts - please try again later";
