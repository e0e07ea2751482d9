pub mod attempt;
pub mod decision;

pub use attempt::{Attempt, AttemptLog};
pub use decision::{Admission, RateLimitDecision, RateLimitStatus};
