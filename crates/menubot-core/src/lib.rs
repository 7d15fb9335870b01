//! Foundational shared state for the menubot crates.
//!
//! Provides time helpers, the per-session liveness tracker shared by the
//! dispatcher and the prober, and the operator stop token.

pub mod liveness;
pub mod stop_token;
pub mod time_utils;

pub use liveness::{LivenessSnapshot, LivenessTracker};
pub use stop_token::StopToken;
pub use time_utils::{current_unix_timestamp_ms, elapsed_since_unix_ms};
