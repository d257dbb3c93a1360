//! Request converters and response mapping per provider
//!
//! Converters turn a unified request into the provider payload for one
//! session. Response mapping turns provider answers back into unified
//! responses and chunks.

pub mod anthropic;
pub mod google;
pub mod openai;

use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
