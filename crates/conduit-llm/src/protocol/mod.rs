//! Provider wire formats
//!
//! Plain serde structs matching each provider's JSON API. They only live
//! at the boundary; the relay works on the unified types. OpenAI needs no
//! module here because the unified schema is its wire format.

pub mod anthropic;
pub mod google;
