//! voxgate library
//!
//! Outbound voice calls over Twilio: dial a number, speak a prompt, gather a
//! spoken answer, and hand it back to the HTTP request that placed the call.

pub mod cli;
pub mod config;
pub mod logging;
pub mod server;
pub mod voice;
