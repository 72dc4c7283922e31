//! Resolves movie and TV episode ids to HLS manifest URLs.
//!
//! A request is turned into a canonical embed URL, looked up in a TTL cache,
//! and on a miss handed to a headless browser session that loads the embed
//! page, plays it, and watches the network for the player's manifest request.

pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod extractor;
pub mod metrics;
pub mod resolver;
pub mod server;
pub mod target;
