//! Chat Relay Core Library
//! Streaming relay, moderation gate, daily quota and login code exchange

pub mod config;
pub mod moderation;
pub mod oauth;
pub mod quota;
pub mod relay;
