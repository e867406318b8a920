// Handlers module - route handlers for the relay server
pub mod auth;
pub mod ws;
