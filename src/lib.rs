pub mod api;
pub mod auth;
pub mod config;
pub mod messages;
pub mod registry;
pub mod responder;
pub mod rooms;
pub mod router;
pub mod server;
