//! WebSocket layer: push endpoint, admission, message routing.
//!
//! The push endpoint (`/events` by default) upgrades to a WebSocket,
//! builds a [`crate::session::Session`], runs the authenticator chain and
//! then drives the session with the [`PushDispatcher`].

pub mod auth;
pub mod dispatch;
pub mod handler;
pub mod messages;

pub use auth::{AuthAction, FnAuthenticator, SessionAuthenticator, TokenRequired};
pub use dispatch::PushDispatcher;
pub use messages::{WsCommand, WsMessage, WsMessageType};
