//! # push-gateway
//!
//! WebSocket push gateway with a backing-store fan-out backplane.
//!
//! Every WebSocket connection becomes a [`session::Session`] carrying its
//! identifier, claims, query parameters, headers and remote address.
//! Events published by clients or by the backplane are delivered to the
//! sessions they target. A standalone, sentinel-guarded or clustered store
//! spreads events across gateway processes.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP)
//!     │
//!     ├── Push endpoint + admission (ws/)
//!     ├── Health endpoint (api/)
//!     │
//!     ├── Session, PushSessionHandler hooks (session/)
//!     ├── PushDispatcher (ws/)
//!     │
//!     ├── Fanout (service/)
//!     ├── EventBus, SessionRegistry (domain/)
//!     │
//!     └── StoreClient + Backplane (store/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod session;
pub mod store;
pub mod ws;
