//! # sable-daemon
//!
//! The storage-server daemon around the onion core: admission control,
//! peeling, and dispatch of each peeled hop to its destination.
//!
//! - [`config`] — TOML configuration
//! - [`dispatch`] — the request dispatcher and its collaborator traits
//! - [`peers`] — the static peer table and outbound HTTP clients
//! - [`local`] — the placeholder local request handler
//! - [`http`] — the axum front door (`POST /onion_req/v2` and the
//!   inter-node transfer ingress)

pub mod config;
pub mod dispatch;
pub mod http;
pub mod local;
pub mod peers;
