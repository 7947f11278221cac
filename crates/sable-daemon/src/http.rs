//! The HTTP front door.
//!
//! Two ingress routes share the dispatcher:
//!
//! - `POST /onion_req/v2` — the outer onion frame from a client; rate
//!   limited by source IPv4 address
//! - `POST /onion_transfer/v2` — the bencoded transfer dict from the
//!   previous master node, which identifies itself by legacy pubkey in
//!   the `x-mnode-pubkey` header; rate limited by that identity
//!
//! Responses are opaque bytes. Rate limiting is the only failure with a
//! machine-readable status (429); every other error is an opaque 4xx/5xx
//! with an empty body, because an intermediate node cannot know (and must
//! not reveal) anything about the originator.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use sable_crypto::keys::LegacyPubkey;
use sable_onion::OnionError;

use crate::dispatch::{ClientSource, Dispatcher};

/// Header carrying the sending master node's legacy pubkey on the
/// transfer ingress.
pub const MNODE_PUBKEY_HEADER: &str = "x-mnode-pubkey";

/// Daemon-wide shared state.
pub struct AppState {
    pub dispatcher: Dispatcher,
}

/// Build the ingress router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/onion_req/v2", post(onion_req_v2))
        .route("/onion_transfer/v2", post(onion_transfer_v2))
        .with_state(state)
}

async fn onion_req_v2(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Response {
    let source = ClientSource::Ip(client_ipv4(addr));
    respond(state.dispatcher.handle_onion_request(&body, source).await)
}

async fn onion_transfer_v2(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let peer = headers
        .get(MNODE_PUBKEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|text| LegacyPubkey::parse_any(text.as_bytes()))
        .unwrap_or_else(|| LegacyPubkey::parse_any(b""));
    let source = ClientSource::Peer(peer);
    respond(state.dispatcher.handle_transfer(&body, source).await)
}

/// IPv4 clients keep their own buckets; everything else (including
/// non-mapped IPv6) shares the unspecified-address bucket.
fn client_ipv4(addr: SocketAddr) -> Ipv4Addr {
    match addr.ip() {
        IpAddr::V4(ip) => ip,
        IpAddr::V6(ip) => ip.to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED),
    }
}

fn respond(result: sable_onion::Result<Vec<u8>>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(OnionError::RateLimited) => StatusCode::TOO_MANY_REQUESTS.into_response(),
        Err(OnionError::UpstreamTimeout) => {
            tracing::debug!("onion request timed out upstream");
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
        Err(error) => {
            tracing::debug!(%error, "onion request failed");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}
