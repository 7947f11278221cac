//! Placeholder local request handler.
//!
//! Message storage lives behind this trait in the full node; the daemon
//! ships a minimal JSON responder so terminal-local requests have a
//! destination.

use async_trait::async_trait;
use sable_onion::Result;
use serde_json::json;

use crate::dispatch::LocalHandler;

/// Answers `{"method": "info"}` with node details; everything else gets a
/// JSON error object.
pub struct InfoResponder {
    version: &'static str,
}

impl InfoResponder {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

impl Default for InfoResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalHandler for InfoResponder {
    async fn handle(&self, request: &[u8]) -> Result<Vec<u8>> {
        let body: serde_json::Value = match serde_json::from_slice(request) {
            Ok(body) => body,
            Err(_) => {
                return Ok(json!({"status": 400, "error": "request is not JSON"})
                    .to_string()
                    .into_bytes())
            }
        };

        let response = match body.get("method").and_then(|m| m.as_str()) {
            Some("info") => json!({
                "status": 200,
                "version": self.version,
            }),
            Some(other) => json!({
                "status": 404,
                "error": format!("unknown method {other:?}"),
            }),
            None => json!({"status": 400, "error": "request has no method"}),
        };
        Ok(response.to_string().into_bytes())
    }
}
