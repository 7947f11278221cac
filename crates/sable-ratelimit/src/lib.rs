//! # sable-ratelimit
//!
//! Token-bucket admission control, consulted before any onion processing.
//!
//! Two independent bucket families share one refill rate and capacity:
//!
//! - **peers** — keyed by the sending master node's legacy pubkey
//! - **clients** — keyed by IPv4 address, bounded to [`MAX_CLIENTS`]
//!   entries; when the table is full, buckets that have refilled to
//!   capacity are dropped to make room
//!
//! Buckets refill continuously at [`TOKEN_RATE`] tokens per second up to
//! [`BUCKET_SIZE`]. Each admitted request consumes one token; a request
//! finding less than one token is rejected without consuming anything.
//!
//! Time is supplied by the caller so tests can drive the clock. Each
//! family is guarded by its own mutex; the critical section is the whole
//! lookup-refill-take sequence and never performs I/O.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use sable_crypto::keys::LegacyPubkey;

/// Tokens added per second.
pub const TOKEN_RATE: f32 = 600.0;
/// Bucket capacity.
pub const BUCKET_SIZE: f32 = 600.0;
/// Maximum number of distinct client buckets.
pub const MAX_CLIENTS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct TokenBucket {
    tokens: f32,
    last_refill: Instant,
}

impl TokenBucket {
    /// A new bucket starts full.
    fn new(now: Instant, capacity: f32) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant, rate: f32, capacity: f32) {
        // saturating_duration_since keeps a stale caller clock from
        // rewinding the bucket; last_refill never decreases.
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f32();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    fn try_take(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn is_full(&self, capacity: f32) -> bool {
        self.tokens >= capacity
    }
}

/// Admission control for inbound peer and client traffic.
pub struct RateLimiter {
    token_rate: f32,
    bucket_size: f32,
    max_clients: usize,
    peer_buckets: Mutex<HashMap<LegacyPubkey, TokenBucket>>,
    client_buckets: Mutex<HashMap<u32, TokenBucket>>,
}

impl RateLimiter {
    /// A limiter with the default rate, capacity, and client-table bound.
    pub fn new() -> Self {
        Self::with_limits(TOKEN_RATE, BUCKET_SIZE, MAX_CLIENTS)
    }

    /// A limiter with explicit limits (configuration and tests).
    pub fn with_limits(token_rate: f32, bucket_size: f32, max_clients: usize) -> Self {
        Self {
            token_rate,
            bucket_size,
            max_clients,
            peer_buckets: Mutex::new(HashMap::new()),
            client_buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` when a request from master node `peer` at time
    /// `now` must be rejected.
    pub fn should_rate_limit(&self, peer: &LegacyPubkey, now: Instant) -> bool {
        let mut buckets = self.peer_buckets.lock().expect("peer bucket lock");
        let bucket = buckets
            .entry(*peer)
            .or_insert_with(|| TokenBucket::new(now, self.bucket_size));
        bucket.refill(now, self.token_rate, self.bucket_size);
        let limited = !bucket.try_take();
        if limited {
            tracing::debug!(peer = ?peer, "rate limiting master node");
        }
        limited
    }

    /// Returns `true` when a request from client address `ip` at time
    /// `now` must be rejected.
    ///
    /// Inserting into a full table first evicts buckets that have
    /// refilled to capacity; if none have, the new client is rejected
    /// until one does.
    pub fn should_rate_limit_client(&self, ip: u32, now: Instant) -> bool {
        let mut buckets = self.client_buckets.lock().expect("client bucket lock");
        if let Some(bucket) = buckets.get_mut(&ip) {
            bucket.refill(now, self.token_rate, self.bucket_size);
            return !bucket.try_take();
        }

        if buckets.len() >= self.max_clients {
            let (rate, capacity) = (self.token_rate, self.bucket_size);
            buckets.retain(|_, bucket| {
                bucket.refill(now, rate, capacity);
                !bucket.is_full(capacity)
            });
            if buckets.len() >= self.max_clients {
                tracing::debug!(clients = buckets.len(), "client bucket table full");
                return true;
            }
        }

        let mut bucket = TokenBucket::new(now, self.bucket_size);
        let admitted = bucket.try_take();
        buckets.insert(ip, bucket);
        !admitted
    }

    /// Drop every bucket that has refilled to capacity. The daemon calls
    /// this periodically so idle entries do not accumulate.
    pub fn prune(&self, now: Instant) {
        let (rate, capacity) = (self.token_rate, self.bucket_size);
        let mut peers = self.peer_buckets.lock().expect("peer bucket lock");
        peers.retain(|_, bucket| {
            bucket.refill(now, rate, capacity);
            !bucket.is_full(capacity)
        });
        drop(peers);

        let mut clients = self.client_buckets.lock().expect("client bucket lock");
        clients.retain(|_, bucket| {
            bucket.refill(now, rate, capacity);
            !bucket.is_full(capacity)
        });
    }

    /// Number of tracked client buckets.
    pub fn client_count(&self) -> usize {
        self.client_buckets.lock().expect("client bucket lock").len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
