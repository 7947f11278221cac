//! Integration test crate for the sable onion core.
//!
//! This crate has no library code — it only contains integration tests
//! that exercise end-to-end onion request flows across the workspace
//! crates.
//!
//! Run them all:
//! ```sh
//! cargo test -p sable-integration-tests
//! ```
