//! Integration tests for deskship.
//!
//! One test binary with a module per area. HTTP traffic goes to `wiremock`
//! servers injected through `api_base`; builds use the stand-in compiler from
//! `deskship::test_utils`; the binary is driven with `assert_cmd`.
//!
//! ```bash
//! cargo test --test integration
//! RUST_LOG=debug cargo test --test integration pipeline
//! ```

mod cli;
mod host_client;
mod pipeline;
mod updater;
