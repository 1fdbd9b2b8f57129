//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse through a
//! `#[path = "common/test_constants.rs"]` module declaration.

/// Private network used by request fixtures.
pub const SUBNET_ID: &str = "0c9b3c4e-5f2a-4d1e-8a6b-7c8d9e0f1a2b";
/// Security group used by request fixtures.
pub const SECURITY_GROUP_ID: &str = "3f2e1d0c-9b8a-4765-8432-10fedcba9876";
/// Instance type used when no override is provided.
pub const DEFAULT_INSTANCE_TYPE: &str = "DEV1-S";
/// Image label used when no override is provided.
pub const DEFAULT_IMAGE: &str = "Ubuntu 24.04 Noble Numbat";
/// Probe container image used by bootstrap fixtures.
pub const PROBE_IMAGE: &str = "registry.example/egress-probe:1.0";
