// system-tests/src/lib.rs
// ============================================================================
// Module: System Test Support Library
// Description: Shared helpers used by the RelayCore system-tests binaries.
// Purpose: Give integration tests a way to obtain an unused loopback port
//          before handing it to `relaycore_server::serve`.
// Dependencies: Standard library networking.
// ============================================================================

//! ## Overview
//! `system-tests` hosts end-to-end coverage that exercises the Submission API
//! and the SQLite run-state store together, as no single crate's own test
//! module does.
//!
//! Security posture: system-test inputs are untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Helpers
// ============================================================================

use std::net::SocketAddr;
use std::net::TcpListener;

/// Binds an ephemeral loopback port, then drops the listener so a server can
/// bind the same address. Racy under concurrent test execution but this is
/// the same trick the teacher's own harness used.
#[must_use]
pub fn allocate_bind_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("read local addr")
}
