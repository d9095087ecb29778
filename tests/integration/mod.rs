//! Integration Tests Module
//!
//! Integration tests for the Code Historian client. Session lifecycle and
//! reconnect behavior run against a scripted transport; the transport tests
//! run against real loopback HTTP and WebSocket servers.



// Reconnect and session expiry tests
mod reconnect_test;

// REST and WebSocket transport tests
mod transport_test;
