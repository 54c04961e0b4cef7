//! Integration Tests
//!
//! End-to-end tests through the `plexus` facade, organized by concern:
//! - Scenarios: applications asking a node for printers and resources
//! - Reuse: reconfiguration keeps what still satisfies the new tree
//! - Leases: sessions nobody renews are torn down
//! - Distributed: several nodes on one transport, both strategies

#[path = "../common/mod.rs"]
mod common;

mod distributed;
mod leases;
mod reuse;
mod scenarios;
