//! Coordinator integration tests
//!
//! Deploy / undeploy / redeploy through the coordinator with mock factories:
//! generation swaps, drains, proxy behavior across swaps and per-identity
//! serialization.

mod drain;
mod lifecycle;
