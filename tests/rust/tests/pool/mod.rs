//! Physical pool integration tests
//!
//! Admission order, timeouts, cancellation and the background resizer,
//! driven through the public `PhysicalPool` API with mock factories.

mod maintenance;
