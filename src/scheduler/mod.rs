//! Periodic round scheduling.

pub mod engine;
pub mod round;

pub use engine::{run_client, run_scheduler_loop};
pub use round::{run_round, test_peer, PeerMetrics, RoundOutcome, TestResult};
