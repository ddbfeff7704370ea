//! Convergence engine.
//!
//! `graph` holds the declared resources, `planner` compares each one against
//! the host and produces steps, and `executor` applies them in order and
//! dispatches notifications. `alternatives` and `limits` carry the
//! resource-specific logic for those two kinds.

pub mod alternatives;
pub mod executor;
pub mod graph;
pub mod limits;
pub mod planner;
