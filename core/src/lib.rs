//! Declarative convergence of a Hadoop client node.
//!
//! Layered attributes are frozen, resolved against a distribution profile,
//! and turned into an ordered graph of idempotent resources. The executor
//! probes the host for each resource and applies only the difference.

pub mod attributes;
pub mod convergence;
pub mod engine;
pub mod error;
pub mod host;
pub mod profile;
pub mod recipe;
pub mod settings;
pub mod template;
pub mod types;
