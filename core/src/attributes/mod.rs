//! Attribute tree: the layered desired-state input to a run.
//!
//! Provides dotted-path addressing with quoted segments, a three-layer
//! store (default < override < automatic) backed by `serde_json::Value`,
//! the built-in `hadoop.*` defaults, and file loading.

pub mod defaults;
pub mod load;
pub mod merge;
pub mod path;
pub mod tree;

pub use load::{Assignment, NodeAttributes};
pub use path::AttrPath;
pub use tree::{AttributeTree, Layer};
